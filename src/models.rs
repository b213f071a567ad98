use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A scheduled token-supply unlock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockEvent {
    pub token_symbol: String,
    pub unlock_date: DateTime<Utc>,
    /// Token units released (always > 0)
    pub unlock_amount: f64,
    /// Percent of circulating supply, 0-100
    pub unlock_percent: f64,
    pub is_cliff: bool,
    /// Provenance tag (e.g. "TokenUnlocks")
    pub source: String,
}

/// Single OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candles ordered oldest -> newest with unique timestamps.
///
/// An empty series is the normal "insufficient data" value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a series from venue rows in any order, keeping at most the newest `limit` bars.
    pub fn from_candles(mut candles: Vec<Candle>, limit: usize) -> Self {
        candles.sort_by_key(|c| c.timestamp_ms);
        candles.dedup_by_key(|c| c.timestamp_ms);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Self { candles }
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.close)
    }

    pub fn volumes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.volume)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Top-of-book liquidity summary for one (symbol, venue)
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookDepth {
    pub symbol: String,
    pub venue: Venue,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub bid_volume: f64,
    pub ask_volume: f64,
}

impl OrderBookDepth {
    pub fn new(symbol: String, venue: Venue, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        let bid_volume = bids.iter().map(|l| l.quantity).sum();
        let ask_volume = asks.iter().map(|l| l.quantity).sum();
        Self {
            symbol,
            venue,
            bids,
            asks,
            bid_volume,
            ask_volume,
        }
    }
}

/// Raw `eth_getLogs` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLog {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// Spot venues the market aggregator can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Bybit,
    Okx,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::Binance, Venue::Bybit, Venue::Okx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "bybit" => Ok(Venue::Bybit),
            "okx" => Ok(Venue::Okx),
            other => Err(format!("unknown venue: {other}")),
        }
    }
}

/// Directional call for an unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Short,
    Avoid,
    LongAfterDump,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Short => "SHORT",
            SignalType::Avoid => "AVOID",
            SignalType::LongAfterDump => "LONG_AFTER_DUMP",
        }
    }
}

/// Output of the scoring pipeline, one per unlock event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub token: String,
    pub signal: SignalType,
    pub uis_score: f64,
    pub confidence: f64,
    pub expected_move_pct: f64,
    pub reason: String,
}
