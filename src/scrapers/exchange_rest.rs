//! Exchange REST market data
//!
//! Public spot endpoints only: klines, last trade price and order book.
//! Credentials are carried (and sent where the venue takes an API-key header)
//! but never required for these reads.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::VenueCredentials;
use crate::models::{Candle, PriceLevel, Venue};

const BINANCE_API_BASE: &str = "https://api.binance.com";
const BYBIT_API_BASE: &str = "https://api.bybit.com";
const OKX_API_BASE: &str = "https://www.okx.com";

/// One venue's market data endpoints. `pair` is always normalized `BASE/QUOTE`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn venue(&self) -> Venue;

    async fn fetch_ohlcv(&self, pair: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;

    async fn fetch_last_price(&self, pair: &str) -> Result<f64>;

    /// Returns (bids, asks), best level first.
    async fn fetch_order_book(
        &self,
        pair: &str,
        depth: usize,
    ) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)>;
}

pub struct ExchangeRestClient {
    venue: Venue,
    client: Client,
    base_url: String,
    authenticated: bool,
}

impl ExchangeRestClient {
    pub fn new(venue: Venue, credentials: &VenueCredentials, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let (Venue::Binance, Some(key)) = (venue, credentials.api_key.as_ref()) {
            headers.insert(
                "X-MBX-APIKEY",
                key.parse().context("Invalid Binance api key")?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent("UnlockEngine/0.1")
            .default_headers(headers)
            .build()
            .with_context(|| format!("Failed to build {venue} REST client"))?;

        let base_url = match venue {
            Venue::Binance => BINANCE_API_BASE,
            Venue::Bybit => BYBIT_API_BASE,
            Venue::Okx => OKX_API_BASE,
        };

        Ok(Self {
            venue,
            client,
            base_url: base_url.to_string(),
            authenticated: credentials.is_configured(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} {} failed", self.venue, path))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("GET {} {} {}: {}", self.venue, path, status, text);
        }

        let body = resp
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse {} {} response", self.venue, path))?;
        debug!(venue = %self.venue, path, "market data response received");
        Ok(body)
    }
}

#[async_trait]
impl MarketDataSource for ExchangeRestClient {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn fetch_ohlcv(&self, pair: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let interval = venue_interval(self.venue, timeframe)
            .with_context(|| format!("unsupported timeframe {timeframe} on {}", self.venue))?;
        let symbol = wire_symbol(self.venue, pair);
        let limit = limit.to_string();

        match self.venue {
            Venue::Binance => {
                let v = self
                    .get_json(
                        "/api/v3/klines",
                        &[
                            ("symbol", symbol),
                            ("interval", interval.to_string()),
                            ("limit", limit),
                        ],
                    )
                    .await?;
                parse_binance_klines(&v)
            }
            Venue::Bybit => {
                let v = self
                    .get_json(
                        "/v5/market/kline",
                        &[
                            ("category", "spot".to_string()),
                            ("symbol", symbol),
                            ("interval", interval.to_string()),
                            ("limit", limit),
                        ],
                    )
                    .await?;
                parse_bybit_klines(&v)
            }
            Venue::Okx => {
                let v = self
                    .get_json(
                        "/api/v5/market/candles",
                        &[
                            ("instId", symbol),
                            ("bar", interval.to_string()),
                            ("limit", limit),
                        ],
                    )
                    .await?;
                parse_okx_candles(&v)
            }
        }
    }

    async fn fetch_last_price(&self, pair: &str) -> Result<f64> {
        let symbol = wire_symbol(self.venue, pair);
        let price = match self.venue {
            Venue::Binance => {
                let v = self
                    .get_json("/api/v3/ticker/price", &[("symbol", symbol)])
                    .await?;
                num(&v["price"])
            }
            Venue::Bybit => {
                let v = self
                    .get_json(
                        "/v5/market/tickers",
                        &[("category", "spot".to_string()), ("symbol", symbol)],
                    )
                    .await?;
                check_bybit(&v)?;
                num(&v["result"]["list"][0]["lastPrice"])
            }
            Venue::Okx => {
                let v = self
                    .get_json("/api/v5/market/ticker", &[("instId", symbol)])
                    .await?;
                check_okx(&v)?;
                num(&v["data"][0]["last"])
            }
        };
        price.with_context(|| format!("no last price for {pair} on {}", self.venue))
    }

    async fn fetch_order_book(
        &self,
        pair: &str,
        depth: usize,
    ) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)> {
        let symbol = wire_symbol(self.venue, pair);
        match self.venue {
            Venue::Binance => {
                let v = self
                    .get_json(
                        "/api/v3/depth",
                        &[
                            ("symbol", symbol),
                            ("limit", binance_depth_limit(depth).to_string()),
                        ],
                    )
                    .await?;
                Ok((levels(&v["bids"], depth), levels(&v["asks"], depth)))
            }
            Venue::Bybit => {
                let v = self
                    .get_json(
                        "/v5/market/orderbook",
                        &[
                            ("category", "spot".to_string()),
                            ("symbol", symbol),
                            ("limit", depth.clamp(1, 200).to_string()),
                        ],
                    )
                    .await?;
                check_bybit(&v)?;
                Ok((
                    levels(&v["result"]["b"], depth),
                    levels(&v["result"]["a"], depth),
                ))
            }
            Venue::Okx => {
                let v = self
                    .get_json(
                        "/api/v5/market/books",
                        &[("instId", symbol), ("sz", depth.clamp(1, 400).to_string())],
                    )
                    .await?;
                check_okx(&v)?;
                Ok((
                    levels(&v["data"][0]["bids"], depth),
                    levels(&v["data"][0]["asks"], depth),
                ))
            }
        }
    }
}

/// `ARB/USDT` -> `ARBUSDT` (Binance, Bybit) or `ARB-USDT` (OKX)
pub fn wire_symbol(venue: Venue, pair: &str) -> String {
    match venue {
        Venue::Binance | Venue::Bybit => pair.replace('/', ""),
        Venue::Okx => pair.replace('/', "-"),
    }
}

pub fn venue_interval(venue: Venue, timeframe: &str) -> Option<&'static str> {
    let tf = match timeframe {
        "15m" => 0,
        "1h" => 1,
        "4h" => 2,
        "1d" => 3,
        "1w" => 4,
        _ => return None,
    };
    let table: [&'static str; 5] = match venue {
        Venue::Binance => ["15m", "1h", "4h", "1d", "1w"],
        Venue::Bybit => ["15", "60", "240", "D", "W"],
        Venue::Okx => ["15m", "1H", "4H", "1D", "1W"],
    };
    Some(table[tf])
}

/// Binance only serves a fixed set of depth sizes.
fn binance_depth_limit(depth: usize) -> usize {
    [5, 10, 20, 50, 100, 500, 1000, 5000]
        .into_iter()
        .find(|&l| l >= depth)
        .unwrap_or(5000)
}

fn num(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn int(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// All three venues share the `[ts, open, high, low, close, volume, ...]` row layout.
fn candle_from_row(row: &Value) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 6 {
        return None;
    }
    Some(Candle {
        timestamp_ms: int(&arr[0])?,
        open: num(&arr[1])?,
        high: num(&arr[2])?,
        low: num(&arr[3])?,
        close: num(&arr[4])?,
        volume: num(&arr[5])?,
    })
}

fn rows_to_candles(rows: &Value) -> Result<Vec<Candle>> {
    let Some(rows) = rows.as_array() else {
        bail!("unexpected candle payload");
    };
    Ok(rows.iter().filter_map(candle_from_row).collect())
}

fn levels(v: &Value, depth: usize) -> Vec<PriceLevel> {
    v.as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let arr = row.as_array()?;
                    Some(PriceLevel {
                        price: num(arr.first()?)?,
                        quantity: num(arr.get(1)?)?,
                    })
                })
                .take(depth)
                .collect()
        })
        .unwrap_or_default()
}

fn check_bybit(v: &Value) -> Result<()> {
    match v.get("retCode").and_then(Value::as_i64) {
        Some(0) => Ok(()),
        code => bail!(
            "bybit error {:?}: {}",
            code,
            v.get("retMsg").and_then(Value::as_str).unwrap_or("unknown")
        ),
    }
}

fn check_okx(v: &Value) -> Result<()> {
    match v.get("code").and_then(Value::as_str) {
        Some("0") => Ok(()),
        code => bail!(
            "okx error {:?}: {}",
            code,
            v.get("msg").and_then(Value::as_str).unwrap_or("unknown")
        ),
    }
}

pub(crate) fn parse_binance_klines(v: &Value) -> Result<Vec<Candle>> {
    rows_to_candles(v)
}

pub(crate) fn parse_bybit_klines(v: &Value) -> Result<Vec<Candle>> {
    check_bybit(v)?;
    rows_to_candles(&v["result"]["list"])
}

pub(crate) fn parse_okx_candles(v: &Value) -> Result<Vec<Candle>> {
    check_okx(v)?;
    rows_to_candles(&v["data"])
}
