//! Market Aggregator
//!
//! Normalizes symbols, routes reads to a venue and converts every upstream
//! failure into the "insufficient data" value (empty series, 0.0 price, no depth).

use std::{collections::HashMap, sync::Arc, time::Duration};

use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::{CandleSeries, OrderBookDepth, Venue};
use crate::scrapers::{bounded_fetch, ExchangeRestClient, MarketDataSource};

pub const DEFAULT_QUOTE: &str = "USDT";
pub const DEFAULT_TIMEFRAME: &str = "1d";
pub const DEFAULT_LOOKBACK: usize = 30;
pub const DEFAULT_DEPTH: usize = 20;

/// Uppercase and default the quote asset: `arb` -> `ARB/USDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if upper.contains('/') {
        upper
    } else {
        format!("{}/{}", upper, DEFAULT_QUOTE)
    }
}

/// Derived statistics over a non-empty candle series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketStats {
    pub samples: usize,
    pub mean_volume: f64,
    pub mean_close: f64,
    pub last_close: f64,
    /// mean(volume) × mean(close), an approximation of USD turnover per period
    pub avg_daily_volume_usd: f64,
    /// Sample std-dev of close-to-close returns
    pub volatility: f64,
}

impl MarketStats {
    pub fn from_series(series: &CandleSeries) -> Option<Self> {
        let last_close = series.last_close()?;
        let mean_volume = series.volumes().mean();
        let mean_close = series.closes().mean();
        let returns = pct_returns(series);

        Some(Self {
            samples: series.len(),
            mean_volume,
            mean_close,
            last_close,
            avg_daily_volume_usd: mean_volume * mean_close,
            volatility: sample_std_dev(&returns),
        })
    }
}

/// Period-over-period returns, skipping periods whose prior close is zero.
pub fn pct_returns(series: &CandleSeries) -> Vec<f64> {
    series
        .candles()
        .windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

/// n−1 standard deviation; fewer than two samples has no spread.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sd = values.iter().std_dev();
    if sd.is_finite() {
        sd
    } else {
        0.0
    }
}

pub struct MarketAggregator {
    venues: HashMap<Venue, Arc<dyn MarketDataSource>>,
    default_venue: Venue,
    fetch_timeout: Duration,
}

impl MarketAggregator {
    pub fn new(default_venue: Venue, fetch_timeout: Duration) -> Self {
        Self {
            venues: HashMap::new(),
            default_venue,
            fetch_timeout,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.venues.insert(source.venue(), source);
        self
    }

    /// One REST client per supported venue; credentials are optional.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut aggregator = Self::new(settings.default_venue, settings.fetch_timeout);
        for venue in Venue::ALL {
            let client = ExchangeRestClient::new(
                venue,
                settings.credentials(venue),
                settings.fetch_timeout,
            )?;
            info!(
                venue = %venue,
                authenticated = client.is_authenticated(),
                "📈 Market venue initialized"
            );
            aggregator = aggregator.with_source(Arc::new(client));
        }
        Ok(aggregator)
    }

    pub fn default_venue(&self) -> Venue {
        self.default_venue
    }

    fn source(&self, venue: Option<Venue>) -> Option<&Arc<dyn MarketDataSource>> {
        let venue = venue.unwrap_or(self.default_venue);
        let source = self.venues.get(&venue);
        if source.is_none() {
            warn!(venue = %venue, "venue not initialized");
        }
        source
    }

    pub async fn get_ohlcv(
        &self,
        symbol: &str,
        venue: Option<Venue>,
        timeframe: &str,
        limit: usize,
    ) -> CandleSeries {
        let Some(source) = self.source(venue) else {
            return CandleSeries::empty();
        };
        let pair = normalize_symbol(symbol);

        match bounded_fetch(
            source.venue().as_str(),
            self.fetch_timeout,
            source.fetch_ohlcv(&pair, timeframe, limit),
        )
        .await
        {
            Ok(candles) => CandleSeries::from_candles(candles, limit),
            Err(e) => {
                warn!(symbol = %pair, venue = %source.venue(), error = %e, "OHLCV fetch failed");
                CandleSeries::empty()
            }
        }
    }

    /// Default lookback used by the classifier: 30 daily candles on the default venue.
    pub async fn daily_history(&self, symbol: &str) -> CandleSeries {
        self.get_ohlcv(symbol, None, DEFAULT_TIMEFRAME, DEFAULT_LOOKBACK)
            .await
    }

    /// Last trade price, or 0.0 when unavailable.
    pub async fn get_current_price(&self, symbol: &str, venue: Option<Venue>) -> f64 {
        let Some(source) = self.source(venue) else {
            return 0.0;
        };
        let pair = normalize_symbol(symbol);

        match bounded_fetch(
            source.venue().as_str(),
            self.fetch_timeout,
            source.fetch_last_price(&pair),
        )
        .await
        {
            Ok(price) if price.is_finite() => price,
            Ok(_) => 0.0,
            Err(e) => {
                warn!(symbol = %pair, venue = %source.venue(), error = %e, "price fetch failed");
                0.0
            }
        }
    }

    pub async fn get_depth_liquidity(
        &self,
        symbol: &str,
        venue: Option<Venue>,
        depth: usize,
    ) -> Option<OrderBookDepth> {
        let source = self.source(venue)?;
        let pair = normalize_symbol(symbol);

        match bounded_fetch(
            source.venue().as_str(),
            self.fetch_timeout,
            source.fetch_order_book(&pair, depth),
        )
        .await
        {
            Ok((bids, asks)) => Some(OrderBookDepth::new(pair, source.venue(), bids, asks)),
            Err(e) => {
                warn!(symbol = %pair, venue = %source.venue(), error = %e, "depth fetch failed");
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("arb"), "ARB/USDT");
        assert_eq!(normalize_symbol(" sui "), "SUI/USDT");
        assert_eq!(normalize_symbol("eth/btc"), "ETH/BTC");
    }

    #[test]
    fn test_std_dev_edge_cases() {
        assert_eq!(sample_std_dev(&[]), 0.0);
        assert_eq!(sample_std_dev(&[0.3]), 0.0);
        assert!((sample_std_dev(&[0.1, -0.1]) - 0.1 * 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_returns_skip_zero_prior_close() {
        let mut candles = flat_candles(3, 1.0, 1.0);
        candles[0].close = 0.0;
        candles[2].close = 1.5;
        let series = CandleSeries::from_candles(candles, 30);
        let r = pct_returns(&series);
        assert_eq!(r.len(), 1);
        assert!((r[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stats_on_flat_series() {
        let series = CandleSeries::from_candles(flat_candles(30, 2.0, 1_000.0), 30);
        let stats = MarketStats::from_series(&series).unwrap();
        assert_eq!(stats.samples, 30);
        assert!((stats.avg_daily_volume_usd - 2_000.0).abs() < 1e-9);
        assert_eq!(stats.volatility, 0.0);
        assert!(MarketStats::from_series(&CandleSeries::empty()).is_none());
    }

    #[tokio::test]
    async fn test_ohlcv_normalizes_and_limits() {
        let stub = Arc::new(StubVenue::new(Venue::Binance, Some(flat_candles(40, 1.0, 1.0))));
        let agg = MarketAggregator::new(Venue::Binance, Duration::from_secs(1))
            .with_source(stub.clone());

        let series = agg.daily_history("arb").await;
        assert_eq!(series.len(), DEFAULT_LOOKBACK);
        assert_eq!(stub.requested.lock().as_slice(), ["ARB/USDT".to_string()]);
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        let agg = MarketAggregator::new(Venue::Binance, Duration::from_secs(1))
            .with_source(Arc::new(StubVenue::new(Venue::Binance, None)));

        assert!(agg.daily_history("ARB").await.is_empty());
        assert_eq!(agg.get_current_price("ARB", None).await, 0.0);
        assert!(agg.get_depth_liquidity("ARB", None, 20).await.is_none());
        // venue that was never registered
        assert!(agg.get_ohlcv("ARB", Some(Venue::Okx), "1d", 30).await.is_empty());
        assert_eq!(agg.get_current_price("ARB", Some(Venue::Okx)).await, 0.0);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_empty() {
        let mut stub = StubVenue::new(Venue::Bybit, Some(flat_candles(5, 1.0, 1.0)));
        stub.delay = Duration::from_millis(200);
        let agg = MarketAggregator::new(Venue::Bybit, Duration::from_millis(20))
            .with_source(Arc::new(stub));
        assert!(agg.daily_history("ARB").await.is_empty());
    }

    #[tokio::test]
    async fn test_depth_aggregates_top_levels() {
        let agg = MarketAggregator::new(Venue::Binance, Duration::from_secs(1))
            .with_source(Arc::new(StubVenue::new(Venue::Binance, Some(flat_candles(1, 1.0, 1.0)))));
        let depth = agg.get_depth_liquidity("arb", None, DEFAULT_DEPTH).await.unwrap();
        assert_eq!(depth.symbol, "ARB/USDT");
        assert_eq!(depth.bids.len(), 20);
        assert_eq!(depth.bid_volume, 200.0);
        assert_eq!(depth.ask_volume, 100.0);
        assert_eq!(agg.get_current_price("arb", None).await, 1.0);
    }
}
