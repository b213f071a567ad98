//! Signal Engine
//!
//! Owns the three collaborators and turns upcoming unlock events into
//! `TradeSignal`s. Per event, the market fetch and the on-chain fetch run
//! concurrently; events are processed concurrently and returned in input order.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::EngineError;
use crate::models::{CandleSeries, TradeSignal, UnlockEvent};
use crate::scrapers::{
    EthRpcClient, FileEventSource, SampleEventSource, TokenUnlocksClient, UnlockEventSource,
};
use crate::signals::calculator::{build_signal, unlock_impact_score};
use crate::signals::market_aggregator::MarketAggregator;
use crate::signals::onchain_pressure::OnchainPressureAnalyzer;
use crate::signals::token_registry::TokenRegistry;
use crate::signals::unlock_aggregator::{UnlockEventAggregator, DEFAULT_UNLOCK_LIMIT};
use crate::storage::FetchCache;

pub struct SignalEngine {
    market: MarketAggregator,
    onchain: OnchainPressureAnalyzer,
    unlocks: UnlockEventAggregator,
    tokens: TokenRegistry,
    historical_dump_factor: f64,
    cache: Option<Arc<FetchCache>>,
}

impl SignalEngine {
    pub fn new(
        market: MarketAggregator,
        onchain: OnchainPressureAnalyzer,
        unlocks: UnlockEventAggregator,
        tokens: TokenRegistry,
        historical_dump_factor: f64,
    ) -> Self {
        Self {
            market,
            onchain,
            unlocks,
            tokens,
            historical_dump_factor,
            cache: None,
        }
    }

    /// Build every client once; they live as long as the engine.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let market = MarketAggregator::from_settings(settings)?;

        let rpc = EthRpcClient::new(settings.onchain_rpc_url(), settings.fetch_timeout)?;
        if rpc.is_configured() {
            info!("⛓️  On-chain RPC configured");
        } else {
            warn!("⚠️  No ALCHEMY_API_KEY / ETH_RPC_URL - on-chain pressure will read 0.0");
        }
        let onchain = OnchainPressureAnalyzer::new(
            Arc::new(rpc),
            OnchainPressureAnalyzer::wallets_from_settings(settings),
            settings.fetch_timeout,
        );

        let cache = match &settings.cache_db_path {
            Some(path) => Some(Arc::new(FetchCache::open(path)?)),
            None => None,
        };

        let source: Arc<dyn UnlockEventSource> =
            if let Some(key) = &settings.token_unlocks_api_key {
                let mut client = TokenUnlocksClient::new(key, settings.fetch_timeout)?;
                if let Some(cache) = &cache {
                    client = client.with_cache(cache.clone());
                }
                Arc::new(client)
            } else if let Some(path) = &settings.unlocks_file {
                info!("📄 Reading unlock events from {}", path.display());
                Arc::new(FileEventSource::new(path.clone()))
            } else {
                warn!("⚠️  No TOKEN_UNLOCKS_API_KEY or UNLOCKS_FILE - using sample unlock events");
                Arc::new(SampleEventSource)
            };
        if settings.cryptorank_api_key.is_some() {
            debug!("CRYPTORANK_API_KEY set; vesting provenance lookup is not wired");
        }
        info!(source = source.name(), "🔓 Unlock event source ready");

        let unlocks = UnlockEventAggregator::new(source, settings.fetch_timeout);
        let tokens = TokenRegistry::from_settings(settings);

        let mut engine = Self::new(
            market,
            onchain,
            unlocks,
            tokens,
            settings.historical_dump_factor,
        );
        engine.cache = cache;
        Ok(engine)
    }

    pub fn market(&self) -> &MarketAggregator {
        &self.market
    }

    pub fn calculate_uis(&self, event: &UnlockEvent, series: &CandleSeries) -> f64 {
        unlock_impact_score(event, series, self.historical_dump_factor)
    }

    /// Signal for one event with a caller-supplied on-chain confidence.
    pub async fn generate_signal(&self, event: &UnlockEvent, onchain_confidence: f64) -> TradeSignal {
        let series = self.market.daily_history(&event.token_symbol).await;
        let uis = self.calculate_uis(event, &series);
        build_signal(event, uis, onchain_confidence)
    }

    /// Market history and on-chain pressure fetched together.
    pub async fn evaluate_event(&self, event: &UnlockEvent) -> TradeSignal {
        let contract = self.tokens.contract_for(&event.token_symbol);

        let (series, onchain) = tokio::join!(
            self.market.daily_history(&event.token_symbol),
            async {
                match contract {
                    Some(addr) => self.onchain.analyze_movement_to_cex(addr).await,
                    None => 0.0,
                }
            }
        );

        let uis = self.calculate_uis(event, &series);
        let signal = build_signal(event, uis, onchain);
        debug!(
            token = %signal.token,
            signal = signal.signal.as_str(),
            uis = signal.uis_score,
            confidence = signal.confidence,
            "signal generated"
        );
        signal
    }

    /// Signals for the next `limit` unlocks (default 5), soonest first.
    pub async fn dashboard_signals(&self, limit: Option<usize>) -> Result<Vec<TradeSignal>, EngineError> {
        let limit = limit.unwrap_or(DEFAULT_UNLOCK_LIMIT);
        let events = self.unlocks.get_next_major_unlocks(limit).await?;
        let signals = join_all(events.iter().map(|e| self.evaluate_event(e))).await;
        info!(
            events = events.len(),
            source = self.unlocks.source_name(),
            "📊 Dashboard computed"
        );
        Ok(signals)
    }

    /// Release persistent resources. HTTP pools drop with the engine.
    pub fn close(&self) {
        if let Some(cache) = &self.cache {
            cache.close();
        }
        info!("🛑 Signal engine closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalType, TransferLog, Venue};
    use crate::scrapers::{TransferLogSource, TRANSFER_EVENT_TOPIC};
    use crate::signals::market_aggregator::test_support::{flat_candles, StubVenue};
    use crate::signals::onchain_pressure::ExchangeWalletRegistry;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    struct Events(Vec<UnlockEvent>);

    #[async_trait]
    impl UnlockEventSource for Events {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_unlocks(&self) -> anyhow::Result<Vec<UnlockEvent>> {
            Ok(self.0.clone())
        }
    }

    /// Every contract sees `n` transfers into Binance 14.
    struct CexInflows(usize);

    #[async_trait]
    impl TransferLogSource for CexInflows {
        async fn fetch_transfer_logs(
            &self,
            _contract: &str,
            _from_block: &str,
        ) -> anyhow::Result<Vec<TransferLog>> {
            let log = TransferLog {
                topics: vec![
                    TRANSFER_EVENT_TOPIC.to_string(),
                    format!("0x{}", "0".repeat(64)),
                    "0x00000000000000000000000028c6c06298d514db089934071355e5743bf21d60".to_string(),
                ],
                ..Default::default()
            };
            Ok(vec![log; self.0])
        }
    }

    fn event(symbol: &str, days: i64, amount: f64, is_cliff: bool) -> UnlockEvent {
        UnlockEvent {
            token_symbol: symbol.to_string(),
            unlock_date: Utc::now() + ChronoDuration::days(days),
            unlock_amount: amount,
            unlock_percent: 1.0,
            is_cliff,
            source: "test".to_string(),
        }
    }

    fn engine(venue: StubVenue, events: Vec<UnlockEvent>, inflows: usize) -> SignalEngine {
        let timeout = Duration::from_secs(1);
        SignalEngine::new(
            MarketAggregator::new(Venue::Binance, timeout).with_source(Arc::new(venue)),
            OnchainPressureAnalyzer::new(
                Arc::new(CexInflows(inflows)),
                ExchangeWalletRegistry::with_defaults(),
                timeout,
            ),
            UnlockEventAggregator::new(Arc::new(Events(events)), timeout),
            TokenRegistry::with_defaults(),
            1.1,
        )
    }

    #[tokio::test]
    async fn test_empty_market_gives_degraded_avoid() {
        let e = engine(StubVenue::new(Venue::Binance, None), vec![], 0);
        let s = e.generate_signal(&event("ARB", 1, 1e9, true), 1.0).await;
        assert_eq!(s.signal, SignalType::Avoid);
        assert_eq!(s.uis_score, 0.0);
        assert_eq!(s.expected_move_pct, 0.0);
        assert_eq!(s.confidence, 65.0);
    }

    #[tokio::test]
    async fn test_onchain_pressure_corroborates_short() {
        // flat close 1.0, volume 1000: adv = 1000, unlock value 1e6 -> UIS 1100
        let venue = StubVenue::new(Venue::Binance, Some(flat_candles(30, 1.0, 1_000.0)));
        let e = engine(venue, vec![], 3);
        let s = e.evaluate_event(&event("ARB", 1, 1e6, true)).await;
        assert_eq!(s.signal, SignalType::Short);
        assert_eq!(s.uis_score, 1100.0);
        // 50 + 15 + 0.6 * 20
        assert!((s.confidence - 77.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_contract_skips_onchain() {
        let venue = StubVenue::new(Venue::Binance, Some(flat_candles(30, 1.0, 1_000.0)));
        let e = engine(venue, vec![], 5);
        let s = e.evaluate_event(&event("SUI", 1, 1e6, false)).await;
        assert_eq!(s.signal, SignalType::Short);
        assert_eq!(s.confidence, 50.0);
    }

    #[tokio::test]
    async fn test_dashboard_preserves_event_order() {
        let venue = StubVenue::new(Venue::Binance, Some(flat_candles(30, 1.0, 1_000.0)));
        let events = vec![
            event("SUI", 5, 100.0, false),
            event("ARB", 2, 1e6, true),
            event("OLD", -1, 1e6, true),
        ];
        let e = engine(venue, events, 0);
        let signals = e.dashboard_signals(None).await.unwrap();
        let tokens: Vec<&str> = signals.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["ARB", "SUI"]);
        // 100 / 1000 * 1.1 = 0.11
        assert_eq!(signals[1].signal, SignalType::LongAfterDump);

        let one = e.dashboard_signals(Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
    }
}
