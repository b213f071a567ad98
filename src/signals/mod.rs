pub mod calculator;
pub mod engine;
pub mod market_aggregator;
pub mod onchain_pressure;
pub mod token_registry;
pub mod unlock_aggregator;

pub use calculator::{build_signal, classify, unlock_impact_score};
pub use engine::SignalEngine;
pub use market_aggregator::{normalize_symbol, MarketAggregator, MarketStats};
pub use onchain_pressure::{ExchangeWalletRegistry, OnchainPressureAnalyzer};
pub use token_registry::TokenRegistry;
pub use unlock_aggregator::{select_upcoming, UnlockEventAggregator};
