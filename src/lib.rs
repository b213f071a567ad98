//! Unlock Impact Engine
//!
//! Scores upcoming token unlocks against market liquidity and exchange-bound
//! on-chain flow, and serves the resulting trade signals over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod scheduler;
pub mod scrapers;
pub mod signals;
pub mod storage;

pub use config::Settings;
pub use error::EngineError;
pub use models::{SignalType, TradeSignal, UnlockEvent};
pub use signals::SignalEngine;
