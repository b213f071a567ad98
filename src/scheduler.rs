//! Periodic dashboard refresh.
//!
//! Recomputes the dashboard on a fixed interval and publishes the result for
//! `/api/v1/signals/latest`. A failed sweep keeps the previous snapshot.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::models::TradeSignal;
use crate::signals::SignalEngine;

#[derive(Debug, Clone, Serialize)]
pub struct SignalSnapshot {
    pub generated_at: DateTime<Utc>,
    pub signals: Vec<TradeSignal>,
}

pub type SharedSnapshot = Arc<RwLock<Option<SignalSnapshot>>>;

pub fn new_shared_snapshot() -> SharedSnapshot {
    Arc::new(RwLock::new(None))
}

/// One sweep; returns false when the engine could not produce a dashboard.
pub async fn refresh_once(engine: &SignalEngine, snapshot: &SharedSnapshot) -> bool {
    match engine.dashboard_signals(None).await {
        Ok(signals) => {
            let count = signals.len();
            *snapshot.write() = Some(SignalSnapshot {
                generated_at: Utc::now(),
                signals,
            });
            info!("🔄 Dashboard snapshot refreshed: {} signals", count);
            true
        }
        Err(e) => {
            warn!("Dashboard refresh failed (keeping previous snapshot): {}", e);
            false
        }
    }
}

pub async fn dashboard_refresh_polling(
    engine: Arc<SignalEngine>,
    snapshot: SharedSnapshot,
    every: Duration,
) {
    if every.is_zero() {
        info!("⏸️  Dashboard refresher disabled (REFRESH_INTERVAL_SECS=0)");
        return;
    }
    info!("⏱️  Starting dashboard refresher (every {}s)", every.as_secs());

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        refresh_once(&engine, &snapshot).await;
    }
}
