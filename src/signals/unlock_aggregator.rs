//! Unlock Event Aggregator
//!
//! Filters a source's events down to the next few upcoming unlocks.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::EngineError;
use crate::models::UnlockEvent;
use crate::scrapers::{bounded_fetch, UnlockEventSource};

pub const DEFAULT_UNLOCK_LIMIT: usize = 5;

/// Strictly-future events, earliest first, at most `limit`.
///
/// Ties keep source order.
pub fn select_upcoming(
    events: Vec<UnlockEvent>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<UnlockEvent> {
    let mut upcoming: Vec<UnlockEvent> = events
        .into_iter()
        .filter(|e| e.unlock_date > now)
        .collect();
    upcoming.sort_by_key(|e| e.unlock_date);
    upcoming.truncate(limit);
    upcoming
}

pub struct UnlockEventAggregator {
    source: Arc<dyn UnlockEventSource>,
    fetch_timeout: Duration,
}

impl UnlockEventAggregator {
    pub fn new(source: Arc<dyn UnlockEventSource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            fetch_timeout,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// A source failure is an `Aggregate` error, never an empty list.
    pub async fn get_next_major_unlocks(
        &self,
        limit: usize,
    ) -> Result<Vec<UnlockEvent>, EngineError> {
        let events = bounded_fetch(self.source.name(), self.fetch_timeout, self.source.fetch_unlocks())
            .await
            .map_err(|e| {
                error!(source = self.source.name(), error = %e, "unlock event fetch failed");
                EngineError::Aggregate(e.to_string())
            })?;

        let fetched = events.len();
        let upcoming = select_upcoming(events, Utc::now(), limit);
        debug!(
            source = self.source.name(),
            fetched,
            upcoming = upcoming.len(),
            "unlock events selected"
        );
        Ok(upcoming)
    }
}
