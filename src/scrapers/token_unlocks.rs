//! Unlock Event Sources
//!
//! - `TokenUnlocksClient`: TokenUnlocks REST API (bearer credential), optionally
//!   fronted by the SQLite fetch cache
//! - `FileEventSource`: JSON file of `UnlockEvent`s
//! - `SampleEventSource`: two fixed development events relative to now

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::models::UnlockEvent;
use crate::storage::FetchCache;

const TOKEN_UNLOCKS_API_BASE: &str = "https://api.tokenunlocks.app/v1";
const CACHE_KEY: &str = "token_unlocks_v1:all";
const CACHE_TTL_SECONDS: i64 = 15 * 60;
const SOURCE_TAG: &str = "TokenUnlocks";

#[async_trait]
pub trait UnlockEventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Every unlock the source knows about, in source order.
    async fn fetch_unlocks(&self) -> Result<Vec<UnlockEvent>>;
}

pub struct TokenUnlocksClient {
    client: Client,
    base_url: String,
    cache: Option<Arc<FetchCache>>,
}

impl TokenUnlocksClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", api_key)
                        .parse()
                        .context("Invalid TokenUnlocks api key")?,
                );
                headers
            })
            .build()
            .context("Failed to build TokenUnlocksClient")?;

        Ok(Self {
            client,
            base_url: TOKEN_UNLOCKS_API_BASE.to_string(),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<FetchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fresh cached events, if any. A cached body that no longer parses is ignored.
    fn cached_events(&self, now: i64) -> Option<Vec<UnlockEvent>> {
        let cache = self.cache.as_ref()?;
        let body = match cache.get_fresh(CACHE_KEY, CACHE_TTL_SECONDS, now) {
            Ok(body) => body?,
            Err(e) => {
                warn!("Fetch cache read failed: {e:#}");
                return None;
            }
        };
        match parse_unlocks_payload(&body, SOURCE_TAG) {
            Ok(events) => {
                debug!("token unlocks served from cache");
                Some(events)
            }
            Err(e) => {
                warn!("Discarding unreadable cached unlocks: {e:#}");
                None
            }
        }
    }

    async fn fetch_body(&self) -> Result<String> {
        let url = format!("{}/unlocks", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /unlocks failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET /unlocks {}: {}", status, text));
        }

        resp.text().await.context("GET /unlocks body")
    }
}

#[async_trait]
impl UnlockEventSource for TokenUnlocksClient {
    fn name(&self) -> &str {
        "token_unlocks"
    }

    /// Only bodies that decode are written back to the cache.
    async fn fetch_unlocks(&self) -> Result<Vec<UnlockEvent>> {
        let now = Utc::now().timestamp();
        if let Some(events) = self.cached_events(now) {
            return Ok(events);
        }

        let body = self.fetch_body().await?;
        let events = parse_unlocks_payload(&body, SOURCE_TAG)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.upsert(CACHE_KEY, &body, now) {
                warn!("Fetch cache write failed: {e:#}");
            }
        }

        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UnlocksPayload {
    Wrapped { data: Vec<WireUnlock> },
    Bare(Vec<WireUnlock>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUnlock {
    #[serde(alias = "symbol", alias = "token")]
    token_symbol: String,
    #[serde(alias = "date", alias = "unlockTime", deserialize_with = "de_timestamp")]
    unlock_date: DateTime<Utc>,
    #[serde(alias = "amount", alias = "tokens", deserialize_with = "de_f64")]
    unlock_amount: f64,
    #[serde(
        default,
        alias = "percent",
        alias = "percentOfCirculating",
        deserialize_with = "de_f64"
    )]
    unlock_percent: f64,
    #[serde(default, alias = "cliff")]
    is_cliff: bool,
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!("expected number, got {other}"))),
    }
}

/// RFC 3339 string, or unix seconds / milliseconds.
fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))?;
            let millis = if raw.abs() >= 1_000_000_000_000 { raw } else { raw * 1000 };
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| serde::de::Error::custom("invalid timestamp"))
        }
        other => Err(serde::de::Error::custom(format!("expected timestamp, got {other}"))),
    }
}

/// Decode an unlocks payload, dropping rows with a non-positive amount.
pub fn parse_unlocks_payload(body: &str, source: &str) -> Result<Vec<UnlockEvent>> {
    let payload: UnlocksPayload =
        serde_json::from_str(body).context("unlocks json parse")?;
    let rows = match payload {
        UnlocksPayload::Wrapped { data } => data,
        UnlocksPayload::Bare(rows) => rows,
    };

    Ok(rows
        .into_iter()
        .filter_map(|w| {
            if !(w.unlock_amount.is_finite() && w.unlock_amount > 0.0) {
                debug!(token = %w.token_symbol, amount = w.unlock_amount, "dropping unlock with non-positive amount");
                return None;
            }
            Some(UnlockEvent {
                token_symbol: w.token_symbol.trim().to_uppercase(),
                unlock_date: w.unlock_date,
                unlock_amount: w.unlock_amount,
                unlock_percent: w.unlock_percent,
                is_cliff: w.is_cliff,
                source: source.to_string(),
            })
        })
        .collect())
}

/// Reads a JSON array of `UnlockEvent` on every fetch.
pub struct FileEventSource {
    path: PathBuf,
}

impl FileEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UnlockEventSource for FileEventSource {
    fn name(&self) -> &str {
        "unlocks_file"
    }

    async fn fetch_unlocks(&self) -> Result<Vec<UnlockEvent>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let events: Vec<UnlockEvent> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(events
            .into_iter()
            .filter(|e| e.unlock_amount.is_finite() && e.unlock_amount > 0.0)
            .collect())
    }
}

/// Development feed used when no credential or file is configured.
pub struct SampleEventSource;

#[async_trait]
impl UnlockEventSource for SampleEventSource {
    fn name(&self) -> &str {
        "sample"
    }

    async fn fetch_unlocks(&self) -> Result<Vec<UnlockEvent>> {
        let now = Utc::now();
        Ok(vec![
            UnlockEvent {
                token_symbol: "ARB".to_string(),
                unlock_date: now + ChronoDuration::days(2),
                unlock_amount: 1_110_000_000.0,
                unlock_percent: 18.5,
                is_cliff: true,
                source: "TokenUnlocks".to_string(),
            },
            UnlockEvent {
                token_symbol: "SUI".to_string(),
                unlock_date: now + ChronoDuration::days(5),
                unlock_amount: 34_000_000.0,
                unlock_percent: 2.4,
                is_cliff: false,
                source: "TokenUnlocks".to_string(),
            },
        ])
    }
}
