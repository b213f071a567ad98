use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Settings;
use crate::error::EngineError;
use crate::middleware::request_logging;
use crate::models::{OrderBookDepth, TradeSignal, Venue};
use crate::scheduler::SharedSnapshot;
use crate::signals::market_aggregator::DEFAULT_DEPTH;
use crate::signals::SignalEngine;

const MAX_DASHBOARD_LIMIT: usize = 50;
const MAX_DEPTH_LEVELS: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SignalEngine>,
    pub snapshot: SharedSnapshot,
    pub settings: Arc<Settings>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let prefix = state.settings.api_prefix.trim_end_matches('/').to_string();
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route(&format!("{prefix}/signals/dashboard"), get(get_dashboard))
        .route(&format!("{prefix}/signals/latest"), get(get_latest))
        .route(&format!("{prefix}/market/:symbol/depth"), get(get_depth))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Any origin unless an explicit list is configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

// ===== Route Handlers =====

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        system: state.settings.project_name.clone(),
        status: "online".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.settings.app_env.clone(),
    })
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Signals for the soonest unlocks, computed on demand
async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<Vec<TradeSignal>>, ApiError> {
    let limit = params.limit.map(|l| l.min(MAX_DASHBOARD_LIMIT));
    let signals = state.engine.dashboard_signals(limit).await?;
    Ok(Json(signals))
}

/// Last snapshot published by the refresher
async fn get_latest(State(state): State<AppState>) -> Json<LatestResponse> {
    let snapshot = state.snapshot.read().clone();
    Json(match snapshot {
        Some(s) => LatestResponse {
            generated_at: Some(s.generated_at),
            signals: s.signals,
        },
        None => LatestResponse {
            generated_at: None,
            signals: Vec::new(),
        },
    })
}

async fn get_depth(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<DepthQuery>,
) -> Result<Json<OrderBookDepth>, ApiError> {
    let venue = match params.venue.as_deref() {
        Some(raw) => Some(raw.parse::<Venue>().map_err(ApiError::BadRequest)?),
        None => None,
    };
    let depth = params.depth.unwrap_or(DEFAULT_DEPTH).clamp(1, MAX_DEPTH_LEVELS);

    state
        .engine
        .market()
        .get_depth_liquidity(&symbol, venue, depth)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Unavailable(format!("Order book unavailable for {}", symbol)))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct DashboardQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct DepthQuery {
    venue: Option<String>,
    depth: Option<usize>,
}

#[derive(Serialize)]
struct RootResponse {
    system: String,
    status: String,
    version: String,
    environment: String,
}

#[derive(Serialize)]
struct LatestResponse {
    generated_at: Option<DateTime<Utc>>,
    signals: Vec<TradeSignal>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
    Unavailable(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Engine(err) => {
                tracing::error!("Signal pipeline error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnlockEvent;
    use crate::scheduler::new_shared_snapshot;
    use crate::scrapers::{EthRpcClient, SampleEventSource, UnlockEventSource};
    use crate::signals::market_aggregator::test_support::{flat_candles, StubVenue};
    use crate::signals::{
        ExchangeWalletRegistry, MarketAggregator, OnchainPressureAnalyzer, TokenRegistry,
        UnlockEventAggregator,
    };
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Down;

    #[async_trait]
    impl UnlockEventSource for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn fetch_unlocks(&self) -> anyhow::Result<Vec<UnlockEvent>> {
            anyhow::bail!("upstream 503")
        }
    }

    /// Sixty distinct future unlocks, one hour apart.
    struct Crowded;

    #[async_trait]
    impl UnlockEventSource for Crowded {
        fn name(&self) -> &str {
            "crowded"
        }

        async fn fetch_unlocks(&self) -> anyhow::Result<Vec<UnlockEvent>> {
            let now = chrono::Utc::now();
            Ok((0..60)
                .map(|i| UnlockEvent {
                    token_symbol: format!("T{}", i),
                    unlock_date: now + chrono::Duration::hours(i + 1),
                    unlock_amount: 1_000.0,
                    unlock_percent: 0.5,
                    is_cliff: false,
                    source: "crowded".to_string(),
                })
                .collect())
        }
    }

    fn app(source: Arc<dyn UnlockEventSource>, market_up: bool) -> Router {
        let timeout = Duration::from_secs(1);
        let candles = market_up.then(|| flat_candles(30, 1.0, 1_000.0));
        let engine = SignalEngine::new(
            MarketAggregator::new(Venue::Binance, timeout)
                .with_source(Arc::new(StubVenue::new(Venue::Binance, candles))),
            OnchainPressureAnalyzer::new(
                Arc::new(EthRpcClient::new(None, timeout).unwrap()),
                ExchangeWalletRegistry::with_defaults(),
                timeout,
            ),
            UnlockEventAggregator::new(source, timeout),
            TokenRegistry::with_defaults(),
            1.1,
        );
        let settings = Settings::from_lookup(|_| None).unwrap();
        create_router(AppState {
            engine: Arc::new(engine),
            snapshot: new_shared_snapshot(),
            settings: Arc::new(settings),
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (status, body) = get(app(Arc::new(SampleEventSource), true), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");

        let (status, body) = get(app(Arc::new(SampleEventSource), true), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_dashboard_returns_signals() {
        let (status, body) = get(
            app(Arc::new(SampleEventSource), true),
            "/api/v1/signals/dashboard?limit=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let signals = body.as_array().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0]["token"], "ARB");
        assert_eq!(signals[0]["signal"], "SHORT");
    }

    #[tokio::test]
    async fn test_dashboard_source_failure_is_500_with_detail() {
        let (status, body) = get(app(Arc::new(Down), true), "/api/v1/signals/dashboard").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("upstream 503"));
    }

    #[tokio::test]
    async fn test_latest_is_empty_before_first_refresh() {
        let (status, body) = get(app(Arc::new(SampleEventSource), true), "/api/v1/signals/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["generated_at"].is_null());
        assert_eq!(body["signals"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_depth_endpoint() {
        let (status, body) = get(
            app(Arc::new(SampleEventSource), true),
            "/api/v1/market/arb/depth?depth=5",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "ARB/USDT");
        assert_eq!(body["bids"].as_array().unwrap().len(), 5);

        let (status, _) = get(
            app(Arc::new(SampleEventSource), true),
            "/api/v1/market/arb/depth?venue=kraken",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            get(app(Arc::new(SampleEventSource), false), "/api/v1/market/arb/depth").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["detail"].as_str().unwrap().contains("arb"));
    }

    #[tokio::test]
    async fn test_dashboard_limit_is_capped() {
        let (status, body) =
            get(app(Arc::new(Crowded), true), "/api/v1/signals/dashboard?limit=100").await;
        assert_eq!(status, StatusCode::OK);
        let signals = body.as_array().unwrap();
        assert_eq!(signals.len(), MAX_DASHBOARD_LIMIT);
        assert_eq!(signals[0]["token"], "T0");
        assert_eq!(signals[49]["token"], "T49");

        let (_, body) = get(app(Arc::new(Crowded), true), "/api/v1/signals/dashboard").await;
        assert_eq!(body.as_array().unwrap().len(), 5);
    }
}
