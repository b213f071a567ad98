//! Unlock Impact Engine - HTTP service
//!
//! Serves unlock trade signals and keeps a periodically refreshed snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unlock_engine::{
    api::{create_router, AppState},
    config::Settings,
    scheduler::{dashboard_refresh_polling, new_shared_snapshot},
    signals::SignalEngine,
};

#[derive(Parser, Debug)]
#[command(name = "unlock-engine", version, about = "Token unlock impact signal engine")]
struct Cli {
    /// Address to bind the HTTP server to (overrides settings)
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Compute the dashboard once, print it as JSON and exit
    #[arg(long)]
    once: bool,

    /// Number of upcoming unlocks to score in --once mode
    #[arg(long, default_value_t = 5)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!(
        "🚀 {} starting (env: {}, default venue: {})",
        settings.project_name, settings.app_env, settings.default_venue
    );
    info!("📮 Broker URL: {}", settings.broker_url);

    let engine = Arc::new(SignalEngine::from_settings(&settings).context("Failed to build signal engine")?);

    if cli.once {
        let signals = engine.dashboard_signals(Some(cli.limit)).await?;
        println!("{}", serde_json::to_string_pretty(&signals)?);
        engine.close();
        return Ok(());
    }

    let snapshot = new_shared_snapshot();
    let refresher = tokio::spawn(dashboard_refresh_polling(
        engine.clone(),
        snapshot.clone(),
        settings.refresh_interval,
    ));

    let bind_addr = cli.bind.clone().unwrap_or_else(|| settings.bind_addr.clone());
    let app = create_router(AppState {
        engine: engine.clone(),
        snapshot,
        settings: Arc::new(settings),
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("🎯 API server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    refresher.abort();
    engine.close();
    info!("👋 Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}

/// Initialize tracing with enhanced observability
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unlock_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate-root .env when run from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
