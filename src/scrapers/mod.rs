pub mod exchange_rest; // Binance / Bybit / OKX public market endpoints
pub mod onchain_rpc; // eth_getLogs transfer reader
pub mod token_unlocks; // Unlock event sources (TokenUnlocks API, JSON file, sample)

use std::{future::Future, time::Duration};

use crate::error::EngineError;

pub use exchange_rest::{ExchangeRestClient, MarketDataSource};
pub use onchain_rpc::{EthRpcClient, TransferLogSource, TRANSFER_EVENT_TOPIC};
pub use token_unlocks::{FileEventSource, SampleEventSource, TokenUnlocksClient, UnlockEventSource};

/// Run an upstream fetch under a hard deadline.
///
/// Transport errors and timeouts both come back as `UpstreamFault` so callers
/// can degrade them the same way.
pub async fn bounded_fetch<T, F>(
    source_name: &str,
    deadline: Duration,
    fut: F,
) -> Result<T, EngineError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EngineError::upstream(source_name, format!("{e:#}"))),
        Err(_) => Err(EngineError::upstream(
            source_name,
            format!("timed out after {}ms", deadline.as_millis()),
        )),
    }
}
