//! Onchain Pressure Analyzer
//!
//! Scores how many recent ERC-20 transfers land in known exchange deposit
//! wallets. Coarse on purpose: each qualifying transfer adds a fixed increment,
//! regardless of size.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::config::Settings;
use crate::models::TransferLog;
use crate::scrapers::{bounded_fetch, TransferLogSource};

pub const PRESSURE_INCREMENT: f64 = 0.2;
pub const DEFAULT_FROM_BLOCK: &str = "latest";

/// Known CEX hot wallets
const DEFAULT_EXCHANGE_WALLETS: &[(&str, &str)] = &[
    ("0x28C6c06298d514Db089934071355E5743bf21d60", "Binance 14"),
    ("0x21a31Ee1afC51d94C2eFcCAa2092aD1028285549", "Binance 15"),
    ("0xf89d7b9c864f589bbf53a82105107622b35eaa40", "Bybit"),
];

/// `0x`-prefixed lower-case form of a 20-byte hex address.
pub fn canonical_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let hex_part = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex_part.to_ascii_lowercase()))
}

/// Address held in the low 20 bytes of a 32-byte indexed topic.
pub fn address_from_topic(topic: &str) -> Option<String> {
    let raw = topic.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(format!("0x{}", hex::encode(&bytes[12..])))
}

/// Canonical address -> label
#[derive(Debug, Clone, Default)]
pub struct ExchangeWalletRegistry {
    wallets: HashMap<String, String>,
}

impl ExchangeWalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (address, label) in DEFAULT_EXCHANGE_WALLETS {
            registry.insert(address, label);
        }
        registry
    }

    /// Returns false if the address is malformed.
    pub fn insert(&mut self, address: &str, label: &str) -> bool {
        match canonical_address(address) {
            Some(addr) => {
                self.wallets.insert(addr, label.to_string());
                true
            }
            None => false,
        }
    }

    pub fn label_for(&self, address: &str) -> Option<&str> {
        let addr = canonical_address(address)?;
        self.wallets.get(&addr).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

/// Destination wallet of an ERC-20 `Transfer` log (topic[2]).
pub fn transfer_destination(log: &TransferLog) -> Option<String> {
    log.topics.get(2).and_then(|t| address_from_topic(t))
}

/// Pure scoring: +0.2 per transfer into a known exchange wallet, clamped to [0, 1].
pub fn score_transfers(logs: &[TransferLog], wallets: &ExchangeWalletRegistry) -> f64 {
    let mut pressure = 0.0;
    for log in logs {
        let Some(to) = transfer_destination(log) else {
            continue;
        };
        if let Some(label) = wallets.label_for(&to) {
            debug!(to = %to, exchange = label, "transfer into exchange wallet");
            pressure += PRESSURE_INCREMENT;
        }
    }
    f64::min(pressure, 1.0).max(0.0)
}

pub struct OnchainPressureAnalyzer {
    source: Arc<dyn TransferLogSource>,
    wallets: ExchangeWalletRegistry,
    fetch_timeout: Duration,
}

impl OnchainPressureAnalyzer {
    pub fn new(
        source: Arc<dyn TransferLogSource>,
        wallets: ExchangeWalletRegistry,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            wallets,
            fetch_timeout,
        }
    }

    /// Built-in wallets plus any configured in `EXCHANGE_WALLETS`.
    pub fn wallets_from_settings(settings: &Settings) -> ExchangeWalletRegistry {
        let mut wallets = ExchangeWalletRegistry::with_defaults();
        for (address, label) in &settings.exchange_wallets {
            wallets.insert(address, label);
        }
        wallets
    }

    pub fn wallets(&self) -> &ExchangeWalletRegistry {
        &self.wallets
    }

    /// Transfer logs for a contract; failures come back empty.
    pub async fn get_token_transfers(&self, contract: &str, from_block: &str) -> Vec<TransferLog> {
        match bounded_fetch(
            "onchain_rpc",
            self.fetch_timeout,
            self.source.fetch_transfer_logs(contract, from_block),
        )
        .await
        {
            Ok(logs) => logs,
            Err(e) => {
                warn!(contract, error = %e, "transfer log fetch failed");
                Vec::new()
            }
        }
    }

    /// Pressure score in [0, 1]; 0.0 means no data or no pressure.
    pub async fn analyze_movement_to_cex(&self, contract: &str) -> f64 {
        let logs = self.get_token_transfers(contract, DEFAULT_FROM_BLOCK).await;
        let score = score_transfers(&logs, &self.wallets);
        debug!(contract, transfers = logs.len(), pressure = score, "onchain pressure scored");
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::TRANSFER_EVENT_TOPIC;
    use async_trait::async_trait;

    fn topic_for(address: &str) -> String {
        format!("0x000000000000000000000000{}", address.trim_start_matches("0x"))
    }

    fn transfer_to(address: &str) -> TransferLog {
        TransferLog {
            topics: vec![
                TRANSFER_EVENT_TOPIC.to_string(),
                topic_for("0x1111111111111111111111111111111111111111"),
                topic_for(address),
            ],
            ..Default::default()
        }
    }

    struct StaticLogs(Option<Vec<TransferLog>>);

    #[async_trait]
    impl TransferLogSource for StaticLogs {
        async fn fetch_transfer_logs(
            &self,
            _contract: &str,
            _from_block: &str,
        ) -> anyhow::Result<Vec<TransferLog>> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("rpc down"))
        }
    }

    #[test]
    fn test_canonical_address() {
        assert_eq!(
            canonical_address("0x28C6c06298d514Db089934071355E5743bf21d60").as_deref(),
            Some("0x28c6c06298d514db089934071355e5743bf21d60")
        );
        assert!(canonical_address("0x28C6").is_none());
        assert!(canonical_address("0xZZC6c06298d514Db089934071355E5743bf21d60").is_none());
    }

    #[test]
    fn test_address_from_topic() {
        let topic = topic_for("28c6c06298d514db089934071355e5743bf21d60");
        assert_eq!(
            address_from_topic(&topic).as_deref(),
            Some("0x28c6c06298d514db089934071355e5743bf21d60")
        );
        assert!(address_from_topic("0x1234").is_none());
        assert!(address_from_topic("not hex").is_none());
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let wallets = ExchangeWalletRegistry::with_defaults();
        // topic encodes lower-case, registry was seeded with checksummed case
        let logs = vec![transfer_to("0x28c6c06298d514db089934071355e5743bf21d60")];
        assert!((score_transfers(&logs, &wallets) - 0.2).abs() < 1e-12);

        let upper = vec![transfer_to("0xF89D7B9C864F589BBF53A82105107622B35EAA40")];
        assert!((score_transfers(&upper, &wallets) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_clamped() {
        let wallets = ExchangeWalletRegistry::with_defaults();
        let logs: Vec<TransferLog> = (0..25)
            .map(|_| transfer_to("0x21a31ee1afc51d94c2efccaa2092ad1028285549"))
            .collect();
        assert_eq!(score_transfers(&logs, &wallets), 1.0);
        assert_eq!(score_transfers(&[], &wallets), 0.0);
    }

    #[test]
    fn test_malformed_and_unknown_logs_ignored() {
        let wallets = ExchangeWalletRegistry::with_defaults();
        let short = TransferLog {
            topics: vec![TRANSFER_EVENT_TOPIC.to_string()],
            ..Default::default()
        };
        let unknown = transfer_to("0x2222222222222222222222222222222222222222");
        assert_eq!(score_transfers(&[short, unknown], &wallets), 0.0);
    }

    #[test]
    fn test_registry_insert_rejects_garbage() {
        let mut wallets = ExchangeWalletRegistry::new();
        assert!(!wallets.insert("nope", "x"));
        assert!(wallets.insert("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "Desk"));
        assert_eq!(wallets.label_for("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"), Some("Desk"));
        assert_eq!(wallets.len(), 1);
    }

    #[tokio::test]
    async fn test_analyzer_degrades_on_rpc_failure() {
        let analyzer = OnchainPressureAnalyzer::new(
            Arc::new(StaticLogs(None)),
            ExchangeWalletRegistry::with_defaults(),
            Duration::from_secs(1),
        );
        assert_eq!(analyzer.analyze_movement_to_cex("0xabc").await, 0.0);
    }

    #[tokio::test]
    async fn test_analyzer_scores_fetched_logs() {
        let logs = vec![
            transfer_to("0x28c6c06298d514db089934071355e5743bf21d60"),
            transfer_to("0x21a31ee1afc51d94c2efccaa2092ad1028285549"),
            transfer_to("0x3333333333333333333333333333333333333333"),
        ];
        let analyzer = OnchainPressureAnalyzer::new(
            Arc::new(StaticLogs(Some(logs))),
            ExchangeWalletRegistry::with_defaults(),
            Duration::from_secs(1),
        );
        let score = analyzer.analyze_movement_to_cex("0xabc").await;
        assert!((score - 0.4).abs() < 1e-12);
    }
}
