//! Runtime settings loaded from the environment (and `.env` via dotenv).
//!
//! Every option is optional except where noted; malformed values are a
//! `ValidationFault` and abort startup.

use std::{collections::HashMap, env, path::PathBuf, time::Duration};

use crate::error::EngineError;
use crate::models::Venue;
use crate::signals::calculator::DEFAULT_HISTORICAL_DUMP_FACTOR;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_BROKER_URL: &str = "redis://localhost:6379/0";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Exchange API credentials. Market data reads work without them.
#[derive(Debug, Clone, Default)]
pub struct VenueCredentials {
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
}

impl VenueCredentials {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.secret.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub project_name: String,
    pub api_prefix: String,
    pub app_env: String,
    pub bind_addr: String,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,

    pub binance: VenueCredentials,
    pub bybit: VenueCredentials,
    pub okx: VenueCredentials,
    pub default_venue: Venue,

    pub alchemy_api_key: Option<String>,
    pub eth_rpc_url: Option<String>,
    pub token_unlocks_api_key: Option<String>,
    pub cryptorank_api_key: Option<String>,
    pub unlocks_file: Option<PathBuf>,

    pub cache_db_path: Option<String>,
    pub broker_url: String,

    pub fetch_timeout: Duration,
    pub refresh_interval: Duration,
    pub historical_dump_factor: f64,
    /// Upper-case symbol -> ERC-20 contract address
    pub token_contracts: HashMap<String, String>,
    /// (address, label) pairs added to the built-in exchange wallet set
    pub exchange_wallets: Vec<(String, String)>,
}

impl Settings {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cors_origins = match get("BACKEND_CORS_ORIGINS") {
            Some(raw) => parse_cors_origins(&raw)?,
            None => Vec::new(),
        };

        let default_venue = match get("DEFAULT_VENUE") {
            Some(raw) => raw.parse::<Venue>().map_err(EngineError::invalid)?,
            None => Venue::Binance,
        };

        let historical_dump_factor = match get("HISTORICAL_DUMP_FACTOR") {
            Some(raw) => {
                let v = parse_number::<f64>("HISTORICAL_DUMP_FACTOR", &raw)?;
                if !(1.0..=1.5).contains(&v) {
                    return Err(EngineError::invalid(format!(
                        "HISTORICAL_DUMP_FACTOR must be within [1.0, 1.5], got {v}"
                    )));
                }
                v
            }
            None => DEFAULT_HISTORICAL_DUMP_FACTOR,
        };

        let fetch_timeout_secs = match get("FETCH_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("FETCH_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_FETCH_TIMEOUT_SECS,
        };
        if fetch_timeout_secs == 0 {
            return Err(EngineError::invalid("FETCH_TIMEOUT_SECS must be > 0"));
        }

        let refresh_interval_secs = match get("REFRESH_INTERVAL_SECS") {
            Some(raw) => parse_number::<u64>("REFRESH_INTERVAL_SECS", &raw)?,
            None => DEFAULT_REFRESH_INTERVAL_SECS,
        };

        let token_contracts = match get("TOKEN_CONTRACTS") {
            Some(raw) => parse_token_contracts(&raw)?,
            None => HashMap::new(),
        };

        let exchange_wallets = match get("EXCHANGE_WALLETS") {
            Some(raw) => parse_exchange_wallets(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            project_name: get("PROJECT_NAME").unwrap_or_else(|| "Unlock Impact Engine".to_string()),
            api_prefix: get("API_V1_STR").unwrap_or_else(|| "/api/v1".to_string()),
            app_env: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            cors_origins,
            binance: VenueCredentials {
                api_key: get("BINANCE_API_KEY"),
                secret: get("BINANCE_SECRET"),
                passphrase: None,
            },
            bybit: VenueCredentials {
                api_key: get("BYBIT_API_KEY"),
                secret: get("BYBIT_SECRET"),
                passphrase: None,
            },
            okx: VenueCredentials {
                api_key: get("OKX_API_KEY"),
                secret: get("OKX_SECRET"),
                passphrase: get("OKX_PASSPHRASE"),
            },
            default_venue,
            alchemy_api_key: get("ALCHEMY_API_KEY"),
            eth_rpc_url: get("ETH_RPC_URL"),
            token_unlocks_api_key: get("TOKEN_UNLOCKS_API_KEY"),
            cryptorank_api_key: get("CRYPTORANK_API_KEY"),
            unlocks_file: get("UNLOCKS_FILE").map(PathBuf::from),
            cache_db_path: get("CACHE_DB_PATH"),
            broker_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            refresh_interval: Duration::from_secs(refresh_interval_secs),
            historical_dump_factor,
            token_contracts,
            exchange_wallets,
        })
    }

    pub fn credentials(&self, venue: Venue) -> &VenueCredentials {
        match venue {
            Venue::Binance => &self.binance,
            Venue::Bybit => &self.bybit,
            Venue::Okx => &self.okx,
        }
    }

    /// JSON-RPC endpoint for on-chain reads; `None` when no credential is configured.
    pub fn onchain_rpc_url(&self) -> Option<String> {
        if let Some(url) = &self.eth_rpc_url {
            return Some(url.clone());
        }
        self.alchemy_api_key
            .as_ref()
            .map(|key| format!("https://eth-mainnet.g.alchemy.com/v2/{key}"))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, EngineError> {
    raw.parse::<T>()
        .map_err(|_| EngineError::invalid(format!("{key} is not a valid number: {raw:?}")))
}

/// Accepts either a comma-separated list or a JSON array of origins.
pub fn parse_cors_origins(raw: &str) -> Result<Vec<String>, EngineError> {
    let raw = raw.trim();
    let items: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str::<Vec<String>>(raw).map_err(|e| {
            EngineError::invalid(format!("BACKEND_CORS_ORIGINS is not a JSON list: {e}"))
        })?
    } else {
        raw.split(',').map(|s| s.trim().to_string()).collect()
    };

    let mut origins = Vec::with_capacity(items.len());
    for item in items.into_iter().filter(|s| !s.is_empty()) {
        let rest = item
            .strip_prefix("https://")
            .or_else(|| item.strip_prefix("http://"))
            .ok_or_else(|| EngineError::invalid(format!("CORS origin must be an http(s) URL: {item}")))?;
        if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
            return Err(EngineError::invalid(format!("CORS origin has no host: {item}")));
        }
        origins.push(item.trim_end_matches('/').to_string());
    }
    Ok(origins)
}

/// `SYMBOL=0xaddress` pairs separated by commas.
fn parse_token_contracts(raw: &str) -> Result<HashMap<String, String>, EngineError> {
    let mut out = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (symbol, address) = entry
            .split_once('=')
            .ok_or_else(|| EngineError::invalid(format!("TOKEN_CONTRACTS entry missing '=': {entry}")))?;
        let address = crate::signals::onchain_pressure::canonical_address(address)
            .ok_or_else(|| EngineError::invalid(format!("TOKEN_CONTRACTS has bad address: {entry}")))?;
        out.insert(symbol.trim().to_uppercase(), address);
    }
    Ok(out)
}

/// `0xaddress` or `0xaddress=Label` entries separated by commas.
fn parse_exchange_wallets(raw: &str) -> Result<Vec<(String, String)>, EngineError> {
    let mut out = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (address, label) = match entry.split_once('=') {
            Some((a, l)) => (a, l.trim()),
            None => (entry, "configured"),
        };
        let address = crate::signals::onchain_pressure::canonical_address(address)
            .ok_or_else(|| EngineError::invalid(format!("EXCHANGE_WALLETS has bad address: {entry}")))?;
        out.push((address, label.to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(pairs: &[(&str, &str)]) -> Result<Settings, EngineError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings_with(&[]).unwrap();
        assert_eq!(s.default_venue, Venue::Binance);
        assert_eq!(s.fetch_timeout, Duration::from_secs(10));
        assert_eq!(s.historical_dump_factor, 1.1);
        assert_eq!(s.broker_url, "redis://localhost:6379/0");
        assert!(s.cors_origins.is_empty());
        assert!(s.onchain_rpc_url().is_none());
        assert!(!s.binance.is_configured());
    }

    #[test]
    fn test_cors_comma_and_json_forms() {
        let a = parse_cors_origins("http://localhost:3000, https://app.example.com/").unwrap();
        assert_eq!(a, vec!["http://localhost:3000", "https://app.example.com"]);

        let b = parse_cors_origins(r#"["http://localhost:3000"]"#).unwrap();
        assert_eq!(b, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_bad_cors_is_validation_fault() {
        let err = settings_with(&[("BACKEND_CORS_ORIGINS", "localhost:3000")]).unwrap_err();
        assert!(matches!(err, EngineError::ValidationFault(_)));

        let err = settings_with(&[("BACKEND_CORS_ORIGINS", "[not json")]).unwrap_err();
        assert!(matches!(err, EngineError::ValidationFault(_)));
    }

    #[test]
    fn test_numeric_validation() {
        assert!(settings_with(&[("FETCH_TIMEOUT_SECS", "ten")]).is_err());
        assert!(settings_with(&[("FETCH_TIMEOUT_SECS", "0")]).is_err());
        assert!(settings_with(&[("HISTORICAL_DUMP_FACTOR", "2.0")]).is_err());
        let s = settings_with(&[("HISTORICAL_DUMP_FACTOR", "1.3")]).unwrap();
        assert_eq!(s.historical_dump_factor, 1.3);
    }

    #[test]
    fn test_token_contracts_canonicalized() {
        let s = settings_with(&[(
            "TOKEN_CONTRACTS",
            "arb=0xB50721BCf8d664c30412Cfbc6cf7a15145234ad1",
        )])
        .unwrap();
        assert_eq!(
            s.token_contracts.get("ARB").map(String::as_str),
            Some("0xb50721bcf8d664c30412cfbc6cf7a15145234ad1")
        );
        assert!(settings_with(&[("TOKEN_CONTRACTS", "ARB=0x123")]).is_err());
    }

    #[test]
    fn test_rpc_url_from_alchemy_key() {
        let s = settings_with(&[("ALCHEMY_API_KEY", "abc")]).unwrap();
        assert_eq!(
            s.onchain_rpc_url().as_deref(),
            Some("https://eth-mainnet.g.alchemy.com/v2/abc")
        );
    }

    #[test]
    fn test_blank_values_are_unset() {
        let s = settings_with(&[("BINANCE_API_KEY", "   "), ("DEFAULT_VENUE", "okx")]).unwrap();
        assert!(s.binance.api_key.is_none());
        assert_eq!(s.default_venue, Venue::Okx);
    }
}
