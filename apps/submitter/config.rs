use alloy::primitives::Address;
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs, time::Duration};
use tracing::{info, warn};
use utils::errors::DAO_ADDRESS_NOT_SET;

pub static CONFIG: OnceCell<SubmitterConfig> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    pub dao: DaoConfig,
    pub chain: ChainConfig,
    pub polls: PollsConfig,
    pub forum: ForumConfig,
    pub server: ServerConfig,
    pub token_decimals: u8,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            dao: DaoConfig::default(),
            chain: ChainConfig::default(),
            polls: PollsConfig::default(),
            forum: ForumConfig::default(),
            server: ServerConfig::default(),
            token_decimals: 18,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    pub address: Option<Address>,
    pub chain_id: u64,
    pub version: String,
    pub name: Option<String>,
    /// Token used for tribute and payment when the form leaves it empty.
    pub deposit_token: Option<Address>,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            address: None,
            chain_id: 1,
            version: "2.1".to_string(),
            name: None,
            deposit_token: None,
        }
    }
}

impl DaoConfig {
    pub fn address(&self) -> Result<Address> {
        self.address.context(DAO_ADDRESS_NOT_SET)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub node_url: Option<String>,
    pub private_key: Option<String>,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            node_url: None,
            private_key: None,
            confirmation_timeout_secs: 10 * 60,
            poll_interval_ms: 4_000,
        }
    }
}

impl ChainConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollsConfig {
    pub cache_path: String,
    pub max_age_secs: i64,
    pub sweep_interval_secs: u64,
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            cache_path: "pending_polls.json".to_string(),
            max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub endpoint: Option<String>,
    pub max_retries: usize,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

pub fn load() -> Result<()> {
    let config = load_config();
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Submitter config already initialized"))?;
    Ok(())
}

pub fn get_config() -> Result<&'static SubmitterConfig> {
    CONFIG.get().context("Submitter config not initialized")
}

fn load_config() -> SubmitterConfig {
    let path =
        env::var("SUBMITTER_CONFIG_PATH").unwrap_or_else(|_| "submitter.yaml".to_string());
    let mut config = load_file(&path);

    apply_env_overrides(&mut config);

    info!(
        dao = ?config.dao.address,
        chain_id = config.dao.chain_id,
        cache_path = %config.polls.cache_path,
        forum_enabled = config.forum.endpoint.is_some(),
        "Submitter config loaded"
    );

    config
}

fn load_file(path: &str) -> SubmitterConfig {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<SubmitterConfig>(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %path, "Failed to parse submitter config, using defaults");
                SubmitterConfig::default()
            }
        },
        Err(err) => {
            warn!(error = %err, path = %path, "Submitter config not found, using defaults");
            SubmitterConfig::default()
        }
    }
}

fn apply_env_overrides(config: &mut SubmitterConfig) {
    if let Ok(value) = env::var("ETHEREUM_NODE_URL") {
        config.chain.node_url = Some(value);
    }

    if let Ok(value) = env::var("SUBMITTER_PRIVATE_KEY") {
        config.chain.private_key = Some(value);
    }

    if let Ok(value) = env::var("DAO_ADDRESS") {
        match value.parse::<Address>() {
            Ok(address) => config.dao.address = Some(address),
            Err(err) => warn!(error = %err, "Failed to parse DAO_ADDRESS override"),
        }
    }

    if let Ok(value) = env::var("POLL_CACHE_PATH") {
        config.polls.cache_path = value;
    }

    if let Ok(value) = env::var("FORUM_ENDPOINT") {
        config.forum.endpoint = Some(value).filter(|endpoint| !endpoint.trim().is_empty());
    }

    if let Ok(value) = env::var("SUBMITTER_BIND") {
        config.server.bind = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "ETHEREUM_NODE_URL",
            "SUBMITTER_PRIVATE_KEY",
            "DAO_ADDRESS",
            "POLL_CACHE_PATH",
            "FORUM_ENDPOINT",
            "SUBMITTER_BIND",
        ] {
            // SAFETY: env-mutating tests are serialised.
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn test_yaml_fills_missing_sections_with_defaults() {
        let config: SubmitterConfig = serde_yaml::from_str(
            r#"
dao:
  address: "0x1111111111111111111111111111111111111111"
  chain_id: 100
chain:
  poll_interval_ms: 500
token_decimals: 6
"#,
        )
        .unwrap();

        assert_eq!(config.dao.chain_id, 100);
        assert_eq!(config.dao.version, "2.1");
        assert!(config.dao.address().is_ok());
        assert_eq!(config.chain.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.chain.confirmation_timeout_secs, 600);
        assert_eq!(config.polls.cache_path, "pending_polls.json");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.token_decimals, 6);
        assert!(config.forum.endpoint.is_none());
    }

    #[test]
    fn test_missing_dao_address_is_an_error() {
        let err = SubmitterConfig::default().dao.address().unwrap_err();
        assert_eq!(err.to_string(), DAO_ADDRESS_NOT_SET);
    }

    #[test]
    #[serial]
    fn test_unreadable_file_falls_back_to_defaults() {
        let config = load_file("/nonexistent/submitter.yaml");
        assert_eq!(config.token_decimals, 18);
        assert_eq!(config.polls.max_age_secs, 86_400);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_values() {
        clear_env();
        // SAFETY: env-mutating tests are serialised.
        unsafe {
            env::set_var("ETHEREUM_NODE_URL", "http://localhost:8545");
            env::set_var("DAO_ADDRESS", "0x2222222222222222222222222222222222222222");
            env::set_var("FORUM_ENDPOINT", "  ");
            env::set_var("SUBMITTER_BIND", "127.0.0.1:4000");
        }

        let mut config = SubmitterConfig::default();
        config.forum.endpoint = Some("https://forum.example".to_string());
        apply_env_overrides(&mut config);

        assert_eq!(config.chain.node_url.as_deref(), Some("http://localhost:8545"));
        assert_eq!(
            config.dao.address,
            Some("0x2222222222222222222222222222222222222222".parse().unwrap())
        );
        assert!(config.forum.endpoint.is_none());
        assert_eq!(config.server.bind, "127.0.0.1:4000");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_bad_dao_address_override_is_ignored() {
        clear_env();
        // SAFETY: env-mutating tests are serialised.
        unsafe { env::set_var("DAO_ADDRESS", "not-an-address") };

        let mut config = SubmitterConfig::default();
        apply_env_overrides(&mut config);
        assert!(config.dao.address.is_none());

        clear_env();
    }
}
