//! Configuration types for the vault client

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TOKEN_DECIMALS;
use crate::{Address, Error};

/// JSON-RPC connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// RPC URL (e.g., "https://worldchain-mainnet.g.alchemy.com/public")
    pub rpc_url: String,

    /// EVM chain id (480 = World Chain mainnet)
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts for a read before giving up on transient failures
    #[serde(default = "default_max_read_attempts")]
    pub max_read_attempts: u32,

    /// First backoff delay; doubles after each failed attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_chain_id() -> u64 {
    480
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_read_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://worldchain-mainnet.g.alchemy.com/public".to_string(),
            chain_id: default_chain_id(),
            request_timeout_secs: default_request_timeout_secs(),
            max_read_attempts: default_max_read_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Deployed contract addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Token deposited into the vault (WLD)
    pub token: Address,

    /// Vault manager contract
    pub vault: Address,

    /// Canonical Permit2 contract
    pub permit2: Address,

    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,

    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
}

fn default_token_decimals() -> u32 {
    DEFAULT_TOKEN_DECIMALS
}

fn default_token_symbol() -> String {
    "WLD".to_string()
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            token: Address::new("0x2cFc85d8E48F8EAB294be644d9E25C3030863003"),
            vault: Address::new("0xeA2c7377FD34366878516bD68CCB469016b529d9"),
            permit2: Address::new("0x000000000022D473030F116dDEE9F6B43aC78BA3"),
            token_decimals: default_token_decimals(),
            token_symbol: default_token_symbol(),
        }
    }
}

/// Confirmation tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up (and report a timeout) after this long
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_max_wait_secs() -> u64 {
    15 * 60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

/// Wallet signing bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Port for the bridge server (0 = auto-assign)
    #[serde(default)]
    pub port: u16,

    /// Unanswered signing requests expire after this long
    #[serde(default = "default_request_ttl_secs")]
    pub request_ttl_secs: u64,
}

fn default_request_ttl_secs() -> u64 {
    5 * 60
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 0,
            request_ttl_secs: default_request_ttl_secs(),
        }
    }
}

/// Optional off-chain bookkeeping endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookkeepingConfig {
    /// POST target for deposit records; disabled when unset
    #[serde(default)]
    pub url: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub contracts: ContractConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub bookkeeping: BookkeepingConfig,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_api_port() -> u16 {
    19480
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            contracts: ContractConfig::default(),
            monitor: MonitorConfig::default(),
            bridge: BridgeConfig::default(),
            bookkeeping: BookkeepingConfig::default(),
            api_port: default_api_port(),
        }
    }
}

/// 10^38 is the largest power of ten a u128 holds
pub const MAX_TOKEN_DECIMALS: u32 = 38;

impl AppConfig {
    /// Parse a JSON config document; omitted sections keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: AppConfig =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (name, addr) in [
            ("token", &self.contracts.token),
            ("vault", &self.contracts.vault),
            ("permit2", &self.contracts.permit2),
        ] {
            Address::parse(addr.as_str())
                .map_err(|e| Error::Config(format!("contracts.{}: {}", name, e)))?;
        }
        if self.contracts.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(Error::Config(format!(
                "contracts.token_decimals must be at most {}",
                MAX_TOKEN_DECIMALS
            )));
        }
        if self.chain.max_read_attempts == 0 {
            return Err(Error::Config(
                "chain.max_read_attempts must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 || self.monitor.max_wait_secs == 0 {
            return Err(Error::Config(
                "monitor intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.chain.chain_id, 480);
        assert_eq!(config.contracts.token_decimals, 18);
        assert_eq!(
            config.contracts.permit2.as_str(),
            "0x000000000022d473030f116ddee9f6b43ac78ba3"
        );
        assert!(config.bookkeeping.url.is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.api_port, 19480);
        assert_eq!(AppConfig::from_json_str("{}").unwrap().api_port, 19480);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chain.rpc_url, config.chain.rpc_url);
        assert_eq!(parsed.contracts.vault, config.contracts.vault);
    }

    #[test]
    fn test_partial_config() {
        let config = AppConfig::from_json_str(
            r#"{"chain": {"rpc_url": "http://127.0.0.1:8545"}, "monitor": {"max_wait_secs": 60}}"#,
        )
        .unwrap();
        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.chain.max_read_attempts, 3);
        assert_eq!(config.monitor.max_wait_secs, 60);
        assert_eq!(config.monitor.poll_interval_ms, 3_000);
    }

    #[test]
    fn test_token_decimals_bounded() {
        let mut config = AppConfig::default();
        config.contracts.token_decimals = MAX_TOKEN_DECIMALS;
        assert!(config.validate().is_ok());

        config.contracts.token_decimals = 39;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("token_decimals"));
    }

    #[test]
    fn test_invalid_contract_address_rejected() {
        let err = AppConfig::from_json_str(r#"{"contracts": {"token": "0x12", "vault": "0xeA2c7377FD34366878516bD68CCB469016b529d9", "permit2": "0x000000000022D473030F116dDEE9F6B43aC78BA3"}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
