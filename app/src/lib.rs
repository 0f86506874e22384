//! vaultd: permit vault client daemon
//!
//! Wires the chain reader, the wallet signing bridge and bookkeeping into
//! the session API and serves it until interrupted.

use std::sync::Arc;

use anyhow::Context;
use evm_rpc_client::RpcClient;
use vault_api::AppState;
use vault_core::AppConfig;
use vault_engine::{bookkeeping, AttemptLocks, VaultContext};
use wallet_bridge::BridgeServer;

/// Environment variable naming an optional JSON config file
pub const CONFIG_ENV: &str = "VAULTD_CONFIG";

/// Run the daemon
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vaultd=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    tracing::info!("Starting vaultd");

    let config = load_config(std::env::var(CONFIG_ENV).ok().as_deref())?;

    let rpc = Arc::new(
        RpcClient::new(&config.chain, config.contracts.clone())
            .context("failed to build RPC client")?,
    );
    check_chain(&rpc, config.chain.chain_id).await;

    let bridge = Arc::new(
        BridgeServer::start_with_config(&config.bridge)
            .await
            .context("failed to start signing bridge")?,
    );
    tracing::info!("Signing bridge listening on {}:{}", bridge.host(), bridge.port());

    let bookkeeping =
        bookkeeping::from_config(&config.bookkeeping).context("failed to set up bookkeeping")?;

    let context = VaultContext {
        reader: rpc.clone(),
        tx_status: rpc,
        bridge,
        bookkeeping,
        contracts: config.contracts.clone(),
        monitor: config.monitor.clone(),
        attempt_locks: AttemptLocks::default(),
    };

    let port = config.api_port;
    let state = AppState::new(config, context);
    vault_api::start_server(state, port, shutdown_signal())
        .await
        .context("API server failed")?;

    Ok(())
}

/// Load config from `path`, or defaults when no path is given
pub fn load_config(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        tracing::info!("No {} set, using default configuration", CONFIG_ENV);
        return Ok(AppConfig::default());
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path))?;
    let config = AppConfig::from_json_str(&json)
        .with_context(|| format!("invalid config file {}", path))?;

    tracing::info!(path, "Configuration loaded");
    Ok(config)
}

/// Reads fail later anyway if the node is down; only warn here
async fn check_chain(rpc: &RpcClient, expected: u64) {
    match rpc.chain_id().await {
        Ok(id) if id == expected => tracing::info!(chain_id = id, url = rpc.url(), "Connected to chain"),
        Ok(id) => tracing::warn!(
            chain_id = id,
            expected,
            "RPC endpoint reports a different chain id"
        ),
        Err(e) => tracing::warn!(url = rpc.url(), "RPC endpoint unreachable: {}", e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
