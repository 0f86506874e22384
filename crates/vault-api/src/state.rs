//! Application state shared across API handlers

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use vault_core::{Address, AppConfig, WalletAddress};
use vault_engine::{VaultContext, VaultSession};

/// Errors that can occur in the API layer
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid wallet address format
    #[error("Invalid wallet address: {reason}")]
    InvalidAddress { reason: String },

    #[error("Wallet {wallet} is not connected")]
    NotConnected { wallet: String },
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    context: VaultContext,
    sessions: RwLock<HashMap<WalletAddress, Arc<VaultSession>>>,
}

impl AppState {
    pub fn new(config: AppConfig, context: VaultContext) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                context,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Open a session for `address`, or return the open one
    pub async fn connect(&self, address: &str) -> Result<Arc<VaultSession>, ApiError> {
        let wallet = parse_wallet(address)?;

        let mut sessions = self.inner.sessions.write().await;
        if let Some(existing) = sessions.get(&wallet) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
        }

        let session = Arc::new(VaultSession::new(wallet.clone(), self.inner.context.clone()));
        sessions.insert(wallet, session.clone());
        Ok(session)
    }

    /// Close and forget the session. Returns whether one was open.
    pub async fn disconnect(&self, address: &str) -> Result<bool, ApiError> {
        let wallet = parse_wallet(address)?;
        match self.inner.sessions.write().await.remove(&wallet) {
            Some(session) => {
                session.close();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn session(&self, address: &str) -> Result<Arc<VaultSession>, ApiError> {
        let wallet = parse_wallet(address)?;
        self.inner
            .sessions
            .read()
            .await
            .get(&wallet)
            .cloned()
            .ok_or_else(|| ApiError::NotConnected {
                wallet: wallet.to_string(),
            })
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

fn parse_wallet(address: &str) -> Result<WalletAddress, ApiError> {
    Address::parse(address).map_err(|e| ApiError::InvalidAddress {
        reason: e.to_string(),
    })
}
