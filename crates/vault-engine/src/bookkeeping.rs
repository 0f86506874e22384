//! Optional off-chain record of deposits
//!
//! Bookkeeping is strictly best effort: failures are logged and never change
//! the outcome of the on-chain flow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vault_core::{Address, BookkeepingConfig, TokenAmount, TxId};

const BOOKKEEPING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BookkeepingError {
    #[error("Bookkeeping request failed: {0}")]
    Http(String),

    #[error("Bookkeeping endpoint returned HTTP {status}")]
    Status { status: u16 },
}

/// One submitted deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    /// Base units
    pub deposit_amount: TokenAmount,
    pub wallet_address: Address,
    pub transaction_id: TxId,
}

#[async_trait]
pub trait BookkeepingSink: Send + Sync {
    async fn record(&self, record: &DepositRecord) -> Result<(), BookkeepingError>;
}

/// Used when no endpoint is configured
pub struct NoopBookkeeping;

#[async_trait]
impl BookkeepingSink for NoopBookkeeping {
    async fn record(&self, _record: &DepositRecord) -> Result<(), BookkeepingError> {
        Ok(())
    }
}

/// POSTs records as JSON
pub struct HttpBookkeeping {
    client: reqwest::Client,
    url: String,
}

impl HttpBookkeeping {
    pub fn new(url: impl Into<String>) -> Result<Self, BookkeepingError> {
        let client = reqwest::Client::builder()
            .user_agent("vaultd")
            .timeout(BOOKKEEPING_TIMEOUT)
            .build()
            .map_err(|e| BookkeepingError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BookkeepingSink for HttpBookkeeping {
    async fn record(&self, record: &DepositRecord) -> Result<(), BookkeepingError> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| BookkeepingError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BookkeepingError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Build the sink described by `config`
pub fn from_config(
    config: &BookkeepingConfig,
) -> Result<Arc<dyn BookkeepingSink>, BookkeepingError> {
    match &config.url {
        Some(url) => Ok(Arc::new(HttpBookkeeping::new(url.clone())?)),
        None => Ok(Arc::new(NoopBookkeeping)),
    }
}

/// Record, logging instead of returning any failure
pub async fn record_best_effort(sink: &dyn BookkeepingSink, record: &DepositRecord) {
    match sink.record(record).await {
        Ok(()) => tracing::debug!(tx_id = %record.transaction_id, "Deposit recorded"),
        Err(e) => tracing::warn!(
            tx_id = %record.transaction_id,
            "Failed to record deposit (ignored): {}",
            e
        ),
    }
}
