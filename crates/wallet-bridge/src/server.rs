//! Axum HTTP server the wallet mini-app talks to

use async_trait::async_trait;
use axum::{routing::get, routing::post, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use vault_core::BridgeConfig;
use vault_tx::TransactionSpec;

use crate::error::BridgeError;
use crate::handlers::{handle_callback, handle_pending, handle_tx};
use crate::types::{PendingRequest, RequestStatus, SubmitResult};
use crate::SigningBridge;

/// Shared server state
pub struct ServerState {
    /// Port the server is running on
    pub port: u16,
    /// Host IP address for URLs (LAN IP)
    pub host: String,
    /// How long a request waits for the wallet
    pub request_ttl: Duration,
    /// Pending requests by ID
    pub pending_requests: RwLock<HashMap<String, PendingRequest>>,
    /// Submitters blocked on a wallet answer, by request ID
    pub(crate) waiters: Mutex<HashMap<String, oneshot::Sender<SubmitResult>>>,
}

impl ServerState {
    pub fn callback_url(&self, request_id: &str) -> String {
        format!("http://{}:{}/callback/{}", self.host, self.port, request_id)
    }
}

/// Signing bridge HTTP server
pub struct BridgeServer {
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    cleanup_task: JoinHandle<()>,
}

impl BridgeServer {
    /// Start the server on an available port
    pub async fn start() -> Result<Self, std::io::Error> {
        Self::start_with_config(&BridgeConfig::default()).await
    }

    /// Start the server on the configured port (0 for auto-assign)
    pub async fn start_with_config(config: &BridgeConfig) -> Result<Self, std::io::Error> {
        // Bind to all interfaces so the phone can reach us over LAN
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let host = get_local_ip().unwrap_or_else(|| "127.0.0.1".to_string());
        let request_ttl = Duration::from_secs(config.request_ttl_secs);

        let state = Arc::new(ServerState {
            port: actual_port,
            host,
            request_ttl,
            pending_requests: RwLock::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/tx/:id", get(handle_tx))
            .route("/pending/:wallet", get(handle_pending))
            .route("/callback/:id", post(handle_callback))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            tracing::info!("Wallet bridge starting on port {}", actual_port);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Wallet bridge shutting down");
                })
                .await
                .ok();
        });

        let cleanup_state = state.clone();
        let sweep_every = request_ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
        let cleanup_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_every).await;
                sweep_expired(&cleanup_state).await;
            }
        });

        Ok(Self {
            state,
            shutdown_tx: Some(shutdown_tx),
            cleanup_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.state.port
    }

    pub fn host(&self) -> &str {
        &self.state.host
    }

    /// Register a signing request; the receiver resolves when the wallet answers
    pub async fn create_tx_request(
        &self,
        spec: TransactionSpec,
    ) -> (String, oneshot::Receiver<SubmitResult>) {
        let id = generate_request_id();
        let (tx, rx) = oneshot::channel();

        tracing::info!(
            request_id = %id,
            wallet = %spec.from,
            kind = ?spec.kind,
            "Signing request created"
        );

        self.state
            .pending_requests
            .write()
            .await
            .insert(id.clone(), PendingRequest::new(id.clone(), spec));
        self.state.waiters.lock().await.insert(id.clone(), tx);

        (id, rx)
    }

    pub async fn get_request_status(&self, request_id: &str) -> Option<RequestStatus> {
        let requests = self.state.pending_requests.read().await;
        requests.get(request_id).map(|r| r.status.clone())
    }

    /// Withdraw a request before the wallet answers
    pub async fn cancel_request(&self, request_id: &str) {
        withdraw_request(&self.state, request_id).await;
    }

    async fn mark_expired(&self, request_id: &str) {
        if let Some(req) = self.state.pending_requests.write().await.get_mut(request_id) {
            if req.status == RequestStatus::Pending {
                req.status = RequestStatus::Expired;
            }
        }
        self.state.waiters.lock().await.remove(request_id);
    }
}

#[async_trait]
impl SigningBridge for BridgeServer {
    async fn submit(&self, spec: TransactionSpec) -> Result<SubmitResult, BridgeError> {
        let (request_id, rx) = self.create_tx_request(spec).await;
        let mut guard = AbandonGuard {
            state: self.state.clone(),
            request_id: request_id.clone(),
            armed: true,
        };

        let answer = tokio::time::timeout(self.state.request_ttl, rx).await;
        guard.armed = false;

        match answer {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(BridgeError::Cancelled { request_id }),
            Err(_) => {
                tracing::warn!(request_id = %request_id, "Signing request timed out");
                self.mark_expired(&request_id).await;
                Err(BridgeError::Expired { request_id })
            }
        }
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.cleanup_task.abort();
    }
}

/// Withdraws the request if the submitter is dropped before the wallet
/// answers, so an abandoned attempt can no longer be signed.
struct AbandonGuard {
    state: Arc<ServerState>,
    request_id: String,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::info!(request_id = %self.request_id, "Signing request abandoned");

        let request_id = std::mem::take(&mut self.request_id);
        if let (Ok(mut requests), Ok(mut waiters)) = (
            self.state.pending_requests.try_write(),
            self.state.waiters.try_lock(),
        ) {
            requests.remove(&request_id);
            waiters.remove(&request_id);
            return;
        }

        // Locks are busy; finish on the runtime
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let state = self.state.clone();
            handle.spawn(async move { withdraw_request(&state, &request_id).await });
        }
    }
}

async fn withdraw_request(state: &ServerState, request_id: &str) {
    state.pending_requests.write().await.remove(request_id);
    // Dropping the sender wakes the submitter
    state.waiters.lock().await.remove(request_id);
}

/// Drop stale requests. Entries linger for one extra TTL so their final
/// status stays queryable after the submitter has timed out.
async fn sweep_expired(state: &ServerState) {
    let ttl = state.request_ttl.saturating_mul(2);
    let mut requests = state.pending_requests.write().await;
    let mut waiters = state.waiters.lock().await;
    requests.retain(|id, req| {
        let expired = req.is_expired(ttl);
        if expired {
            tracing::debug!("Cleaning up expired request: {}", id);
            waiters.remove(id);
        }
        !expired
    });
}

/// Generate a random request ID
fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let random: u32 = rand::random();
    format!("{:x}{:08x}", timestamp, random)
}

/// Get the local LAN IP address
fn get_local_ip() -> Option<String> {
    use std::net::UdpSocket;

    // Connecting a UDP socket sends nothing but picks the outbound interface
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let local_addr = socket.local_addr().ok()?;

    Some(local_addr.ip().to_string())
}
