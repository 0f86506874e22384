//! HTTP request handlers for bridge endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use vault_core::Address;

use crate::server::ServerState;
use crate::types::{
    PendingSummary, RequestStatus, SigningRequestResponse, SubmitStatus, TxCallback,
};

/// Fetch a signing request
/// GET /tx/{id}
pub async fn handle_tx(
    State(state): State<Arc<ServerState>>,
    Path(request_id): Path<String>,
) -> Result<Json<SigningRequestResponse>, StatusCode> {
    let requests = state.pending_requests.read().await;

    let request = requests.get(&request_id).ok_or(StatusCode::NOT_FOUND)?;

    if request.is_expired(state.request_ttl) {
        return Err(StatusCode::GONE);
    }
    if request.status != RequestStatus::Pending {
        return Err(StatusCode::CONFLICT);
    }

    Ok(Json(SigningRequestResponse {
        id: request.id.clone(),
        message: request.message.clone(),
        transaction: request.spec.clone(),
        reply_to: state.callback_url(&request_id),
    }))
}

/// List requests still waiting on a wallet
/// GET /pending/{wallet}
pub async fn handle_pending(
    State(state): State<Arc<ServerState>>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<PendingSummary>>, StatusCode> {
    let wallet = Address::parse(&wallet).map_err(|_| StatusCode::BAD_REQUEST)?;
    let requests = state.pending_requests.read().await;

    let mut pending: Vec<PendingSummary> = requests
        .values()
        .filter(|r| r.spec.from == wallet)
        .filter(|r| r.status == RequestStatus::Pending && !r.is_expired(state.request_ttl))
        .map(|r| PendingSummary {
            id: r.id.clone(),
            message: r.message.clone(),
            age_secs: r.created_at.elapsed().as_secs(),
        })
        .collect();
    // Oldest first
    pending.sort_by(|a, b| b.age_secs.cmp(&a.age_secs));

    Ok(Json(pending))
}

/// Handle the wallet's outcome for a request
/// POST /callback/{id}
pub async fn handle_callback(
    State(state): State<Arc<ServerState>>,
    Path(request_id): Path<String>,
    Json(payload): Json<TxCallback>,
) -> Result<StatusCode, StatusCode> {
    let new_status = match payload.status {
        SubmitStatus::Success => {
            let tx_id = payload
                .transaction_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or(StatusCode::BAD_REQUEST)?;
            RequestStatus::Submitted { tx_id }
        }
        SubmitStatus::Error => RequestStatus::Rejected {
            error_code: payload
                .error_code
                .clone()
                .unwrap_or_else(|| "unknown_error".to_string()),
        },
    };

    let mut requests = state.pending_requests.write().await;
    let request = requests.get_mut(&request_id).ok_or(StatusCode::NOT_FOUND)?;

    if request.status != RequestStatus::Pending {
        return Err(StatusCode::CONFLICT);
    }
    if request.is_expired(state.request_ttl) {
        request.status = RequestStatus::Expired;
        return Err(StatusCode::GONE);
    }

    match &new_status {
        RequestStatus::Submitted { tx_id } => {
            tracing::info!("Transaction submitted: {} for request {}", tx_id, request_id)
        }
        RequestStatus::Rejected { error_code } => {
            tracing::info!("Wallet declined request {}: {}", request_id, error_code)
        }
        _ => {}
    }
    request.status = new_status;

    if let Some(waiter) = state.waiters.lock().await.remove(&request_id) {
        // Submitter may have given up already
        let _ = waiter.send(payload);
    }

    Ok(StatusCode::OK)
}
