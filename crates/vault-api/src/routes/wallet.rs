//! Per-wallet session endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use vault_core::{DepositId, VaultError};
use vault_engine::SessionStatus;

use crate::dto::{
    ApiError, ConnectResponse, DepositRequest, DepositResponse, DisconnectResponse,
    PositionResponse, WithdrawResponse,
};
use crate::state::ApiError as StateError;
use crate::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

/// Create wallet routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:address/connect", post(connect))
        .route("/:address/disconnect", post(disconnect))
        .route("/:address/position", get(position))
        .route("/:address/status", get(status))
        .route("/:address/deposit", post(deposit))
        .route("/:address/withdraw/:deposit_id", post(withdraw))
}

/// POST /wallets/:address/connect - Open a session
pub async fn connect(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<ConnectResponse> {
    let session = state.connect(&address).await.map_err(state_error)?;
    tracing::info!(wallet = %session.wallet(), "Wallet connected");

    Ok(Json(ConnectResponse {
        wallet: session.wallet().to_string(),
        display_address: session.wallet().truncated(),
    }))
}

/// POST /wallets/:address/disconnect - Close the session
pub async fn disconnect(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<DisconnectResponse> {
    let disconnected = state.disconnect(&address).await.map_err(state_error)?;
    Ok(Json(DisconnectResponse { disconnected }))
}

/// GET /wallets/:address/position - Balance, deposits and totals
pub async fn position(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<PositionResponse> {
    let session = state.session(&address).await.map_err(state_error)?;
    let position = session.position().await.map_err(vault_error)?;
    Ok(Json(PositionResponse::new(
        &position,
        &state.config().contracts,
    )))
}

/// GET /wallets/:address/status - Attempt phases and tracked transactions
pub async fn status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<SessionStatus> {
    let session = state.session(&address).await.map_err(state_error)?;
    Ok(Json(session.status().await))
}

/// POST /wallets/:address/deposit - Deposit via Permit2; resolves on confirmation
pub async fn deposit(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(request): Json<DepositRequest>,
) -> ApiResult<DepositResponse> {
    let session = state.session(&address).await.map_err(state_error)?;
    let receipt = session.deposit(&request.amount).await.map_err(vault_error)?;
    Ok(Json(DepositResponse::new(
        &receipt,
        state.config().contracts.token_decimals,
    )))
}

/// POST /wallets/:address/withdraw/:deposit_id - Withdraw one deposit
pub async fn withdraw(
    State(state): State<AppState>,
    Path((address, deposit_id)): Path<(String, u64)>,
) -> ApiResult<WithdrawResponse> {
    let session = state.session(&address).await.map_err(state_error)?;
    let receipt = session
        .withdraw(DepositId(deposit_id))
        .await
        .map_err(vault_error)?;
    Ok(Json(WithdrawResponse::new(
        &receipt,
        state.config().contracts.token_decimals,
    )))
}

fn vault_error(e: VaultError) -> (StatusCode, Json<ApiError>) {
    let mut body = ApiError::new(e.error_code(), e.to_string());
    body.retryable = e.is_retryable();
    (
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}

fn state_error(e: StateError) -> (StatusCode, Json<ApiError>) {
    match e {
        StateError::InvalidAddress { .. } => (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("invalid_address", e.to_string())),
        ),
        StateError::NotConnected { .. } => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("wallet_not_connected", e.to_string())),
        ),
    }
}
