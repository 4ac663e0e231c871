use axum::{
    extract::{FromRef, Query, State},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument};

use super::{
    address::WalletAddress,
    dto::{
        ConnectRequest, ConnectResponse, LinkMessageQuery, MessageResponse, StatusResponse,
        WalletJson,
    },
    error::WalletError,
    service::{link_message, WalletLinkService},
};
use crate::{
    auth::{AuthUser, JwtKeys},
    state::AppState,
    users::Role,
};

pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/wallet/connect", post(connect))
        .route("/wallet/disconnect", post(disconnect))
        .route("/wallet/status", get(status))
        .route("/wallet/link-message", get(get_link_message))
}

/// POST /wallet/connect. Creates the account on first use and logs it in.
#[instrument(skip(state, payload))]
pub async fn connect(
    State(state): State<AppState>,
    WalletJson(payload): WalletJson<ConnectRequest>,
) -> Result<Json<ConnectResponse>, WalletError> {
    let service = WalletLinkService::from_ref(&state);
    let linked = service.connect(&payload).await?;

    let keys = JwtKeys::from_ref(&state);
    let tokens = keys.issue_pair(linked.user.id).map_err(|e| {
        error!(error = %e, user_id = linked.user.id, "session issue failed");
        WalletError::Internal(e)
    })?;

    info!(user_id = linked.user.id, created = linked.created, "wallet session established");
    Ok(Json(ConnectResponse {
        success: true,
        message: "Wallet connected successfully!",
        wallet_address: linked.address.to_string(),
        user_role: linked.role,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// POST /wallet/disconnect
#[instrument(skip(state, user))]
pub async fn disconnect(
    State(state): State<AppState>,
    user: Option<AuthUser>,
) -> Result<Json<MessageResponse>, WalletError> {
    let service = WalletLinkService::from_ref(&state);
    service.disconnect(user.map(|AuthUser(id)| id)).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Wallet disconnected successfully!".into(),
    }))
}

/// GET /wallet/status
#[instrument(skip(state, user))]
pub async fn status(
    State(state): State<AppState>,
    user: Option<AuthUser>,
) -> Result<Json<StatusResponse>, WalletError> {
    let service = WalletLinkService::from_ref(&state);
    let status = service.status(user.map(|AuthUser(id)| id)).await?;
    Ok(Json(StatusResponse {
        success: true,
        wallet_connected: status.wallet_connected,
        wallet_address: status.wallet_address,
        user_role: status.user_role,
    }))
}

/// GET /wallet/link-message?walletAddress=..&userRole=..
pub async fn get_link_message(
    Query(q): Query<LinkMessageQuery>,
) -> Result<Json<MessageResponse>, WalletError> {
    let address = WalletAddress::parse(q.wallet_address.as_deref().unwrap_or_default())?;
    let role: Role = q
        .user_role
        .as_deref()
        .ok_or(WalletError::InvalidRole)?
        .parse()?;
    let message = link_message(&address, role, OffsetDateTime::now_utc())?;
    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}
