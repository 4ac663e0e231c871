use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
        services::{is_valid_email, normalize_email},
    },
    error::ApiError,
    state::AppState,
    users::{model::WEB_CHANNEL, DirectoryError, NewUser, Role, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn respond_with_session(state: &AppState, user: User) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let tokens = keys.issue_pair(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        ApiError::internal(e)
    })?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let phone_number = payload.phone_number.trim().to_string();
    if phone_number.is_empty() {
        warn!("missing phone number");
        return Err(ApiError::bad_request("Phone number is required"));
    }

    let email = normalize_email(payload.email.as_deref());
    if let Some(email) = email.as_deref() {
        if !is_valid_email(email) {
            warn!(email = %email, "invalid email");
            return Err(ApiError::bad_request("Invalid email"));
        }
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::bad_request("Password too short"));
    }

    let role = payload
        .user_role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    // Ensure phone and email are not taken
    match state.users.find_by_phone(&phone_number).await {
        Ok(Some(_)) => {
            warn!(phone = %phone_number, "phone already registered");
            return Err(ApiError::conflict("Phone number already registered"));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_by_phone failed");
            return Err(ApiError::internal(e));
        }
    }
    if let Some(email) = email.as_deref() {
        match state.users.find_by_email(email).await {
            Ok(Some(_)) => {
                warn!(email = %email, "email already registered");
                return Err(ApiError::conflict("Email already registered"));
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "find_by_email failed");
                return Err(ApiError::internal(e));
            }
        }
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::internal(e)
    })?;

    let new_user = NewUser {
        first_name: payload.first_name,
        last_name: payload.last_name,
        email,
        phone_number,
        role,
        password_hash: Some(hash),
        registration_channel: WEB_CHANNEL,
        wallet_address: None,
    };
    let user = match state.users.insert(new_user).await {
        Ok(u) => u,
        Err(DirectoryError::Conflict { constraint }) => {
            warn!(?constraint, "registration raced with another insert");
            return Err(ApiError::conflict("Account already registered"));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(ApiError::internal(e));
        }
    };

    info!(user_id = user.id, "user registered");
    respond_with_session(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let phone_number = payload.phone_number.trim();
    if phone_number.is_empty() {
        return Err(ApiError::bad_request("Phone number is required"));
    }

    let user = match state.users.find_by_phone(phone_number).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(phone = %phone_number, "login unknown phone");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(e) => {
            error!(error = %e, "find_by_phone failed");
            return Err(ApiError::internal(e));
        }
    };

    // Wallet-only accounts have no password and must sign in with the wallet.
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = user.id, "password login for wallet-only account");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    let ok = verify_password(&payload.password, hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        ApiError::internal(e)
    })?;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    info!(user_id = user.id, "user logged in");
    respond_with_session(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    respond_with_session(&state, user)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "load user failed");
            ApiError::internal(e)
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(PublicUser::from(user)))
}
