use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{
    error::ApiError,
    users::{
        directory::{EMAIL_KEY, WALLET_ADDRESS_KEY},
        role::InvalidRole,
        DirectoryError,
    },
};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid wallet address format.")]
    InvalidAddress,

    #[error("Invalid role. Must be one of: farmer, wholesaler, distributor, retailer, admin")]
    InvalidRole,

    #[error("Invalid signature.")]
    InvalidSignature,

    #[error("Signature verification failed. Wallet address mismatch.")]
    SignatureMismatch,

    #[error("A signature and the signed message are required.")]
    SignatureRequired,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("User not authenticated.")]
    Unauthenticated,

    #[error("Wallet address is already linked to another account.")]
    AddressAlreadyLinked,

    #[error("User not found")]
    UserNotFound,

    /// Message includes the cause; this leaks storage details to the client.
    #[error("Wallet operation failed: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl WalletError {
    pub fn status(&self) -> StatusCode {
        match self {
            WalletError::InvalidAddress
            | WalletError::InvalidRole
            | WalletError::InvalidSignature
            | WalletError::SignatureMismatch
            | WalletError::SignatureRequired
            | WalletError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            WalletError::Unauthenticated => StatusCode::UNAUTHORIZED,
            WalletError::AddressAlreadyLinked => StatusCode::CONFLICT,
            WalletError::UserNotFound => StatusCode::NOT_FOUND,
            WalletError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InvalidRole> for WalletError {
    fn from(_: InvalidRole) -> Self {
        WalletError::InvalidRole
    }
}

// The synthesized email is derived from the address, so a clash on either key
// means the address is already taken.
impl From<DirectoryError> for WalletError {
    fn from(e: DirectoryError) -> Self {
        if e.is_conflict_on(WALLET_ADDRESS_KEY) || e.is_conflict_on(EMAIL_KEY) {
            return WalletError::AddressAlreadyLinked;
        }
        match e {
            DirectoryError::Storage(inner) => WalletError::Internal(inner),
            conflict => WalletError::Internal(anyhow::Error::new(conflict)),
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        ApiError::new(e.status(), e.to_string())
    }
}

impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        if let WalletError::Internal(cause) = &self {
            error!(error = ?cause, "wallet request failed");
        }
        ApiError::from(self).into_response()
    }
}
