use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::WalletError;
use crate::users::Role;

/// `Json<T>` whose rejections answer with the wallet error envelope.
pub struct WalletJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for WalletJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = WalletError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(WalletError::InvalidBody(rejection.body_text())),
        }
    }
}

// Non-string values become `None` so they fail address/role validation.
fn string_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Body of `POST /wallet/connect`. Fields are optional so that missing values
/// surface as address/role errors rather than a JSON rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default, deserialize_with = "string_only")]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    pub user_role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub success: bool,
    pub message: &'static str,
    pub wallet_address: String,
    pub user_role: Role,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub wallet_connected: bool,
    pub wallet_address: Option<String>,
    pub user_role: Option<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMessageQuery {
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}
