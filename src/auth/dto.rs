use serde::{Deserialize, Serialize};

use crate::users::{Role, User};

/// Request body for phone/password registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub phone_number: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub phone_number: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response returned after login, register or refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub email: Option<String>,
    pub phone_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_role: Option<Role>,
    pub wallet_address: Option<String>,
    pub user_identifier_image_url: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        let user_role = user.role_token();
        Self {
            id: user.id,
            email: user.email,
            phone_number: user.phone_number,
            first_name: user.first_name,
            last_name: user.last_name,
            user_role,
            wallet_address: user.wallet_address,
            user_identifier_image_url: user.user_identifier_image_url,
        }
    }
}
