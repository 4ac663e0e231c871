use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use super::role::Role;

/// `registration_channel` for accounts created by a wallet connect.
pub const WALLET_CHANNEL: &str = "wallet";
/// `registration_channel` for phone/password registrations.
pub const WEB_CHANNEL: &str = "web";

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: String,
    pub role: Option<String>,      // legacy display label
    pub user_role: Option<String>, // canonical token
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub registration_channel: Option<String>,
    pub user_identifier_image_url: Option<String>,
    pub wallet_address: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn role_token(&self) -> Option<Role> {
        self.user_role.as_deref().and_then(|t| t.parse().ok())
    }

    pub fn is_wallet_account(&self) -> bool {
        self.registration_channel.as_deref() == Some(WALLET_CHANNEL)
    }
}

/// Fields for an insert. `role` fills both `role` and `user_role`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: String,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
    pub registration_channel: &'static str,
    pub wallet_address: Option<String>,
}
