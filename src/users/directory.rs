use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::{model::NewUser, model::User, role::Role};
use crate::db::unique_violation;

pub const WALLET_ADDRESS_KEY: &str = "users_wallet_address_key";
pub const EMAIL_KEY: &str = "users_email_key";
pub const PHONE_NUMBER_KEY: &str = "users_phone_number_key";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("unique constraint violated: {}", .constraint.as_deref().unwrap_or("unknown"))]
    Conflict { constraint: Option<String> },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl DirectoryError {
    pub fn is_conflict_on(&self, name: &str) -> bool {
        matches!(self, DirectoryError::Conflict { constraint: Some(c) } if c == name)
    }
}

/// Persisted user table. Every write is a single statement.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DirectoryError>;
    async fn find_by_wallet(&self, address: &str) -> Result<Option<User>, DirectoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, DirectoryError>;
    async fn insert(&self, user: NewUser) -> Result<User, DirectoryError>;
    /// Writes `role` and `user_role` together.
    async fn update_role(&self, id: i64, role: Role) -> Result<(), DirectoryError>;
    /// Sets the wallet and both role columns together.
    async fn link_wallet(&self, id: i64, address: &str, role: Role) -> Result<(), DirectoryError>;
    async fn clear_wallet(&self, id: i64) -> Result<(), DirectoryError>;
    async fn set_identifier_image_url(&self, id: i64, url: &str) -> Result<(), DirectoryError>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn storage_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> DirectoryError {
    move |e| match unique_violation(&e) {
        Some(constraint) => DirectoryError::Conflict { constraint },
        None => DirectoryError::Storage(anyhow::Error::new(e).context(op)),
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DirectoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, middle_name, last_name, email, phone_number, role, user_role,
                   password_hash, registration_channel, user_identifier_image_url,
                   wallet_address, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(storage_err("find user by id"))?;
        Ok(user)
    }

    async fn find_by_wallet(&self, address: &str) -> Result<Option<User>, DirectoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, middle_name, last_name, email, phone_number, role, user_role,
                   password_hash, registration_channel, user_identifier_image_url,
                   wallet_address, created_at
            FROM users
            WHERE wallet_address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.db)
        .await
        .map_err(storage_err("find user by wallet"))?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, middle_name, last_name, email, phone_number, role, user_role,
                   password_hash, registration_channel, user_identifier_image_url,
                   wallet_address, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(storage_err("find user by email"))?;
        Ok(user)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, DirectoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, middle_name, last_name, email, phone_number, role, user_role,
                   password_hash, registration_channel, user_identifier_image_url,
                   wallet_address, created_at
            FROM users
            WHERE phone_number = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.db)
        .await
        .map_err(storage_err("find user by phone"))?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, DirectoryError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, email, phone_number, role, user_role,
                               password_hash, registration_channel, wallet_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, first_name, middle_name, last_name, email, phone_number, role, user_role,
                      password_hash, registration_channel, user_identifier_image_url,
                      wallet_address, created_at
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(user.role.map(Role::display_label))
        .bind(user.role.map(Role::as_str))
        .bind(&user.password_hash)
        .bind(user.registration_channel)
        .bind(&user.wallet_address)
        .fetch_one(&self.db)
        .await
        .map_err(storage_err("insert user"))?;
        Ok(created)
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<(), DirectoryError> {
        sqlx::query(r#"UPDATE users SET role = $1, user_role = $2 WHERE id = $3"#)
            .bind(role.display_label())
            .bind(role.as_str())
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(storage_err("update user role"))?;
        Ok(())
    }

    async fn link_wallet(&self, id: i64, address: &str, role: Role) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            UPDATE users
               SET wallet_address = $1, role = $2, user_role = $3
             WHERE id = $4
            "#,
        )
        .bind(address)
        .bind(role.display_label())
        .bind(role.as_str())
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(storage_err("link wallet"))?;
        Ok(())
    }

    async fn clear_wallet(&self, id: i64) -> Result<(), DirectoryError> {
        sqlx::query(r#"UPDATE users SET wallet_address = NULL WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(storage_err("clear wallet"))?;
        Ok(())
    }

    async fn set_identifier_image_url(&self, id: i64, url: &str) -> Result<(), DirectoryError> {
        sqlx::query(r#"UPDATE users SET user_identifier_image_url = $1 WHERE id = $2"#)
            .bind(url)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(storage_err("set identifier image url"))?;
        Ok(())
    }
}
