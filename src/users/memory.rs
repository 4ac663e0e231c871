use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    directory::{DirectoryError, UserDirectory, EMAIL_KEY, PHONE_NUMBER_KEY, WALLET_ADDRESS_KEY},
    model::{NewUser, User},
    role::Role,
};

/// In-process directory that enforces the same unique keys as the table.
#[derive(Default)]
pub struct MemoryUserDirectory {
    rows: Mutex<Vec<User>>,
    calls: AtomicUsize,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directory operations performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn all(&self) -> Vec<User> {
        self.rows.lock().unwrap().clone()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.touch();
        self.rows.lock().unwrap().iter().find(|u| pred(u)).cloned()
    }

    fn update(&self, id: i64, apply: impl FnOnce(&mut User)) -> Result<(), DirectoryError> {
        self.touch();
        let mut rows = self.rows.lock().unwrap();
        if let Some(user) = rows.iter_mut().find(|u| u.id == id) {
            apply(user);
        }
        Ok(())
    }
}

fn conflict(constraint: &str) -> DirectoryError {
    DirectoryError::Conflict {
        constraint: Some(constraint.to_string()),
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DirectoryError> {
        Ok(self.find(|u| u.id == id))
    }

    async fn find_by_wallet(&self, address: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self.find(|u| u.wallet_address.as_deref() == Some(address)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self.find(|u| u.email.as_deref() == Some(email)))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self.find(|u| u.phone_number == phone))
    }

    async fn insert(&self, user: NewUser) -> Result<User, DirectoryError> {
        self.touch();
        let mut rows = self.rows.lock().unwrap();
        for existing in rows.iter() {
            if user.wallet_address.is_some() && existing.wallet_address == user.wallet_address {
                return Err(conflict(WALLET_ADDRESS_KEY));
            }
            if user.email.is_some() && existing.email == user.email {
                return Err(conflict(EMAIL_KEY));
            }
            if existing.phone_number == user.phone_number {
                return Err(conflict(PHONE_NUMBER_KEY));
            }
        }
        let created = User {
            id: rows.len() as i64 + 1,
            first_name: user.first_name,
            middle_name: None,
            last_name: user.last_name,
            email: user.email,
            phone_number: user.phone_number,
            role: user.role.map(|r| r.display_label().to_string()),
            user_role: user.role.map(|r| r.as_str().to_string()),
            password_hash: user.password_hash,
            registration_channel: Some(user.registration_channel.to_string()),
            user_identifier_image_url: None,
            wallet_address: user.wallet_address,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(created.clone());
        Ok(created)
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<(), DirectoryError> {
        self.update(id, |u| {
            u.role = Some(role.display_label().to_string());
            u.user_role = Some(role.as_str().to_string());
        })
    }

    async fn link_wallet(&self, id: i64, address: &str, role: Role) -> Result<(), DirectoryError> {
        {
            let rows = self.rows.lock().unwrap();
            if rows
                .iter()
                .any(|u| u.id != id && u.wallet_address.as_deref() == Some(address))
            {
                self.touch();
                return Err(conflict(WALLET_ADDRESS_KEY));
            }
        }
        self.update(id, |u| {
            u.wallet_address = Some(address.to_string());
            u.role = Some(role.display_label().to_string());
            u.user_role = Some(role.as_str().to_string());
        })
    }

    async fn clear_wallet(&self, id: i64) -> Result<(), DirectoryError> {
        self.update(id, |u| u.wallet_address = None)
    }

    async fn set_identifier_image_url(&self, id: i64, url: &str) -> Result<(), DirectoryError> {
        self.update(id, |u| u.user_identifier_image_url = Some(url.to_string()))
    }
}
