use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supply-chain role of a user. Serialized as its lowercase token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Wholesaler,
    Distributor,
    Retailer,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid role. Must be one of: farmer, wholesaler, distributor, retailer, admin")]
pub struct InvalidRole;

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Farmer,
        Role::Wholesaler,
        Role::Distributor,
        Role::Retailer,
        Role::Admin,
    ];

    /// Canonical token stored in `users.user_role`.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Wholesaler => "wholesaler",
            Role::Distributor => "distributor",
            Role::Retailer => "retailer",
            Role::Admin => "admin",
        }
    }

    /// Legacy label stored in `users.role`.
    pub fn display_label(self) -> &'static str {
        match self {
            Role::Farmer => "Farmer",
            Role::Wholesaler => "Wholesaler",
            Role::Distributor => "Distributor",
            Role::Retailer => "Retailer",
            Role::Admin => "Admin",
        }
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    // Tokens are case-sensitive.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == token)
            .ok_or(InvalidRole)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
