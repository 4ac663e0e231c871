use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use super::error::WalletError;

/// True iff `s` is `0x` followed by exactly 40 hex characters, any case.
pub fn is_valid_address(s: &str) -> bool {
    lazy_static! {
        static ref ADDRESS_RE: Regex = Regex::new(r"^0x[a-fA-F0-9]{40}$").unwrap();
    }
    ADDRESS_RE.is_match(s)
}

/// A validated wallet address in lowercase canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        if !is_valid_address(raw) {
            return Err(WalletError::InvalidAddress);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `wallet_` plus the ten hex characters after `0x`.
    pub fn synthetic_phone(&self) -> String {
        format!("wallet_{}", &self.0[2..12])
    }

    /// `<address>@wallet.<domain>`.
    pub fn synthetic_email(&self, domain: &str) -> String {
        format!("{}@wallet.{}", self.0, domain)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
