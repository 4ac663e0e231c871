//! Personal-message (EIP-191) signature recovery on secp256k1.
//!
//! Wallets sign `"\x19Ethereum Signed Message:\n" + len(message) + message`
//! hashed with Keccak-256. The signature is 65 bytes `r || s || v` rendered as
//! hex. Recovering the public key and hashing it yields the signer address.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";
const SIGNATURE_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    InvalidHex,

    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    /// v must be 0, 1, 27 or 28
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("invalid signature scalars")]
    InvalidFormat,

    #[error("failed to recover public key")]
    RecoveryFailed,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Digest a wallet signs for `personal_sign` / `signMessage`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Lowercase `0x…` address of a public key.
pub fn address_from_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

fn parse_signature(signature: &str) -> Result<(Signature, RecoveryId), SignatureError> {
    let trimmed = signature.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|_| SignatureError::InvalidHex)?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(SignatureError::InvalidLength(bytes.len()));
    }

    let v = bytes[64];
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id = RecoveryId::from_byte(parity).ok_or(SignatureError::InvalidRecoveryId(v))?;
    let sig = Signature::from_slice(&bytes[..64]).map_err(|_| SignatureError::InvalidFormat)?;

    // k256 only recovers low-S signatures; flipping S flips the R parity.
    Ok(match sig.normalize_s() {
        Some(low) => (
            low,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (sig, recovery_id),
    })
}

/// Address that signed `message`.
pub fn recover_address(message: &str, signature: &str) -> Result<String, SignatureError> {
    let (sig, recovery_id) = parse_signature(signature)?;
    let digest = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_from_key(&key))
}

/// `Ok(true)` if `signature` over `message` was produced by `claimed`.
/// A well-formed signature from someone else is `Ok(false)`, not an error.
pub fn verify(message: &str, signature: &str, claimed: &str) -> Result<bool, SignatureError> {
    let recovered = recover_address(message, signature)?;
    Ok(recovered.eq_ignore_ascii_case(claimed))
}
