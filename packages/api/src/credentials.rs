//! Password hashing.
//!
//! Argon2id with a fresh random salt per record, stored as a PHC string.
//! Verification goes through the constant-time comparison of `password-hash`.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_PASSWORD_BYTES: usize = 1024;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct CredentialError(String);

/// Verified against when the email is unknown, so both failure paths cost
/// one Argon2 run.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("agroscan-timing-equalizer").unwrap_or_default());

pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Burns the same work as a real verification and always fails.
pub fn reject_unknown_user(password: &str) -> bool {
    verify_password(password, &DUMMY_HASH);
    false
}
