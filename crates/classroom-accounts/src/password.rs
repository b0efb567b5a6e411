//! Password hashing.
//!
//! Stored values are Argon2id PHC strings (`$argon2id$v=19$...`) carrying
//! their own salt and cost parameters.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::AccountError;

/// Hashes `password` with a new random salt.
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::PasswordHash(e.to_string()))
}

/// Checks `password` against a value produced by [`hash_password`].
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
