//! Argon2id hashing for password-protected links.
//!
//! Hashing and verification are CPU-bound, so both run on the blocking
//! thread pool instead of stalling the async runtime.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tokio::task;

pub async fn hash(password: &str) -> Result<String> {
    let password = password.to_string();
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("failed to hash password: {e}"))?;
        Ok(hash.to_string())
    })
    .await?
}

/// Verify a candidate against a stored PHC string. A malformed stored hash
/// counts as a mismatch (logged) rather than an error, since the caller
/// treats mismatches as "absent" without analytics.
pub async fn verify(candidate: &str, stored: &str) -> Result<bool> {
    let candidate = candidate.to_string();
    let stored = stored.to_string();
    task::spawn_blocking(move || {
        let parsed = match PasswordHash::new(&stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                return Ok(false);
            }
        };
        Ok(Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok())
    })
    .await?
}
