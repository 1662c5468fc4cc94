//! Argon2id password hashing. Both operations are CPU bound (around 100ms),
//! so the async entry points move them onto the blocking pool.

use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::error::AppError;

fn phc_hash(plain: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)?
        .to_string())
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is unreadable.
fn phc_matches(plain: &str, stored: &str) -> Result<bool, password_hash::Error> {
    let parsed = PasswordHash::new(stored)?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

async fn off_runtime<T, F>(op: &'static str, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, password_hash::Error> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal(format!("failed to {op} password")).with_source(e))?;
    joined.map_err(|e| {
        error!(error = %e, op, "argon2 failure");
        AppError::internal(format!("failed to {op} password")).with_source(anyhow::anyhow!(e))
    })
}

pub async fn hash_blocking(plain: String) -> Result<String, AppError> {
    off_runtime("hash", move || phc_hash(&plain)).await
}

pub async fn verify_blocking(plain: String, stored: String) -> Result<bool, AppError> {
    off_runtime("verify", move || phc_matches(&plain, &stored)).await
}
