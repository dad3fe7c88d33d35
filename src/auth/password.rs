use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::{error, warn};

lazy_static! {
    // Stand-in hash so a lookup miss costs as much as a wrong password.
    static ref DUMMY_HASH: String =
        hash_password("dummy-password-never-issued").unwrap_or_default();
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Returns `false` both for a wrong password and for a hash that does not
/// parse as a PHC string.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "argon2 parse hash error");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

// Argon2 is CPU-bound; run it on the blocking pool so request tasks keep moving.

pub async fn hash_password_off_thread(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain)).await?
}

pub async fn verify_password_off_thread(plain: String, hash: String) -> anyhow::Result<bool> {
    let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?;
    Ok(ok)
}

/// Runs a full verification against a hash no user owns. Always `false`.
pub async fn verify_dummy_off_thread(plain: String) -> anyhow::Result<bool> {
    let ok = tokio::task::spawn_blocking(move || {
        let _ = verify_password(&plain, &DUMMY_HASH);
        false
    })
    .await?;
    Ok(ok)
}
