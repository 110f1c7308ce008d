//! Credential derivation and validation.
//!
//! # Responsibilities
//! - Derive the long-term authentication key (`MD5(user:realm:pass)`)
//! - Derive ephemeral passwords (`base64(HMAC-SHA1(secret, username))`)
//! - Extract and check the expiry embedded in an ephemeral username
//! - Generate ephemeral credential pairs for clients
//!
//! # Design Decisions
//! - Stateless: nothing is stored, expiry lives in the username itself
//! - The first integer field of the username is the expiry (unix seconds);
//!   every other field is opaque

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Key the protocol engine uses to verify message integrity.
pub type AuthKey = [u8; 16];

/// Error type for ephemeral credential checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid ephemeral username: no timestamp field")]
    Invalid,
    #[error("ephemeral credential expired")]
    Expired,
    #[error("shared secret rejected by HMAC")]
    Secret,
}

/// Long-term credential key: `MD5(username ":" realm ":" password)`.
pub fn generate_auth_key(username: &str, realm: &str, password: &str) -> AuthKey {
    Md5::digest(format!("{}:{}:{}", username, realm, password)).into()
}

/// Password matching an ephemeral `username` under `secret`.
pub fn ephemeral_password(username: &str, secret: &str) -> Result<String, CredentialError> {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| CredentialError::Secret)?;
    mac.update(username.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn unix_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// The expiry embedded in an ephemeral username, as unix seconds.
pub fn username_expiry(username: &str) -> Result<i64, CredentialError> {
    username
        .split(':')
        .find_map(|field| field.trim().parse::<i64>().ok())
        .ok_or(CredentialError::Invalid)
}

/// Check that the username carries an expiry later than `now`.
pub fn check_expiry(username: &str, now: SystemTime) -> Result<i64, CredentialError> {
    let expiry = username_expiry(username)?;
    if expiry <= unix_secs(now) {
        return Err(CredentialError::Expired);
    }
    Ok(expiry)
}

/// An ephemeral username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EphemeralCredentials {
    pub username: String,
    pub password: String,
    pub expires_at: i64,
}

/// Generate credentials for `user_id`, valid for `ttl` from `now`.
pub fn ephemeral_credentials(
    user_id: &str,
    ttl: Duration,
    secret: &str,
    now: SystemTime,
) -> Result<EphemeralCredentials, CredentialError> {
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let expires_at = unix_secs(now).saturating_add(ttl);
    let username = if user_id.is_empty() {
        expires_at.to_string()
    } else {
        format!("{}:{}", expires_at, user_id)
    };
    let password = ephemeral_password(&username, secret)?;

    Ok(EphemeralCredentials {
        username,
        password,
        expires_at,
    })
}
