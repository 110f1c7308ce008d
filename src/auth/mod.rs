//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! protocol engine auth callback (username, realm, peer)
//!     → relay::handlers::AuthHandler (fetches the live Auth object)
//!     → object::auth::Auth::authenticate
//!     → credentials.rs (static check or ephemeral expiry + HMAC password)
//!     → AuthKey handed back to the engine, or rejection
//! ```
//!
//! # Design Decisions
//! - Rejections never reveal which part of the credential was wrong
//! - Credentials are stateless; ephemeral ones expire by their own timestamp

pub mod credentials;

pub use credentials::{AuthKey, CredentialError, EphemeralCredentials};

/// Error type for authentication attempts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication rejected")]
    Rejected,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("no authentication policy configured")]
    Unavailable,
}
