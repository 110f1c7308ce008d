//! Auth object: the authentication policy.
//!
//! # Responsibilities
//! - Hold the current credential type, realm and secrets
//! - Answer the protocol engine's authentication requests
//!
//! # Design Decisions
//! - The configured realm always derives the key; a client presenting a
//!   different realm gets a key that will not verify
//! - Rejections carry no detail back to the client, only to the log

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::auth::credentials::{self, AuthKey};
use crate::auth::AuthError;
use crate::config::{AuthConfig, AuthType, SectionConfig, DEFAULT_AUTH_NAME};
use crate::object::{Object, ObjectError, ObjectKind, ReconcileOutcome};
use crate::observability::metrics;
use crate::observability::ratelimit::LogGate;
use crate::observability::{Logger, LoggerFactory};

/// Status report of the auth object. Never carries secrets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    pub realm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Holds the authentication policy.
pub struct Auth {
    config: ArcSwap<AuthConfig>,
    log: Logger,
    rejections: LogGate,
}

impl Auth {
    pub fn new(mut config: AuthConfig, logger: &LoggerFactory) -> Result<Self, ObjectError> {
        config.validate()?;
        let log = logger.logger("auth");

        {
            let _scope = log.enter();
            tracing::info!(config = %config, "Auth created");
        }

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            log,
            rejections: LogGate::default(),
        })
    }

    /// Realm advertised to clients.
    pub fn realm(&self) -> String {
        self.config.load().realm.clone()
    }

    /// Check a client's username and return the key for message integrity.
    ///
    /// `realm` is the realm the client presented; `now` is used for the
    /// expiry check of ephemeral credentials.
    pub fn authenticate(
        &self,
        username: &str,
        realm: &str,
        peer: Option<SocketAddr>,
        now: SystemTime,
    ) -> Result<AuthKey, AuthError> {
        let config = self.config.load();
        let result = match config.auth_type {
            AuthType::Static => Self::check_static(&config, username),
            AuthType::Ephemeral => Self::check_ephemeral(&config, username, now),
        };

        match &result {
            Ok(_) => {
                metrics::record_auth("success");
                let _scope = self.log.enter();
                if realm != config.realm {
                    tracing::debug!(username = %username, realm = %realm, configured = %config.realm, "Client realm differs from configured realm");
                }
                tracing::debug!(username = %username, peer = ?peer, "Authentication succeeded");
            }
            Err(e) => {
                metrics::record_auth(match e {
                    AuthError::Credential(credentials::CredentialError::Expired) => "expired",
                    AuthError::Credential(_) => "invalid",
                    _ => "rejected",
                });
                if let Some(suppressed) = self.rejections.allow() {
                    let _scope = self.log.enter();
                    tracing::info!(username = %username, peer = ?peer, error = %e, suppressed, "Authentication rejected");
                }
            }
        }
        result
    }

    fn check_static(config: &AuthConfig, username: &str) -> Result<AuthKey, AuthError> {
        let (Some(expected), Some(password)) = (config.username(), config.password()) else {
            return Err(AuthError::Unavailable);
        };
        if username != expected {
            return Err(AuthError::Rejected);
        }
        Ok(credentials::generate_auth_key(username, &config.realm, password))
    }

    fn check_ephemeral(
        config: &AuthConfig,
        username: &str,
        now: SystemTime,
    ) -> Result<AuthKey, AuthError> {
        let secret = config.secret().ok_or(AuthError::Unavailable)?;
        credentials::check_expiry(username, now)?;
        let password = credentials::ephemeral_password(username, secret)?;
        Ok(credentials::generate_auth_key(username, &config.realm, &password))
    }
}

impl Object for Auth {
    type Config = AuthConfig;
    type Status = AuthStatus;

    const KIND: ObjectKind = ObjectKind::Auth;

    fn name(&self) -> &str {
        DEFAULT_AUTH_NAME
    }

    fn reconcile(&self, config: &AuthConfig) -> Result<ReconcileOutcome, ObjectError> {
        let _scope = self.log.enter();
        let mut next = config.clone();
        next.validate()?;

        let current = self.config.load_full();
        tracing::info!(old = %current, new = %next, "Auth reconciled");
        self.config.store(Arc::new(next));
        Ok(ReconcileOutcome::Updated)
    }

    fn config(&self) -> AuthConfig {
        (**self.config.load()).clone()
    }

    fn close(&self) -> Result<(), ObjectError> {
        let _scope = self.log.enter();
        tracing::debug!("Auth closed");
        Ok(())
    }

    fn status(&self) -> AuthStatus {
        let config = self.config.load();
        AuthStatus {
            auth_type: config.auth_type,
            realm: config.realm.clone(),
            username: match config.auth_type {
                AuthType::Static => config.username().map(str::to_string),
                AuthType::Ephemeral => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::CredentialError;

    fn static_config() -> AuthConfig {
        let mut config = AuthConfig {
            realm: "example.org".into(),
            ..Default::default()
        };
        config.credentials.insert("username".into(), "user1".into());
        config.credentials.insert("password".into(), "passwd1".into());
        config
    }

    fn ephemeral_config(secret: &str) -> AuthConfig {
        let mut config = AuthConfig {
            auth_type: AuthType::Ephemeral,
            realm: "example.org".into(),
            ..Default::default()
        };
        config.credentials.insert("secret".into(), secret.into());
        config
    }

    fn build(config: AuthConfig) -> Auth {
        Auth::new(config, &LoggerFactory::detached("info")).unwrap()
    }

    #[test]
    fn test_static_auth() {
        let auth = build(static_config());
        let now = SystemTime::now();

        let key = auth.authenticate("user1", "example.org", None, now).unwrap();
        assert_eq!(
            key,
            credentials::generate_auth_key("user1", "example.org", "passwd1")
        );
        assert_eq!(
            auth.authenticate("user2", "example.org", None, now),
            Err(AuthError::Rejected)
        );
    }

    #[test]
    fn test_configured_realm_derives_key() {
        let auth = build(static_config());
        let key = auth
            .authenticate("user1", "other.realm", None, SystemTime::now())
            .unwrap();
        assert_eq!(
            key,
            credentials::generate_auth_key("user1", "example.org", "passwd1")
        );
    }

    #[test]
    fn test_ephemeral_auth() {
        let auth = build(ephemeral_config("my-secret"));
        let now = SystemTime::now();
        let creds =
            credentials::ephemeral_credentials("alice", Duration::from_secs(600), "my-secret", now)
                .unwrap();

        let key = auth
            .authenticate(&creds.username, "example.org", None, now)
            .unwrap();
        assert_eq!(
            key,
            credentials::generate_auth_key(&creds.username, "example.org", &creds.password)
        );

        let later = now + Duration::from_secs(601);
        assert_eq!(
            auth.authenticate(&creds.username, "example.org", None, later),
            Err(AuthError::Credential(CredentialError::Expired))
        );
        assert_eq!(
            auth.authenticate("alice", "example.org", None, now),
            Err(AuthError::Credential(CredentialError::Invalid))
        );
    }

    #[test]
    fn test_reconcile_switches_mode() {
        let auth = build(static_config());
        let now = SystemTime::now();
        assert!(auth.authenticate("user1", "example.org", None, now).is_ok());

        let outcome = auth.reconcile(&ephemeral_config("s")).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(auth.config().auth_type, AuthType::Ephemeral);
        assert!(auth.authenticate("user1", "example.org", None, now).is_err());
    }

    #[test]
    fn test_status_hides_secrets() {
        let auth = build(static_config());
        let json = serde_json::to_string(&auth.status()).unwrap();
        assert!(json.contains("user1"));
        assert!(!json.contains("passwd1"));

        let auth = build(ephemeral_config("top-secret"));
        let json = serde_json::to_string(&auth.status()).unwrap();
        assert!(!json.contains("top-secret"));
    }
}
