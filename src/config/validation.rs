//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Fill in defaults for omitted fields
//! - Normalize list fields (sorted, deduplicated) so equality is structural
//! - Detect duplicate listener and cluster names
//!
//! # Design Decisions
//! - Section validation mutates in place and is idempotent
//! - `validate_config` returns all section errors, not just the first
//! - Runs before any configuration reaches the reconciler

use std::collections::HashSet;
use std::net::IpAddr;

use tracing_subscriber::EnvFilter;

use crate::config::schema::{
    AdminConfig, AuthConfig, AuthType, ClusterConfig, ClusterType, ListenerConfig, RelayConfig,
    SectionConfig, API_VERSION, DEFAULT_ADMIN_NAME, DEFAULT_AUTH_NAME,
};
use crate::net::tls;
use crate::routing::endpoint::{DomainEndpoint, Endpoint};

pub const DEFAULT_RELAY_NAME: &str = "relay-plane";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_REALM: &str = "relay.local";
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3478;
pub const DEFAULT_MIN_RELAY_PORT: u16 = 1 << 15;
pub const DEFAULT_MAX_RELAY_PORT: u16 = u16::MAX;

/// A rejected configuration section, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{section} \"{name}\": invalid {field}: {reason}")]
pub struct ValidationError {
    pub section: &'static str,
    pub name: String,
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        section: &'static str,
        name: impl Into<String>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            section,
            name: name.into(),
            field,
            reason: reason.into(),
        }
    }
}

impl SectionConfig for AdminConfig {
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            self.name = DEFAULT_RELAY_NAME.to_string();
        }
        if self.log_level.is_empty() {
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        EnvFilter::try_new(&self.log_level).map_err(|e| {
            ValidationError::new("admin", &self.name, "logLevel", e.to_string())
        })?;
        Ok(())
    }

    fn config_name(&self) -> String {
        DEFAULT_ADMIN_NAME.to_string()
    }
}

impl SectionConfig for AuthConfig {
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.realm.is_empty() {
            self.realm = DEFAULT_REALM.to_string();
        }

        let required: &[&'static str] = match self.auth_type {
            AuthType::Static => &["username", "password"],
            AuthType::Ephemeral => &["secret"],
        };
        for key in required {
            let present = self.credentials.get(*key).is_some_and(|v| !v.is_empty());
            if !present {
                return Err(ValidationError::new(
                    "auth",
                    DEFAULT_AUTH_NAME,
                    "credentials",
                    format!("{} auth requires a non-empty \"{}\"", self.auth_type, key),
                ));
            }
        }
        Ok(())
    }

    fn config_name(&self) -> String {
        DEFAULT_AUTH_NAME.to_string()
    }
}

impl SectionConfig for ListenerConfig {
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::new("listener", "", "name", "missing name"));
        }

        if self.address.is_empty() {
            self.address = DEFAULT_ADDRESS.to_string();
        }
        if self.address.parse::<IpAddr>().is_err() {
            return Err(ValidationError::new(
                "listener",
                &self.name,
                "address",
                format!("\"{}\" is not an IP address", self.address),
            ));
        }
        if let Some(public) = &self.public_address {
            if public.parse::<IpAddr>().is_err() {
                return Err(ValidationError::new(
                    "listener",
                    &self.name,
                    "publicAddress",
                    format!("\"{}\" is not an IP address", public),
                ));
            }
        }

        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.min_relay_port == 0 {
            self.min_relay_port = DEFAULT_MIN_RELAY_PORT;
        }
        if self.max_relay_port == 0 {
            self.max_relay_port = DEFAULT_MAX_RELAY_PORT;
        }
        if self.min_relay_port > self.max_relay_port {
            return Err(ValidationError::new(
                "listener",
                &self.name,
                "minRelayPort",
                format!(
                    "{} is greater than maxRelayPort {}",
                    self.min_relay_port, self.max_relay_port
                ),
            ));
        }

        if self.protocol.is_secure() {
            match (&self.cert, &self.key) {
                (Some(cert), Some(key)) => {
                    tls::load_tls_material(cert, key).map_err(|e| {
                        ValidationError::new("listener", &self.name, "cert", e.to_string())
                    })?;
                }
                _ => {
                    return Err(ValidationError::new(
                        "listener",
                        &self.name,
                        "cert",
                        format!("{} listener requires both cert and key", self.protocol),
                    ));
                }
            }
        }

        // Route order is the scan order, so only drop blanks and repeats.
        let mut seen = HashSet::new();
        self.routes.retain(|r| !r.is_empty() && seen.insert(r.clone()));
        Ok(())
    }

    fn config_name(&self) -> String {
        self.name.clone()
    }
}

impl SectionConfig for ClusterConfig {
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::new("cluster", "", "name", "missing name"));
        }

        for endpoint in self.endpoints.iter_mut() {
            *endpoint = endpoint.trim().to_string();
        }
        self.endpoints.retain(|e| !e.is_empty());

        for endpoint in &self.endpoints {
            let parsed = match self.cluster_type {
                ClusterType::Static => Endpoint::parse(endpoint).map(|_| ()),
                ClusterType::Domain => DomainEndpoint::parse(endpoint).map(|_| ()),
            };
            parsed.map_err(|e| {
                ValidationError::new("cluster", &self.name, "endpoints", e.to_string())
            })?;
        }

        self.endpoints.sort();
        self.endpoints.dedup();
        Ok(())
    }

    fn config_name(&self) -> String {
        self.name.clone()
    }
}

impl RelayConfig {
    /// Validate and normalize the whole document.
    pub fn validate(&mut self) -> Result<(), Vec<ValidationError>> {
        validate_config(self)
    }
}

/// Validate every section, collecting all errors.
pub fn validate_config(config: &mut RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.api_version.is_empty() {
        config.api_version = API_VERSION.to_string();
    }
    if config.api_version != API_VERSION {
        errors.push(ValidationError::new(
            "config",
            "",
            "apiVersion",
            format!("unsupported version \"{}\"", config.api_version),
        ));
    }

    if let Err(e) = config.admin.validate() {
        errors.push(e);
    }
    if let Err(e) = config.auth.validate() {
        errors.push(e);
    }
    for listener in config.listeners.iter_mut() {
        if let Err(e) = listener.validate() {
            errors.push(e);
        }
    }
    for cluster in config.clusters.iter_mut() {
        if let Err(e) = cluster.validate() {
            errors.push(e);
        }
    }

    config.listeners.sort_by(|a, b| a.name.cmp(&b.name));
    config.clusters.sort_by(|a, b| a.name.cmp(&b.name));

    for pair in config.listeners.windows(2) {
        if pair[0].name == pair[1].name {
            errors.push(ValidationError::new(
                "listener",
                &pair[0].name,
                "name",
                "duplicate listener name",
            ));
        }
    }
    for pair in config.clusters.windows(2) {
        if pair[0].name == pair[1].name {
            errors.push(ValidationError::new(
                "cluster",
                &pair[0].name,
                "name",
                "duplicate cluster name",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
