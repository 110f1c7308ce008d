//! Configuration schema definitions.
//!
//! This module defines the declarative relay configuration. All types derive
//! Serde traits for deserialization from YAML, JSON or TOML documents. The
//! semantic checks and defaulting live in `validation.rs`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::validation::ValidationError;

/// Supported configuration API version.
pub const API_VERSION: &str = "v1";

/// Identity key of the (singleton) admin section.
pub const DEFAULT_ADMIN_NAME: &str = "default-admin";

/// Identity key of the (singleton) auth section.
pub const DEFAULT_AUTH_NAME: &str = "default-auth";

/// Common contract of every configuration section.
///
/// `validate` checks and defaults the section in place and must be
/// idempotent. Set-like lists (endpoints) are sorted and ordered lists
/// (routes) only deduplicated, so `PartialEq` on two validated sections is a
/// structural comparison.
pub trait SectionConfig:
    Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Check and normalize the section.
    fn validate(&mut self) -> Result<(), ValidationError>;

    /// Identity key of the section.
    fn config_name(&self) -> String;
}

/// Root configuration of the relay.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    /// Configuration API version (must be `v1`).
    pub api_version: String,

    /// Administrative settings.
    pub admin: AdminConfig,

    /// Authentication policy.
    pub auth: AuthConfig,

    /// Listening sockets.
    pub listeners: Vec<ListenerConfig>,

    /// Upstream clusters.
    pub clusters: Vec<ClusterConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            admin: AdminConfig::default(),
            auth: AuthConfig::default(),
            listeners: Vec::new(),
            clusters: Vec::new(),
        }
    }
}

/// Administrative settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminConfig {
    /// Display name of the relay instance.
    pub name: String,

    /// Log filter directives (e.g. `info` or `info,relay_plane::routing=debug`).
    pub log_level: String,
}

impl fmt::Display for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "admin:{{name=\"{}\",logLevel=\"{}\"}}", self.name, self.log_level)
    }
}

/// Authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// A single fixed username/password pair.
    #[default]
    #[serde(alias = "plaintext")]
    Static,
    /// Time-windowed credentials derived from a shared secret.
    #[serde(alias = "longterm", alias = "timewindowed")]
    Ephemeral,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Static => f.write_str("static"),
            AuthType::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

/// Authentication policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    /// Credential type.
    #[serde(rename = "type")]
    pub auth_type: AuthType,

    /// Authentication realm.
    pub realm: String,

    /// `username`/`password` for static auth, `secret` for ephemeral auth.
    pub credentials: BTreeMap<String, String>,
}

impl AuthConfig {
    /// Static username, if configured.
    pub fn username(&self) -> Option<&str> {
        self.credentials.get("username").map(String::as_str)
    }

    /// Static password, if configured.
    pub fn password(&self) -> Option<&str> {
        self.credentials.get("password").map(String::as_str)
    }

    /// Shared secret for ephemeral credentials, if configured.
    pub fn secret(&self) -> Option<&str> {
        self.credentials.get("secret").map(String::as_str)
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.auth_type {
            AuthType::Static => write!(
                f,
                "auth:{{type=static,realm=\"{}\",username=\"{}\",password=<SECRET>}}",
                self.realm,
                self.username().unwrap_or_default()
            ),
            AuthType::Ephemeral => write!(
                f,
                "auth:{{type=ephemeral,realm=\"{}\",secret=<SECRET>}}",
                self.realm
            ),
        }
    }
}

/// Transport protocol of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
    Tls,
    Dtls,
}

impl Protocol {
    /// Whether the listener terminates TLS/DTLS and needs a certificate.
    pub fn is_secure(&self) -> bool {
        matches!(self, Protocol::Tls | Protocol::Dtls)
    }

    /// Whether the listener is datagram-based.
    pub fn is_datagram(&self) -> bool {
        matches!(self, Protocol::Udp | Protocol::Dtls)
    }

    /// URI scheme advertised to clients for this protocol.
    pub fn scheme(&self) -> &'static str {
        if self.is_secure() {
            "turns"
        } else {
            "turn"
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
            Protocol::Tls => "tls",
            Protocol::Dtls => "dtls",
        };
        f.write_str(s)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerConfig {
    /// Unique listener name.
    pub name: String,

    /// Transport protocol.
    pub protocol: Protocol,

    /// Bind address (IP literal).
    pub address: String,

    /// Bind port.
    pub port: u16,

    /// Address advertised to clients, if different from the bind address.
    pub public_address: Option<String>,

    /// Port advertised to clients, if different from the bind port.
    pub public_port: Option<u16>,

    /// Lowest relay port handed out to allocations.
    pub min_relay_port: u16,

    /// Highest relay port handed out to allocations.
    pub max_relay_port: u16,

    /// Base64-encoded PEM certificate (TLS/DTLS only).
    pub cert: Option<String>,

    /// Base64-encoded PEM private key (TLS/DTLS only).
    pub key: Option<String>,

    /// Names of the clusters this listener may relay to, in priority order.
    pub routes: Vec<String>,
}

impl ListenerConfig {
    /// Whether moving from `old` to `new` requires re-binding the listener.
    ///
    /// Routes and advertised addresses are applied in place.
    pub fn requires_restart(old: &Self, new: &Self) -> bool {
        old.protocol != new.protocol
            || old.address != new.address
            || old.port != new.port
            || old.min_relay_port != new.min_relay_port
            || old.max_relay_port != new.max_relay_port
            || old.cert != new.cert
            || old.key != new.key
    }
}

impl fmt::Display for ListenerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\":{{{}://{}:{}<{}:{}>,routes:[{}]}}",
            self.name,
            self.protocol,
            self.address,
            self.port,
            self.min_relay_port,
            self.max_relay_port,
            self.routes.join(",")
        )
    }
}

/// How cluster endpoints are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    /// Endpoints are IP addresses or prefixes.
    #[default]
    Static,
    /// Endpoints are domain names resolved in the background.
    #[serde(alias = "strictdns")]
    Domain,
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterType::Static => f.write_str("static"),
            ClusterType::Domain => f.write_str("domain"),
        }
    }
}

/// Cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Unique cluster name.
    pub name: String,

    /// Endpoint interpretation.
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,

    /// `addr`, `cidr` or `domain`, each with an optional `:<min-max>` port range.
    pub endpoints: Vec<String>,
}

impl fmt::Display for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\":{{type=\"{}\",endpoints=[{}]}}",
            self.name,
            self.cluster_type,
            self.endpoints.join(",")
        )
    }
}
