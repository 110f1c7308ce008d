//! Runtime objects.
//!
//! # Data Flow
//! ```text
//! configuration section (AdminConfig, AuthConfig, ListenerConfig, ClusterConfig)
//!     → kind-specific factory (Admin::new, Auth::new, Listener::new, Cluster::new)
//!     → live object, owned by its Manager behind an Arc
//!     → reconcile(new section) mutates it in place
//!     → close() when the section disappears
//! ```
//!
//! # Design Decisions
//! - Four structs behind one `Object` trait, no hierarchy
//! - Restart policy is data (`ObjectKind::policy`), not per-kind control flow
//! - Object state is swapped copy-on-write (`ArcSwap`) so the packet path
//!   reads it without locking while reconciliation replaces it

pub mod admin;
pub mod auth;
pub mod cluster;
pub mod listener;

use std::fmt;

use serde::Serialize;

use crate::config::{SectionConfig, ValidationError};
use crate::net::tls::TlsError;
use crate::observability::LogError;

pub use admin::Admin;
pub use auth::Auth;
pub use cluster::Cluster;
pub use listener::Listener;

/// The four kinds of runtime objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Admin,
    Auth,
    Listener,
    Cluster,
}

/// Whether creating or deleting an object of a kind needs a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub on_create: bool,
    pub on_delete: bool,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Admin => "admin",
            ObjectKind::Auth => "auth",
            ObjectKind::Listener => "listener",
            ObjectKind::Cluster => "cluster",
        }
    }

    /// Only listeners own sockets, so only they force a restart when they
    /// come or go.
    pub fn policy(&self) -> RestartPolicy {
        match self {
            ObjectKind::Listener => RestartPolicy {
                on_create: true,
                on_delete: true,
            },
            ObjectKind::Admin | ObjectKind::Auth | ObjectKind::Cluster => RestartPolicy {
                on_create: false,
                on_delete: false,
            },
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a new config to a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The change was applied in place.
    Updated,
    /// The change was recorded but only takes effect once the caller
    /// re-creates the underlying sockets.
    RestartRequired,
}

/// Error type for object construction and reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} \"{name}\": {reason}")]
    InvalidState {
        kind: ObjectKind,
        name: String,
        reason: String,
    },
    #[error("{kind} \"{name}\" already exists")]
    Duplicate { kind: ObjectKind, name: String },
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uniform contract of the runtime objects.
pub trait Object: Send + Sync + 'static {
    /// Configuration section this object is built from.
    type Config: SectionConfig;

    /// Serializable status report.
    type Status: Serialize + fmt::Debug + Clone;

    const KIND: ObjectKind;

    /// Identity key; equals the `config_name()` of the section.
    fn name(&self) -> &str;

    /// Apply a new (validated) section to the live object.
    fn reconcile(&self, config: &Self::Config) -> Result<ReconcileOutcome, ObjectError>;

    /// The last-applied section.
    fn config(&self) -> Self::Config;

    /// Release every resource held by the object.
    fn close(&self) -> Result<(), ObjectError>;

    /// Current status.
    fn status(&self) -> Self::Status;
}
