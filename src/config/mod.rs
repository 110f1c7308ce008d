//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/JSON/TOML)
//!     → loader.rs (env expansion, parse & deserialize)
//!     → validation.rs (semantic checks, defaults, normalization)
//!     → RelayConfig (validated)
//!     → Relay::reconcile
//!
//! On reload:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the daemon, which reconciles the live objects
//! ```
//!
//! # Design Decisions
//! - Every section knows its identity key (`config_name`)
//! - Validation normalizes sections so equality is structural; route order
//!   is significant and kept
//! - An invalid reload never reaches the reconciler

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, AuthConfig, AuthType, ClusterConfig, ClusterType, ListenerConfig, Protocol,
    RelayConfig, SectionConfig, API_VERSION, DEFAULT_ADMIN_NAME, DEFAULT_AUTH_NAME,
};
pub use validation::ValidationError;
