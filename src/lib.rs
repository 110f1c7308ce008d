//! STUN/TURN relay control plane.
//!
//! Turns a declarative configuration (admin settings, an authentication
//! policy, listeners and upstream clusters) into live, continuously
//! reconcilable relay objects, and decides which clients may authenticate
//! and which peers each listener may relay traffic to.

// Declarative configuration
pub mod config;

// Runtime objects and their reconciliation
pub mod manager;
pub mod object;
pub mod relay;

// Admission and credentials
pub mod auth;
pub mod resolver;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::RelayConfig;
pub use lifecycle::Shutdown;
pub use relay::{ReconcileReport, ReconcileStatus, Relay, RelayError};
