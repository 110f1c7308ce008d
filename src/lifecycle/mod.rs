//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Reconcile → Start resolver → Bind listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → background tasks exit → relay closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then objects, then listeners
//! - Ordered shutdown: stop background tasks, release sockets, close objects

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{SignalEvent, Signals};
