//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (scoped, structured log events; runtime level)
//!     → metrics.rs (counters, gauges through the metrics facade)
//!     → ratelimit.rs (gates per-packet log events)
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing, sink chosen by the binary
//! - Admin reconciliation changes the log level without a restart
//! - Data-plane denials never flood the log

pub mod logging;
pub mod metrics;
pub mod ratelimit;

pub use logging::{LogError, Logger, LoggerFactory};
