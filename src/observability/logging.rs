//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Hand out scoped loggers to runtime objects
//! - Change the log filter at runtime (driven by the Admin object)
//!
//! # Design Decisions
//! - The filter sits behind a `reload` layer so reconciliation can change it
//! - `RUST_LOG`, when set, pins the filter; Admin level changes are recorded only
//! - A detached factory (tests, embedding) records the level but owns no subscriber

use std::sync::{Arc, PoisonError, RwLock};

use tracing::span::Entered;
use tracing::Span;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Error type for logging setup.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid log filter \"{directives}\": {reason}")]
    Filter { directives: String, reason: String },
    #[error("failed to reload log filter: {0}")]
    Reload(String),
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

fn parse_filter(directives: &str) -> Result<EnvFilter, LogError> {
    EnvFilter::try_new(directives).map_err(|e| LogError::Filter {
        directives: directives.to_string(),
        reason: e.to_string(),
    })
}

struct LoggerInner {
    handle: Option<FilterHandle>,
    level: RwLock<String>,
    /// The active filter came from `RUST_LOG` and is never replaced.
    pinned: bool,
}

/// Creates scoped loggers and owns the runtime log level.
#[derive(Clone)]
pub struct LoggerFactory {
    inner: Arc<LoggerInner>,
}

impl LoggerFactory {
    /// Install the global subscriber with `level` as the initial filter.
    pub fn init(level: &str) -> Result<Self, LogError> {
        let (filter, pinned) = match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, true),
            Err(_) => (parse_filter(level)?, false),
        };
        let (filter_layer, handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        Ok(Self::with_handle(Some(handle), level, pinned))
    }

    fn with_handle(handle: Option<FilterHandle>, level: &str, pinned: bool) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                handle,
                level: RwLock::new(level.to_string()),
                pinned,
            }),
        }
    }

    /// A factory that does not control any subscriber.
    pub fn detached(level: &str) -> Self {
        Self::with_handle(None, level, false)
    }

    /// Currently configured filter directives.
    pub fn level(&self) -> String {
        self.inner
            .level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active filter, unless `RUST_LOG` pinned it at startup.
    ///
    /// The directives are recorded either way.
    pub fn set_level(&self, directives: &str) -> Result<(), LogError> {
        let filter = parse_filter(directives)?;
        if self.inner.pinned {
            tracing::debug!(level = %directives, "RUST_LOG is set, keeping the active filter");
        } else if let Some(handle) = &self.inner.handle {
            handle
                .reload(filter)
                .map_err(|e| LogError::Reload(e.to_string()))?;
        }
        *self
            .inner
            .level
            .write()
            .unwrap_or_else(PoisonError::into_inner) = directives.to_string();
        tracing::debug!(level = %directives, "Log level updated");
        Ok(())
    }

    /// A logger scoped to one component (e.g. `listener:udp`).
    pub fn logger(&self, scope: &str) -> Logger {
        Logger {
            span: tracing::info_span!("relay", scope = %scope),
        }
    }
}

impl std::fmt::Debug for LoggerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerFactory")
            .field("level", &self.level())
            .field("controls_subscriber", &self.inner.handle.is_some())
            .field("pinned", &self.inner.pinned)
            .finish()
    }
}

/// A scoped logger; events emitted while it is entered carry its scope.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// The span carrying this logger's scope.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the scope for the lifetime of the returned guard.
    pub fn enter(&self) -> Entered<'_> {
        self.span.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_level_changes() {
        let factory = LoggerFactory::detached("info");
        assert_eq!(factory.level(), "info");

        factory.set_level("debug,relay_plane::routing=trace").unwrap();
        assert_eq!(factory.level(), "debug,relay_plane::routing=trace");

        assert!(matches!(
            factory.set_level("relay_plane=loud"),
            Err(LogError::Filter { .. })
        ));
        assert_eq!(factory.level(), "debug,relay_plane::routing=trace");
    }

    fn reloadable(initial: &str) -> (reload::Layer<EnvFilter, Registry>, FilterHandle) {
        reload::Layer::new(EnvFilter::new(initial))
    }

    #[test]
    fn test_set_level_reloads_filter() {
        let (_layer, handle) = reloadable("info");
        let factory = LoggerFactory::with_handle(Some(handle.clone()), "info", false);

        factory.set_level("debug").unwrap();
        let current = handle.with_current(|f| f.to_string()).unwrap();
        assert!(current.contains("debug"), "{}", current);
        assert!(!current.contains("info"), "{}", current);
    }

    #[test]
    fn test_env_filter_survives_set_level() {
        let (_layer, handle) = reloadable("warn,relay_plane=trace");
        let factory = LoggerFactory::with_handle(Some(handle.clone()), "info", true);

        factory.set_level("debug").unwrap();
        assert_eq!(factory.level(), "debug");
        let current = handle.with_current(|f| f.to_string()).unwrap();
        assert!(current.contains("relay_plane=trace"), "{}", current);
        assert!(!current.contains("debug"), "{}", current);
    }

    #[test]
    fn test_logger_scope() {
        let factory = LoggerFactory::detached("info");
        let logger = factory.logger("cluster:media");
        let _guard = logger.enter();
        tracing::info!("inside scope");
    }
}
