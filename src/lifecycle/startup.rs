//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the relay from a validated configuration
//! - Start the background resolver
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::Net;
use crate::observability::LoggerFactory;
use crate::relay::{Relay, RelayError};
use crate::resolver::ResolverService;

/// A running relay plus its background tasks.
pub struct Runtime {
    pub relay: Relay,
    pub resolver_task: JoinHandle<()>,
}

/// Reconcile `config` into a fresh relay, start resolving and bind listeners.
pub async fn start(
    config: RelayConfig,
    net: Arc<dyn Net>,
    resolver: ResolverService,
    logger: LoggerFactory,
    shutdown: &Shutdown,
) -> Result<Runtime, RelayError> {
    let relay = Relay::new(net, resolver.clone(), logger);
    let report = relay.reconcile(config)?;
    tracing::info!(
        created = report.created.len(),
        status = ?report.status,
        "Initial configuration applied"
    );

    let resolver_task = tokio::spawn(resolver.run(shutdown.subscribe()));
    if let Err(e) = relay.start().await {
        shutdown.trigger();
        relay.close();
        return Err(e);
    }

    Ok(Runtime {
        relay,
        resolver_task,
    })
}
