//! The relay control plane.
//!
//! # Data Flow
//! ```text
//! RelayConfig (file, watcher, embedder)
//!     → Relay::reconcile (reconcile.rs)
//!         Admin → Auth → Listener → Cluster managers
//!     → ReconcileReport: Applied | RestartRequired
//!     → caller runs Relay::restart() on RestartRequired
//!
//! Protocol engine callbacks (handlers.rs):
//!     AuthHandler::authenticate  → live Auth object
//!     PermissionHandler::permit  → live Listener routes → cache → clusters
//!     RelayAddressGenerator      → filtered relay sockets
//! ```
//!
//! # Design Decisions
//! - `Relay` is a cheap handle (Arc inside); callbacks hold a clone and
//!   fetch the live objects on every call
//! - Reconciliation passes are serialized by one lock
//! - Listener and cluster changes bump a routing epoch that invalidates
//!   every permission cache

pub mod handlers;
pub mod reconcile;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::{RelayConfig, ValidationError, API_VERSION};
use crate::manager::Manager;
use crate::net::relay::RelayAddressGenerator;
use crate::net::Net;
use crate::object::admin::AdminStatus;
use crate::object::auth::AuthStatus;
use crate::object::cluster::ClusterStatus;
use crate::object::listener::ListenerStatus;
use crate::object::{Admin, Auth, Cluster, Listener, Object, ObjectError, ObjectKind};
use crate::observability::LoggerFactory;
use crate::resolver::ResolverService;
use crate::routing::router::ClusterLookup;
use crate::routing::Epoch;

pub use handlers::{AuthHandler, PermissionHandler};
pub use reconcile::{ObjectRef, ReconcileReport, ReconcileStatus};

/// Error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
    #[error("failed to reconcile {kind}: {source}")]
    Reconcile {
        kind: ObjectKind,
        #[source]
        source: ObjectError,
    },
    #[error("listener \"{name}\" failed to start: {source}")]
    Start {
        name: String,
        #[source]
        source: ObjectError,
    },
    #[error("unknown listener \"{0}\"")]
    UnknownListener(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Status of the whole relay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub admin: Option<AdminStatus>,
    pub auth: Option<AuthStatus>,
    pub listeners: Vec<ListenerStatus>,
    pub clusters: Vec<ClusterStatus>,
    /// An auth policy exists and at least one listener is running.
    pub allocations_allowed: bool,
}

struct RelayInner {
    logger: LoggerFactory,
    net: Arc<dyn Net>,
    resolver: ResolverService,
    admin: Manager<Admin>,
    auth: Manager<Auth>,
    listeners: Manager<Listener>,
    clusters: Manager<Cluster>,
    routing_epoch: AtomicU64,
    reconcile_lock: Mutex<()>,
}

/// Handle to a relay's live objects.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    pub fn new(net: Arc<dyn Net>, resolver: ResolverService, logger: LoggerFactory) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                logger,
                net,
                resolver,
                admin: Manager::new(),
                auth: Manager::new(),
                listeners: Manager::new(),
                clusters: Manager::new(),
                routing_epoch: AtomicU64::new(0),
                reconcile_lock: Mutex::new(()),
            }),
        }
    }

    pub fn admin(&self) -> Option<Arc<Admin>> {
        self.inner.admin.objects().into_iter().next()
    }

    pub fn auth(&self) -> Option<Arc<Auth>> {
        self.inner.auth.objects().into_iter().next()
    }

    pub fn listener(&self, name: &str) -> Option<Arc<Listener>> {
        self.inner.listeners.get(name)
    }

    pub fn listeners(&self) -> Vec<Arc<Listener>> {
        self.inner.listeners.objects()
    }

    pub fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.inner.clusters.get(name)
    }

    pub fn clusters(&self) -> Vec<Arc<Cluster>> {
        self.inner.clusters.objects()
    }

    pub fn resolver(&self) -> &ResolverService {
        &self.inner.resolver
    }

    pub fn logger(&self) -> &LoggerFactory {
        &self.inner.logger
    }

    /// Version of the routing state, for permission caches.
    pub fn epoch(&self) -> Epoch {
        Epoch {
            routing: self.inner.routing_epoch.load(Ordering::SeqCst),
            resolver: self.inner.resolver.generation(),
        }
    }

    pub(crate) fn bump_routing_epoch(&self) {
        self.inner.routing_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Callback for the protocol engine's authentication requests.
    pub fn auth_handler(&self) -> AuthHandler {
        AuthHandler::new(self.clone())
    }

    /// Callback for the protocol engine's permission requests on `listener`.
    pub fn permission_handler(&self, listener: &str) -> PermissionHandler {
        PermissionHandler::new(self.clone(), listener)
    }

    /// Relay socket factory for `listener`, filtered by its routes.
    pub fn relay_address_generator(
        &self,
        listener: &str,
    ) -> Result<RelayAddressGenerator, RelayError> {
        let object = self
            .listener(listener)
            .ok_or_else(|| RelayError::UnknownListener(listener.to_string()))?;
        let address = object.relay_address().map_err(|source| RelayError::Start {
            name: listener.to_string(),
            source,
        })?;

        Ok(RelayAddressGenerator::new(
            listener,
            address,
            object.relay_port_range(),
            object.net(),
            Arc::new(self.permission_handler(listener)),
            object.tracker().clone(),
        ))
    }

    /// Bind every listener's server socket.
    pub async fn start(&self) -> Result<Vec<(String, SocketAddr)>, RelayError> {
        let mut bound = Vec::new();
        for listener in self.listeners() {
            let addr = listener.start().await.map_err(|source| RelayError::Start {
                name: listener.name().to_string(),
                source,
            })?;
            bound.push((listener.name().to_string(), addr));
        }
        if bound.is_empty() {
            tracing::warn!("Relay started without listeners");
        } else {
            tracing::info!(listeners = bound.len(), "Relay started");
        }
        Ok(bound)
    }

    /// Release every listener's server socket.
    pub fn stop(&self) {
        for listener in self.listeners() {
            listener.stop();
        }
        tracing::info!("Relay stopped");
    }

    /// Re-bind every listener, applying socket-level changes.
    pub async fn restart(&self) -> Result<Vec<(String, SocketAddr)>, RelayError> {
        tracing::info!("Restarting relay listeners");
        self.stop();
        self.start().await
    }

    /// Close every object; the relay is empty afterwards.
    pub fn close(&self) {
        let _guard = self
            .inner
            .reconcile_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.inner.clusters.close_all();
        self.inner.listeners.close_all();
        self.inner.auth.close_all();
        self.inner.admin.close_all();
        self.bump_routing_epoch();
        tracing::info!("Relay closed");
    }

    /// The configuration the live objects currently run with.
    pub fn running_config(&self) -> RelayConfig {
        RelayConfig {
            api_version: API_VERSION.to_string(),
            admin: self.admin().map(|a| a.config()).unwrap_or_default(),
            auth: self.auth().map(|a| a.config()).unwrap_or_default(),
            listeners: self.listeners().iter().map(|l| l.config()).collect(),
            clusters: self.clusters().iter().map(|c| c.config()).collect(),
        }
    }

    pub fn status(&self) -> RelayStatus {
        let listeners: Vec<ListenerStatus> =
            self.listeners().iter().map(|l| l.status()).collect();
        let auth = self.auth().map(|a| a.status());
        RelayStatus {
            admin: self.admin().map(|a| a.status()),
            allocations_allowed: auth.is_some() && listeners.iter().any(|l| l.running),
            auth,
            listeners,
            clusters: self.clusters().iter().map(|c| c.status()).collect(),
        }
    }
}

impl ClusterLookup for Relay {
    fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.inner.clusters.get(name)
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("listeners", &self.inner.listeners.names())
            .field("clusters", &self.inner.clusters.names())
            .field("epoch", &self.epoch())
            .finish()
    }
}
