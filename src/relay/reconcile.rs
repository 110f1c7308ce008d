//! Reconciliation orchestrator.
//!
//! Validates the whole document, then runs the four managers in a fixed
//! order: Admin, Auth, Listener, Cluster. Each stage builds the objects its
//! manager could not find through the kind's factory. The first hard error
//! ends the pass and earlier stages keep their changes.

use std::fmt;
use std::sync::{Arc, PoisonError};

use serde::Serialize;

use crate::config::{RelayConfig, SectionConfig};
use crate::manager::Manager;
use crate::object::{Admin, Auth, Cluster, Listener, Object, ObjectError, ObjectKind};
use crate::observability::metrics;
use crate::relay::{Relay, RelayError, RelayInner};

/// Overall outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileStatus {
    /// Everything was applied to the running relay.
    #[default]
    Applied,
    /// Listener sockets must be re-created for the new config to take effect.
    RestartRequired,
}

/// A kind-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectRef {
    fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub status: ReconcileStatus,
    /// The admin or auth singleton was created for the first time.
    pub initial: bool,
    pub created: Vec<ObjectRef>,
    pub updated: Vec<ObjectRef>,
    pub deleted: Vec<ObjectRef>,
}

impl ReconcileReport {
    pub fn restart_required(&self) -> bool {
        self.status == ReconcileStatus::RestartRequired
    }

    /// True if the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

impl Relay {
    /// Bring the live objects in line with `config`.
    pub fn reconcile(&self, mut config: RelayConfig) -> Result<ReconcileReport, RelayError> {
        let _guard = self
            .inner
            .reconcile_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Err(errors) = config.validate() {
            metrics::record_reconcile("invalid");
            for e in &errors {
                tracing::warn!(error = %e, "Rejected configuration");
            }
            return Err(RelayError::Validation(errors));
        }

        let result = self.run_stages(&config);
        match &result {
            Ok(report) if report.restart_required() => {
                metrics::record_reconcile("restart");
                tracing::info!(
                    created = report.created.len(),
                    updated = report.updated.len(),
                    deleted = report.deleted.len(),
                    "Reconciliation finished, restart required"
                );
            }
            Ok(report) => {
                metrics::record_reconcile("applied");
                tracing::info!(
                    created = report.created.len(),
                    updated = report.updated.len(),
                    deleted = report.deleted.len(),
                    initial = report.initial,
                    "Reconciliation finished"
                );
            }
            Err(e) => {
                metrics::record_reconcile("error");
                tracing::error!(error = %e, "Reconciliation failed");
            }
        }
        result
    }

    fn run_stages(&self, config: &RelayConfig) -> Result<ReconcileReport, RelayError> {
        let inner = Arc::clone(&self.inner);
        let mut report = ReconcileReport::default();
        let mut restart = false;

        restart |= stage(
            &inner.admin,
            std::slice::from_ref(&config.admin),
            &mut report,
            |conf| Admin::new(conf, inner.logger.clone()),
        )?;

        restart |= stage(
            &inner.auth,
            std::slice::from_ref(&config.auth),
            &mut report,
            |conf| Auth::new(conf, &inner.logger),
        )?;

        let before = report.clone();
        let routing = routing_stages(&inner, config, &mut report);
        if routing.is_err() || report != before {
            self.bump_routing_epoch();
        }
        restart |= routing?;

        report.status = if restart {
            ReconcileStatus::RestartRequired
        } else {
            ReconcileStatus::Applied
        };
        Ok(report)
    }
}

/// Listener and cluster stages; both feed the routing state.
fn routing_stages(
    inner: &RelayInner,
    config: &RelayConfig,
    report: &mut ReconcileReport,
) -> Result<bool, RelayError> {
    let mut restart = stage(&inner.listeners, &config.listeners, report, |conf| {
        Listener::new(conf, Arc::clone(&inner.net), &inner.logger)
    })?;
    if inner.listeners.is_empty()
        && report.deleted.iter().any(|r| r.kind == ObjectKind::Listener)
    {
        tracing::warn!("No listeners left, the relay will not accept clients");
    }

    restart |= stage(&inner.clusters, &config.clusters, report, |conf| {
        Cluster::new(conf, inner.resolver.clone(), &inner.logger)
    })?;
    Ok(restart)
}

/// Run one manager and build what it asks for. Returns the stage's restart flag.
fn stage<O, F>(
    manager: &Manager<O>,
    desired: &[O::Config],
    report: &mut ReconcileReport,
    build: F,
) -> Result<bool, RelayError>
where
    O: Object,
    F: Fn(O::Config) -> Result<O, ObjectError>,
{
    let kind = O::KIND;
    let fail = |source: ObjectError| RelayError::Reconcile { kind, source };

    let result = manager.reconcile(desired).map_err(fail)?;
    let mut restart = result.restart;

    report
        .updated
        .extend(result.updated.iter().map(|name| ObjectRef::new(kind, name)));
    report
        .deleted
        .extend(result.deleted.iter().map(|name| ObjectRef::new(kind, name)));

    for config in result.create {
        let name = config.config_name();
        let object = build(config).map_err(fail)?;
        manager.insert(object).map_err(fail)?;

        if matches!(kind, ObjectKind::Admin | ObjectKind::Auth) {
            report.initial = true;
        }
        restart |= kind.policy().on_create;
        tracing::info!(kind = %kind, name = %name, "Object created");
        report.created.push(ObjectRef::new(kind, name));
    }

    Ok(restart)
}
