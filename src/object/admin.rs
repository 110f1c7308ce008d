//! Admin object: instance name and runtime log level.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::{AdminConfig, SectionConfig, DEFAULT_ADMIN_NAME};
use crate::object::{Object, ObjectError, ObjectKind, ReconcileOutcome};
use crate::observability::{Logger, LoggerFactory};

/// Status report of the admin object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub name: String,
    pub log_level: String,
}

/// Holds the administrative settings and drives the log filter.
pub struct Admin {
    config: ArcSwap<AdminConfig>,
    logger: LoggerFactory,
    log: Logger,
}

impl Admin {
    /// Build the admin object and apply its log level.
    pub fn new(mut config: AdminConfig, logger: LoggerFactory) -> Result<Self, ObjectError> {
        config.validate()?;
        logger.set_level(&config.log_level)?;
        let log = logger.logger("admin");

        {
            let _scope = log.enter();
            tracing::info!(name = %config.name, log_level = %config.log_level, "Admin created");
        }

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            logger,
            log,
        })
    }

    /// Display name of the relay instance.
    pub fn instance_name(&self) -> String {
        self.config.load().name.clone()
    }
}

impl Object for Admin {
    type Config = AdminConfig;
    type Status = AdminStatus;

    const KIND: ObjectKind = ObjectKind::Admin;

    fn name(&self) -> &str {
        DEFAULT_ADMIN_NAME
    }

    fn reconcile(&self, config: &AdminConfig) -> Result<ReconcileOutcome, ObjectError> {
        let _scope = self.log.enter();
        let mut next = config.clone();
        next.validate()?;

        let current = self.config.load_full();
        if current.log_level != next.log_level {
            self.logger.set_level(&next.log_level)?;
        }
        tracing::info!(old = %current, new = %next, "Admin reconciled");

        self.config.store(Arc::new(next));
        Ok(ReconcileOutcome::Updated)
    }

    fn config(&self) -> AdminConfig {
        (**self.config.load()).clone()
    }

    fn close(&self) -> Result<(), ObjectError> {
        let _scope = self.log.enter();
        tracing::debug!("Admin closed");
        Ok(())
    }

    fn status(&self) -> AdminStatus {
        let config = self.config.load();
        AdminStatus {
            name: config.name.clone(),
            log_level: self.logger.level(),
        }
    }
}
