//! Cluster object: a named set of peers a listener may relay to.
//!
//! # Responsibilities
//! - Hold the parsed endpoints of a static or domain cluster
//! - Register domain endpoints with the background resolver
//! - Decide whether a peer address (and port) belongs to the cluster
//!
//! # Design Decisions
//! - Parsed endpoints are swapped in as one immutable set
//! - New domains are registered before stale ones are released, so a shared
//!   domain never drops out of the resolver during an update
//! - Resolved addresses are read from the resolver on every check and never
//!   copied into the config

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::{ClusterConfig, ClusterType, SectionConfig};
use crate::object::{Object, ObjectError, ObjectKind, ReconcileOutcome};
use crate::observability::{Logger, LoggerFactory};
use crate::resolver::ResolverService;
use crate::routing::endpoint::{DomainEndpoint, Endpoint};

/// Parsed view of a cluster config.
#[derive(Debug)]
struct ClusterState {
    config: ClusterConfig,
    endpoints: Vec<Endpoint>,
    domains: Vec<DomainEndpoint>,
}

impl ClusterState {
    fn build(name: &str, config: ClusterConfig) -> Result<Self, ObjectError> {
        let mut endpoints = Vec::new();
        let mut domains = Vec::new();

        for spec in &config.endpoints {
            let parsed = match config.cluster_type {
                ClusterType::Static => Endpoint::parse(spec).map(|e| endpoints.push(e)),
                ClusterType::Domain => DomainEndpoint::parse(spec).map(|d| domains.push(d)),
            };
            parsed.map_err(|e| ObjectError::InvalidState {
                kind: ObjectKind::Cluster,
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            config,
            endpoints,
            domains,
        })
    }

    fn domain_names(&self) -> BTreeSet<String> {
        self.domains.iter().map(|d| d.domain.clone()).collect()
    }
}

/// Status report of a cluster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub endpoints: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub resolved: BTreeMap<String, Vec<IpAddr>>,
}

/// An upstream cluster.
pub struct Cluster {
    name: String,
    state: ArcSwap<ClusterState>,
    resolver: ResolverService,
    log: Logger,
}

impl Cluster {
    pub fn new(
        mut config: ClusterConfig,
        resolver: ResolverService,
        logger: &LoggerFactory,
    ) -> Result<Self, ObjectError> {
        config.validate()?;
        let name = config.name.clone();
        let state = ClusterState::build(&name, config)?;
        let log = logger.logger(&format!("cluster:{}", name));

        for domain in state.domain_names() {
            resolver.register(&domain);
        }

        {
            let _scope = log.enter();
            tracing::info!(config = %state.config, "Cluster created");
        }

        Ok(Self {
            name,
            state: ArcSwap::from_pointee(state),
            resolver,
            log,
        })
    }

    pub fn cluster_type(&self) -> ClusterType {
        self.state.load().config.cluster_type
    }

    /// True if `ip` belongs to the cluster, regardless of port.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.matches(ip, 0)
    }

    /// True if `ip` belongs to the cluster and `port` is 0 or allowed by
    /// one of the endpoints covering `ip`.
    pub fn matches(&self, ip: IpAddr, port: u16) -> bool {
        let state = self.state.load();
        match state.config.cluster_type {
            ClusterType::Static => state.endpoints.iter().any(|e| e.matches(ip, port)),
            ClusterType::Domain => state.domains.iter().any(|d| {
                let resolved = self.resolver.lookup(&d.domain);
                d.matches(&resolved, ip, port)
            }),
        }
    }
}

impl Object for Cluster {
    type Config = ClusterConfig;
    type Status = ClusterStatus;

    const KIND: ObjectKind = ObjectKind::Cluster;

    fn name(&self) -> &str {
        &self.name
    }

    fn reconcile(&self, config: &ClusterConfig) -> Result<ReconcileOutcome, ObjectError> {
        let _scope = self.log.enter();
        let mut next = config.clone();
        next.validate()?;

        if next.name != self.name {
            return Err(ObjectError::InvalidState {
                kind: ObjectKind::Cluster,
                name: self.name.clone(),
                reason: format!("cannot rename to \"{}\"", next.name),
            });
        }

        let next = ClusterState::build(&self.name, next)?;
        let current = self.state.load_full();
        let (old_domains, new_domains) = (current.domain_names(), next.domain_names());

        for domain in new_domains.difference(&old_domains) {
            self.resolver.register(domain);
        }
        tracing::info!(old = %current.config, new = %next.config, "Cluster reconciled");
        self.state.store(Arc::new(next));
        for domain in old_domains.difference(&new_domains) {
            self.resolver.unregister(domain);
        }

        Ok(ReconcileOutcome::Updated)
    }

    fn config(&self) -> ClusterConfig {
        self.state.load().config.clone()
    }

    fn close(&self) -> Result<(), ObjectError> {
        let _scope = self.log.enter();
        for domain in self.state.load().domain_names() {
            self.resolver.unregister(&domain);
        }
        tracing::info!("Cluster closed");
        Ok(())
    }

    fn status(&self) -> ClusterStatus {
        let state = self.state.load();
        let resolved = state
            .domains
            .iter()
            .map(|d| (d.domain.clone(), (*self.resolver.lookup(&d.domain)).clone()))
            .collect();
        ClusterStatus {
            name: self.name.clone(),
            cluster_type: state.config.cluster_type,
            endpoints: state.config.endpoints.clone(),
            resolved,
        }
    }
}
