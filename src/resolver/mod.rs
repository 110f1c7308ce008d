//! Background domain resolution for domain clusters.
//!
//! # Data Flow
//! ```text
//! Cluster (type: domain) registers its domain names
//!     → ResolverService keeps one address set per domain
//!     → run() polls every domain on a fixed interval (and right after a
//!       new registration) through the `Resolve` collaborator
//!     → fresh answers are swapped in atomically, failures keep the old set
//!
//! Packet path:
//!     Cluster::matches → ResolverService::lookup (lock-free load, never awaits)
//! ```
//!
//! # Design Decisions
//! - Stale-but-available: a failed lookup never empties an address set
//! - Registrations are reference counted, several clusters may share a domain
//! - Every change bumps a generation counter so permission caches can
//!   notice that routing changed underneath them

pub mod mock;

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use tokio::sync::{broadcast, Notify};
use tokio::time;

use crate::observability::metrics;

pub use mock::MockResolver;

/// Default polling interval of the background resolver.
pub const DEFAULT_RESOLVE_INTERVAL: Duration = Duration::from_secs(5);

/// Error type for name resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("failed to resolve \"{domain}\": {reason}")]
    Lookup { domain: String, reason: String },
}

/// Name resolution collaborator.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `domain` to its current addresses.
    async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>, ResolverError>;
}

/// `Resolve` backed by hickory's async resolver.
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    /// Resolver using the default upstream configuration.
    pub fn new() -> Self {
        let resolver = TokioResolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build();
        Self { resolver }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolve for DnsResolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>, ResolverError> {
        let lookup = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| ResolverError::Lookup {
                domain: domain.to_string(),
                reason: e.to_string(),
            })?;
        Ok(lookup.iter().collect())
    }
}

struct DomainEntry {
    refs: usize,
    addrs: Arc<ArcSwap<Vec<IpAddr>>>,
}

struct ResolverInner {
    resolver: Arc<dyn Resolve>,
    interval: Duration,
    domains: DashMap<String, DomainEntry>,
    generation: AtomicU64,
    wakeup: Notify,
}

/// Keeps the address sets of all registered domains fresh.
#[derive(Clone)]
pub struct ResolverService {
    inner: Arc<ResolverInner>,
}

impl ResolverService {
    pub fn new(resolver: Arc<dyn Resolve>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                resolver,
                interval,
                domains: DashMap::new(),
                generation: AtomicU64::new(0),
                wakeup: Notify::new(),
            }),
        }
    }

    /// Start tracking `domain`; the next refresh round picks it up.
    pub fn register(&self, domain: &str) {
        let mut fresh = false;
        self.inner
            .domains
            .entry(domain.to_string())
            .and_modify(|e| e.refs += 1)
            .or_insert_with(|| {
                fresh = true;
                DomainEntry {
                    refs: 1,
                    addrs: Arc::new(ArcSwap::from_pointee(Vec::new())),
                }
            });
        if fresh {
            tracing::debug!(domain = %domain, "Domain registered for resolution");
            self.inner.wakeup.notify_one();
        }
    }

    /// Stop tracking `domain` once every registration is gone.
    pub fn unregister(&self, domain: &str) {
        let removed = self
            .inner
            .domains
            .remove_if_mut(domain, |_, entry| {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            })
            .is_some();
        if removed {
            tracing::debug!(domain = %domain, "Domain unregistered");
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Latest known addresses of `domain` (empty if unknown or never resolved).
    pub fn lookup(&self, domain: &str) -> Arc<Vec<IpAddr>> {
        self.inner
            .domains
            .get(domain)
            .map(|entry| entry.addrs.load_full())
            .unwrap_or_default()
    }

    /// Registered domains.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .inner
            .domains
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        domains.sort();
        domains
    }

    /// Counter bumped whenever any address set changes.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Resolve every registered domain once.
    pub async fn refresh(&self) {
        for domain in self.domains() {
            let result = self.inner.resolver.resolve(&domain).await;
            metrics::record_dns_resolution(result.is_ok());

            let mut addrs = match result {
                Ok(addrs) => addrs,
                Err(e) => {
                    tracing::warn!(domain = %domain, error = %e, "Resolution failed, keeping previous addresses");
                    continue;
                }
            };
            addrs.sort();
            addrs.dedup();

            let Some(slot) = self
                .inner
                .domains
                .get(&domain)
                .map(|entry| Arc::clone(&entry.addrs))
            else {
                continue;
            };
            if **slot.load() != addrs {
                tracing::debug!(domain = %domain, addresses = ?addrs, "Resolved addresses changed");
                slot.store(Arc::new(addrs));
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Refresh loop; runs until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.inner.interval, "Domain resolver starting");
        let mut ticker = time::interval(self.inner.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh().await,
                _ = self.inner.wakeup.notified() => self.refresh().await,
                _ = shutdown.recv() => {
                    tracing::info!("Domain resolver received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for ResolverService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverService")
            .field("interval", &self.inner.interval)
            .field("domains", &self.domains())
            .field("generation", &self.generation())
            .finish()
    }
}
