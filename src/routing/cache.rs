//! Permission cache.
//!
//! Remembers which cluster last routed a peer address so the per-packet
//! check skips the route scan. Only the cluster name is stored; the live
//! cluster is fetched on every hit, so a deleted cluster simply turns the
//! hit into a miss.
//!
//! Entries are only valid for the routing state they were computed under.
//! The caller passes the current [`Epoch`]; any change clears the cache.

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use lru::LruCache;

use crate::object::Object;
use crate::routing::router::{self, ClusterLookup};

/// Number of peer addresses remembered per listener.
pub const PERMISSION_CACHE_SIZE: usize = 512;

/// Version of the routing state a cached decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Epoch {
    /// Bumped whenever listeners or clusters change.
    pub routing: u64,
    /// Bumped whenever a resolved address set changes.
    pub resolver: u64,
}

struct CacheState {
    epoch: Epoch,
    entries: LruCache<String, String>,
}

/// LRU map from peer address to the name of the cluster that routed it.
pub struct PermissionCache {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PermissionCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                epoch: Epoch::default(),
                entries: LruCache::new(cap),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Admission decision for `ip`:`port`, identical to a fresh route scan.
    pub fn check<L>(&self, clusters: &L, routes: &[String], ip: IpAddr, port: u16, epoch: Epoch) -> bool
    where
        L: ClusterLookup + ?Sized,
    {
        let key = ip.to_canonical().to_string();
        let cached = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.epoch != epoch {
                tracing::trace!(old = ?state.epoch, new = ?epoch, "Routing changed, clearing permission cache");
                state.entries.clear();
                state.epoch = epoch;
            }
            state.entries.get(&key).cloned()
        };

        if let Some(cluster) = cached.and_then(|name| clusters.cluster(&name)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cluster.matches(ip, port);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let Some(cluster) = router::route(clusters, routes, ip) else {
            return false;
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.epoch == epoch {
            state.entries.put(key, cluster.name().to_string());
        }
        drop(state);

        cluster.matches(ip, port)
    }

    /// Number of cached addresses.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(PERMISSION_CACHE_SIZE)
    }
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hits, misses) = self.stats();
        f.debug_struct("PermissionCache")
            .field("len", &self.len())
            .field("hits", &hits)
            .field("misses", &misses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::ClusterConfig;
    use crate::manager::Manager;
    use crate::object::{Cluster, Object};
    use crate::observability::LoggerFactory;
    use crate::resolver::{MockResolver, ResolverService};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn cluster_config(name: &str, endpoints: &[&str]) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    fn setup(specs: &[(&str, &[&str])]) -> Manager<Cluster> {
        let resolver = ResolverService::new(Arc::new(MockResolver::new()), Duration::from_secs(60));
        let logger = LoggerFactory::detached("info");
        let manager = Manager::new();
        for (name, endpoints) in specs {
            manager
                .insert(Cluster::new(cluster_config(name, endpoints), resolver.clone(), &logger).unwrap())
                .unwrap();
        }
        manager
    }

    #[test]
    fn test_hit_equals_fresh_scan() {
        let manager = setup(&[("a", &["10.0.0.0/8:<100-200>"]), ("b", &["0.0.0.0/0"])]);
        let routes = vec!["a".to_string(), "b".to_string()];
        let cache = PermissionCache::default();
        let epoch = Epoch::default();

        let peers = [
            (ip("10.1.1.1"), 150),
            (ip("10.1.1.1"), 300),
            (ip("192.0.2.7"), 9),
            (ip("10.1.1.1"), 0),
        ];
        for _ in 0..2 {
            for (peer, port) in peers {
                assert_eq!(
                    cache.check(&manager, &routes, peer, port, epoch),
                    router::admit(&manager, &routes, peer, port)
                );
            }
        }
        assert_eq!(cache.len(), 2);
        let (hits, _) = cache.stats();
        assert!(hits >= 5);
    }

    #[test]
    fn test_epoch_change_clears() {
        let manager = setup(&[("any", &["0.0.0.0/0"])]);
        let routes = vec!["any".to_string()];
        let cache = PermissionCache::default();

        let first = Epoch::default();
        assert!(cache.check(&manager, &routes, ip("1.1.1.2"), 1, first));
        assert_eq!(cache.len(), 1);

        manager
            .get("any")
            .unwrap()
            .reconcile(&cluster_config("any", &["1.1.1.1", "2.2.2.2/8"]))
            .unwrap();
        let next = Epoch {
            routing: 1,
            ..first
        };
        assert!(!cache.check(&manager, &routes, ip("1.1.1.2"), 1, next));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_mapped_peer_shares_entry() {
        let manager = setup(&[("any", &["0.0.0.0/0:<1-1024>"])]);
        let routes = vec!["any".to_string()];
        let cache = PermissionCache::default();
        let epoch = Epoch::default();

        assert!(cache.check(&manager, &routes, ip("1.1.1.1"), 80, epoch));
        assert!(cache.check(&manager, &routes, ip("::ffff:1.1.1.1"), 80, epoch));
        assert!(!cache.check(&manager, &routes, ip("::ffff:1.1.1.1"), 5000, epoch));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_deleted_cluster_is_a_miss() {
        let manager = setup(&[("gone", &["192.0.2.0/24"])]);
        let routes = vec!["gone".to_string()];
        let cache = PermissionCache::default();
        let epoch = Epoch::default();

        assert!(cache.check(&manager, &routes, ip("192.0.2.1"), 5, epoch));
        manager.reconcile(&[]).unwrap();
        assert!(!cache.check(&manager, &routes, ip("192.0.2.1"), 5, epoch));
    }

    #[test]
    fn test_capacity_bounded() {
        let manager = setup(&[("any", &["0.0.0.0/0"])]);
        let routes = vec!["any".to_string()];
        let cache = PermissionCache::new(4);
        for i in 0..10u8 {
            cache.check(&manager, &routes, IpAddr::from([10, 0, 0, i]), 1, Epoch::default());
        }
        assert_eq!(cache.len(), 4);
    }
}
