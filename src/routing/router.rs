//! Cluster routing.
//!
//! # Responsibilities
//! - Find the cluster a listener reaches a peer address through
//! - Decide admission of a peer address and port
//!
//! # Design Decisions
//! - The listener's route list is scanned in order; the first cluster that
//!   contains the address wins, even if a later one would allow the port
//! - Route names without a live cluster are skipped, never an error
//! - No match means deny

use std::net::IpAddr;
use std::sync::Arc;

use crate::manager::Manager;
use crate::object::Cluster;

/// Source of live clusters by name.
pub trait ClusterLookup {
    fn cluster(&self, name: &str) -> Option<Arc<Cluster>>;
}

impl ClusterLookup for Manager<Cluster> {
    fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.get(name)
    }
}

/// The first cluster in `routes` that contains `ip`.
pub fn route<L>(clusters: &L, routes: &[String], ip: IpAddr) -> Option<Arc<Cluster>>
where
    L: ClusterLookup + ?Sized,
{
    routes
        .iter()
        .filter_map(|name| clusters.cluster(name))
        .find(|cluster| cluster.contains(ip))
}

/// Full admission decision for `ip`:`port` over `routes`.
pub fn admit<L>(clusters: &L, routes: &[String], ip: IpAddr, port: u16) -> bool
where
    L: ClusterLookup + ?Sized,
{
    match route(clusters, routes, ip) {
        Some(cluster) => cluster.matches(ip, port),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ClusterConfig;
    use crate::object::Object;
    use crate::observability::LoggerFactory;
    use crate::resolver::{MockResolver, ResolverService};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn clusters(specs: &[(&str, &[&str])]) -> Manager<Cluster> {
        let resolver = ResolverService::new(Arc::new(MockResolver::new()), Duration::from_secs(60));
        let logger = LoggerFactory::detached("info");
        let manager = Manager::new();
        for (name, endpoints) in specs {
            let config = ClusterConfig {
                name: name.to_string(),
                endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
                ..Default::default()
            };
            manager
                .insert(Cluster::new(config, resolver.clone(), &logger).unwrap())
                .unwrap();
        }
        manager
    }

    fn routes(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_first_containing_cluster_decides() {
        let manager = clusters(&[
            ("narrow", &["10.0.0.0/8:<1000-2000>"]),
            ("wide", &["0.0.0.0/0"]),
        ]);
        let r = routes(&["narrow", "wide"]);

        assert_eq!(route(&manager, &r, ip("10.1.1.1")).unwrap().name(), "narrow");
        assert!(admit(&manager, &r, ip("10.1.1.1"), 1500));
        assert!(!admit(&manager, &r, ip("10.1.1.1"), 3000));
        assert!(admit(&manager, &r, ip("192.0.2.1"), 3000));
    }

    #[test]
    fn test_unknown_routes_and_no_match_deny() {
        let manager = clusters(&[("media", &["192.0.2.0/24"])]);

        assert!(!admit(&manager, &routes(&["missing"]), ip("192.0.2.1"), 1));
        assert!(admit(&manager, &routes(&["missing", "media"]), ip("192.0.2.1"), 1));
        assert!(!admit(&manager, &routes(&["media"]), ip("198.51.100.1"), 1));
        assert!(!admit(&manager, &[], ip("192.0.2.1"), 1));
    }
}
