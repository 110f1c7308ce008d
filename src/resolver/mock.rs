//! In-memory resolver for tests and offline setups.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::resolver::{Resolve, ResolverError};

/// A `Resolve` implementation answering from a static table.
#[derive(Debug, Default)]
pub struct MockResolver {
    records: RwLock<HashMap<String, Vec<IpAddr>>>,
    failing: AtomicBool,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer for `domain`.
    pub fn insert(&self, domain: &str, addrs: Vec<IpAddr>) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain.to_string(), addrs);
    }

    /// Forget `domain`; later lookups fail.
    pub fn remove(&self, domain: &str) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(domain);
    }

    /// Make every lookup fail, as during an upstream DNS outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Resolve for MockResolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>, ResolverError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResolverError::Lookup {
                domain: domain.to_string(),
                reason: "resolver unavailable".to_string(),
            });
        }
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .cloned()
            .ok_or_else(|| ResolverError::Lookup {
                domain: domain.to_string(),
                reason: "no such domain".to_string(),
            })
    }
}
