//! Protocol engine callbacks.
//!
//! Both handlers keep a `Relay` handle and look up the live objects on
//! every call, so a reconciliation is visible to the very next request.

use std::net::SocketAddr;
use std::time::SystemTime;

use crate::auth::AuthKey;
use crate::observability::metrics;
use crate::observability::ratelimit::LogGate;
use crate::relay::Relay;
use crate::routing::cache::PermissionCache;
use crate::routing::filter::PeerFilter;

/// Answers the protocol engine's authentication requests.
#[derive(Debug, Clone)]
pub struct AuthHandler {
    relay: Relay,
}

impl AuthHandler {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }

    /// Key for `username` in `realm`, or `None` to reject the request.
    pub fn authenticate(&self, username: &str, realm: &str, peer: SocketAddr) -> Option<AuthKey> {
        let Some(auth) = self.relay.auth() else {
            tracing::warn!(peer = %peer, "Authentication requested but no auth policy is configured");
            metrics::record_auth("unavailable");
            return None;
        };
        auth.authenticate(username, realm, Some(peer), SystemTime::now())
            .ok()
    }
}

/// Admission check for the peers of one listener.
pub struct PermissionHandler {
    relay: Relay,
    listener: String,
    cache: PermissionCache,
    denials: LogGate,
}

impl PermissionHandler {
    pub fn new(relay: Relay, listener: &str) -> Self {
        Self {
            relay,
            listener: listener.to_string(),
            cache: PermissionCache::default(),
            denials: LogGate::default(),
        }
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    /// Whether the listener may relay to `peer`.
    pub fn permit(&self, peer: SocketAddr) -> bool {
        let allowed = match self.relay.listener(&self.listener) {
            Some(listener) => {
                // Epoch first: a pass landing in between only makes the entry stale.
                let epoch = self.relay.epoch();
                let config = listener.snapshot();
                self.cache
                    .check(&self.relay, &config.routes, peer.ip(), peer.port(), epoch)
            }
            None => false,
        };

        metrics::record_permission_check(&self.listener, allowed);
        if allowed {
            tracing::trace!(listener = %self.listener, peer = %peer, "Peer permitted");
        } else if let Some(suppressed) = self.denials.allow() {
            tracing::info!(listener = %self.listener, peer = %peer, suppressed, "Peer denied");
        }
        allowed
    }
}

impl PeerFilter for PermissionHandler {
    fn permit(&self, peer: SocketAddr) -> bool {
        PermissionHandler::permit(self, peer)
    }
}

impl std::fmt::Debug for PermissionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionHandler")
            .field("listener", &self.listener)
            .field("cache", &self.cache)
            .finish()
    }
}
