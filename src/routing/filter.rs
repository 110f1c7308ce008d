//! Relay connection filter.
//!
//! Wraps a relay `PacketConn` so every datagram in either direction passes
//! the listener's admission check:
//! - `send_to` a denied peer fails with `PermissionDenied`
//! - datagrams from a denied peer are dropped and the read continues

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::net::connection::ConnectionGuard;
use crate::net::PacketConn;

/// Admission check consulted for every relayed datagram.
pub trait PeerFilter: Send + Sync {
    fn permit(&self, peer: SocketAddr) -> bool;
}

/// Error reported to the protocol engine for a denied write.
pub fn denied(peer: SocketAddr) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("peer {} administratively prohibited", peer),
    )
}

/// A relay socket that only talks to admitted peers.
pub struct FilteredConn {
    inner: Arc<dyn PacketConn>,
    filter: Arc<dyn PeerFilter>,
    _guard: Option<ConnectionGuard>,
}

impl FilteredConn {
    pub fn new(inner: Arc<dyn PacketConn>, filter: Arc<dyn PeerFilter>) -> Self {
        Self {
            inner,
            filter,
            _guard: None,
        }
    }

    /// Keep `guard` alive for as long as the connection is.
    pub fn tracked(mut self, guard: ConnectionGuard) -> Self {
        self._guard = Some(guard);
        self
    }
}

#[async_trait]
impl PacketConn for FilteredConn {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let (n, peer) = self.inner.recv_from(buf).await?;
            if self.filter.permit(peer) {
                return Ok((n, peer));
            }
            tracing::trace!(peer = %peer, bytes = n, "Dropped datagram from denied peer");
        }
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        if !self.filter.permit(target) {
            return Err(denied(target));
        }
        self.inner.send_to(buf, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
