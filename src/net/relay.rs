//! Relay socket allocation.
//!
//! # Responsibilities
//! - Bind relay sockets on a random port inside a listener's relay range
//! - Wrap every relay socket in the listener's peer filter
//! - Track live relay sockets per listener
//!
//! # Design Decisions
//! - Ports are drawn at random; a taken port is retried a bounded number of times
//! - Only "address in use" is retried, any other bind error is returned as is

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::net::connection::ConnectionTracker;
use crate::net::{Net, PacketConn};
use crate::routing::filter::{FilteredConn, PeerFilter};

/// Bind attempts per allocation before giving up.
pub const MAX_ALLOCATION_RETRIES: usize = 10;

/// Hands out filtered relay sockets for one listener.
pub struct RelayAddressGenerator {
    listener: String,
    address: IpAddr,
    min_port: u16,
    max_port: u16,
    net: Arc<dyn Net>,
    filter: Arc<dyn PeerFilter>,
    tracker: ConnectionTracker,
}

impl RelayAddressGenerator {
    pub fn new(
        listener: &str,
        address: IpAddr,
        port_range: (u16, u16),
        net: Arc<dyn Net>,
        filter: Arc<dyn PeerFilter>,
        tracker: ConnectionTracker,
    ) -> Self {
        Self {
            listener: listener.to_string(),
            address,
            min_port: port_range.0,
            max_port: port_range.1,
            net,
            filter,
            tracker,
        }
    }

    /// Address relay sockets are bound on.
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Inclusive port range relay sockets are bound in.
    pub fn port_range(&self) -> (u16, u16) {
        (self.min_port, self.max_port)
    }

    /// Bind a new relay socket.
    pub async fn allocate(&self) -> io::Result<(Arc<dyn PacketConn>, SocketAddr)> {
        if self.min_port == 0 || self.min_port > self.max_port {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid relay port range {}-{}", self.min_port, self.max_port),
            ));
        }

        let mut last_err = None;
        for attempt in 1..=MAX_ALLOCATION_RETRIES {
            let port = fastrand::u16(self.min_port..=self.max_port);
            let addr = SocketAddr::new(self.address, port);

            match self.net.listen_packet(addr).await {
                Ok(conn) => {
                    let relayed = conn.local_addr()?;
                    let guard = self.tracker.track();
                    tracing::debug!(
                        listener = %self.listener,
                        relay_addr = %relayed,
                        connection_id = %guard.id(),
                        attempt,
                        "Relay socket allocated"
                    );
                    let filtered = FilteredConn::new(conn, Arc::clone(&self.filter)).tracked(guard);
                    return Ok((Arc::new(filtered), relayed));
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    tracing::trace!(listener = %self.listener, port, attempt, "Relay port taken, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(listener = %self.listener, attempts = MAX_ALLOCATION_RETRIES, "Relay allocation failed");
        Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrInUse)))
    }
}

impl std::fmt::Debug for RelayAddressGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayAddressGenerator")
            .field("listener", &self.listener)
            .field("address", &self.address)
            .field("min_port", &self.min_port)
            .field("max_port", &self.max_port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::net::TcpListener;

    use super::*;
    use crate::net::SystemNet;

    struct AllowAll;

    impl PeerFilter for AllowAll {
        fn permit(&self, _peer: SocketAddr) -> bool {
            true
        }
    }

    /// Every port is taken.
    #[derive(Default)]
    struct BusyNet {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Net for BusyNet {
        async fn listen_packet(&self, _addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::from(io::ErrorKind::AddrInUse))
        }

        async fn listen_stream(&self, _addr: SocketAddr) -> io::Result<TcpListener> {
            Err(io::Error::from(io::ErrorKind::AddrInUse))
        }
    }

    fn generator(net: Arc<dyn Net>, range: (u16, u16), tracker: ConnectionTracker) -> RelayAddressGenerator {
        RelayAddressGenerator::new(
            "udp",
            "127.0.0.1".parse().unwrap(),
            range,
            net,
            Arc::new(AllowAll),
            tracker,
        )
    }

    #[tokio::test]
    async fn test_allocates_inside_range() {
        let tracker = ConnectionTracker::new("udp");
        let gen = generator(Arc::new(SystemNet), (40000, 60000), tracker.clone());

        let (conn, addr) = gen.allocate().await.unwrap();
        assert!((40000..=60000).contains(&addr.port()));
        assert_eq!(conn.local_addr().unwrap(), addr);
        assert_eq!(tracker.active_count(), 1);

        drop(conn);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let net = Arc::new(BusyNet::default());
        let gen = generator(net.clone(), (40000, 40010), ConnectionTracker::new("udp"));

        let Err(err) = gen.allocate().await else {
            panic!("allocation should fail when every port is taken");
        };
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        assert_eq!(net.attempts.load(Ordering::SeqCst), MAX_ALLOCATION_RETRIES);
    }

    #[tokio::test]
    async fn test_rejects_empty_range() {
        let gen = generator(Arc::new(SystemNet), (5000, 4000), ConnectionTracker::new("udp"));
        let Err(err) = gen.allocate().await else {
            panic!("allocation should fail for an empty range");
        };
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
