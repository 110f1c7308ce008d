//! Listener object: one client-facing socket and its relay settings.
//!
//! # Responsibilities
//! - Hold the listener's protocol, bind address, relay port range and routes
//! - Tell the reconciler which changes need the socket re-created
//! - Bind and release the server socket through `Net`
//!
//! # Design Decisions
//! - Route changes are applied in place, the next permission check sees them
//! - Socket-level changes are recorded but only take effect after a restart
//! - The socket is bound outside the state lock; binding never holds it

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::config::{ListenerConfig, Protocol, SectionConfig};
use crate::net::connection::ConnectionTracker;
use crate::net::{Net, PacketConn};
use crate::object::{Object, ObjectError, ObjectKind, ReconcileOutcome};
use crate::observability::{Logger, LoggerFactory};

/// A bound server socket.
#[derive(Clone)]
pub enum ServerSocket {
    /// UDP and DTLS listeners.
    Packet(Arc<dyn PacketConn>),
    /// TCP and TLS listeners.
    Stream(Arc<TcpListener>),
}

impl ServerSocket {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            ServerSocket::Packet(conn) => conn.local_addr(),
            ServerSocket::Stream(listener) => listener.local_addr(),
        }
    }
}

impl std::fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ServerSocket::Packet(_) => "packet",
            ServerSocket::Stream(_) => "stream",
        };
        f.debug_struct("ServerSocket")
            .field("kind", &kind)
            .field("local_addr", &self.local_addr().ok())
            .finish()
    }
}

/// Status report of a listener.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,
    pub uri: String,
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    pub min_relay_port: u16,
    pub max_relay_port: u16,
    pub routes: Vec<String>,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_addr: Option<SocketAddr>,
    pub allocations: u64,
}

/// A client-facing listener.
pub struct Listener {
    name: String,
    config: ArcSwap<ListenerConfig>,
    net: Arc<dyn Net>,
    tracker: ConnectionTracker,
    socket: Mutex<Option<ServerSocket>>,
    log: Logger,
}

impl Listener {
    pub fn new(
        mut config: ListenerConfig,
        net: Arc<dyn Net>,
        logger: &LoggerFactory,
    ) -> Result<Self, ObjectError> {
        config.validate()?;
        let log = logger.logger(&format!("listener:{}", config.name));

        {
            let _scope = log.enter();
            tracing::info!(config = %config, "Listener created");
        }

        Ok(Self {
            name: config.name.clone(),
            tracker: ConnectionTracker::new(&config.name),
            config: ArcSwap::from_pointee(config),
            net,
            socket: Mutex::new(None),
            log,
        })
    }

    /// The current config, shared without copying.
    pub fn snapshot(&self) -> Arc<ListenerConfig> {
        self.config.load_full()
    }

    /// Cluster names this listener relays to.
    pub fn routes(&self) -> Vec<String> {
        self.config.load().routes.clone()
    }

    /// Address relay sockets are bound on.
    pub fn relay_address(&self) -> Result<IpAddr, ObjectError> {
        let config = self.config.load();
        config.address.parse().map_err(|_| ObjectError::InvalidState {
            kind: ObjectKind::Listener,
            name: self.name.clone(),
            reason: format!("\"{}\" is not an IP address", config.address),
        })
    }

    /// Inclusive relay port range.
    pub fn relay_port_range(&self) -> (u16, u16) {
        let config = self.config.load();
        (config.min_relay_port, config.max_relay_port)
    }

    /// TURN URI advertised to clients.
    pub fn uri(&self) -> String {
        let config = self.config.load();
        let host = config.public_address.as_deref().unwrap_or(&config.address);
        let port = config.public_port.unwrap_or(config.port);
        let host = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
            _ => host.to_string(),
        };
        let transport = match config.protocol {
            Protocol::Udp | Protocol::Dtls => "udp",
            Protocol::Tcp | Protocol::Tls => "tcp",
        };
        format!(
            "{}:{}:{}?transport={}",
            config.protocol.scheme(),
            host,
            port,
            transport
        )
    }

    /// Socket factory of this listener.
    pub fn net(&self) -> Arc<dyn Net> {
        Arc::clone(&self.net)
    }

    /// Relay connection counter of this listener.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// The bound server socket, if running.
    pub fn socket(&self) -> Option<ServerSocket> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Bind the server socket for the current config.
    pub async fn start(&self) -> Result<SocketAddr, ObjectError> {
        if let Some(socket) = self.socket() {
            return Ok(socket.local_addr()?);
        }

        let config = self.snapshot();
        let addr = SocketAddr::new(self.relay_address()?, config.port);
        let socket = if config.protocol.is_datagram() {
            ServerSocket::Packet(self.net.listen_packet(addr).await?)
        } else {
            ServerSocket::Stream(Arc::new(self.net.listen_stream(addr).await?))
        };
        let local = socket.local_addr()?;

        *self.socket.lock().unwrap_or_else(PoisonError::into_inner) = Some(socket);

        let _scope = self.log.enter();
        tracing::info!(uri = %self.uri(), local_addr = %local, "Listener started");
        Ok(local)
    }

    /// Release the server socket.
    pub fn stop(&self) {
        let released = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            let _scope = self.log.enter();
            tracing::info!("Listener stopped");
        }
    }
}

impl Object for Listener {
    type Config = ListenerConfig;
    type Status = ListenerStatus;

    const KIND: ObjectKind = ObjectKind::Listener;

    fn name(&self) -> &str {
        &self.name
    }

    fn reconcile(&self, config: &ListenerConfig) -> Result<ReconcileOutcome, ObjectError> {
        let _scope = self.log.enter();
        let mut next = config.clone();
        next.validate()?;

        if next.name != self.name {
            return Err(ObjectError::InvalidState {
                kind: ObjectKind::Listener,
                name: self.name.clone(),
                reason: format!("cannot rename to \"{}\"", next.name),
            });
        }

        let current = self.config.load_full();
        let restart = ListenerConfig::requires_restart(&current, &next);
        tracing::info!(old = %current, new = %next, restart, "Listener reconciled");

        self.config.store(Arc::new(next));
        if restart {
            Ok(ReconcileOutcome::RestartRequired)
        } else {
            Ok(ReconcileOutcome::Updated)
        }
    }

    fn config(&self) -> ListenerConfig {
        (**self.config.load()).clone()
    }

    fn close(&self) -> Result<(), ObjectError> {
        self.stop();
        let _scope = self.log.enter();
        tracing::info!("Listener closed");
        Ok(())
    }

    fn status(&self) -> ListenerStatus {
        let config = self.config.load();
        ListenerStatus {
            name: self.name.clone(),
            uri: self.uri(),
            protocol: config.protocol,
            address: config.address.clone(),
            port: config.port,
            min_relay_port: config.min_relay_port,
            max_relay_port: config.max_relay_port,
            routes: config.routes.clone(),
            running: self.is_running(),
            local_addr: self.socket().and_then(|s| s.local_addr().ok()),
            allocations: self.tracker.active_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use tokio::net::UdpSocket;

    use super::*;

    /// Binds every socket on an ephemeral loopback port.
    struct LoopbackNet;

    #[async_trait]
    impl Net for LoopbackNet {
        async fn listen_packet(&self, _addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>> {
            Ok(Arc::new(UdpSocket::bind("127.0.0.1:0").await?))
        }

        async fn listen_stream(&self, _addr: SocketAddr) -> io::Result<TcpListener> {
            TcpListener::bind("127.0.0.1:0").await
        }
    }

    fn config(name: &str) -> ListenerConfig {
        ListenerConfig {
            name: name.into(),
            address: "127.0.0.1".into(),
            routes: vec!["allow-any".into()],
            ..Default::default()
        }
    }

    fn listener(config: ListenerConfig) -> Listener {
        Listener::new(config, Arc::new(LoopbackNet), &LoggerFactory::detached("info")).unwrap()
    }

    #[test]
    fn test_routes_update_in_place() {
        let l = listener(config("udp"));
        let mut next = config("udp");
        next.routes = vec!["media".into(), "allow-any".into()];

        assert_eq!(l.reconcile(&next).unwrap(), ReconcileOutcome::Updated);
        assert_eq!(l.routes(), vec!["media".to_string(), "allow-any".to_string()]);
    }

    #[test]
    fn test_socket_changes_need_restart() {
        let l = listener(config("udp"));

        let mut port = config("udp");
        port.port = 3479;
        assert_eq!(l.reconcile(&port).unwrap(), ReconcileOutcome::RestartRequired);
        assert_eq!(l.config().port, 3479);

        let mut range = l.config();
        range.min_relay_port = 40000;
        range.max_relay_port = 40100;
        assert_eq!(l.reconcile(&range).unwrap(), ReconcileOutcome::RestartRequired);

        let same = l.config();
        assert_eq!(l.reconcile(&same).unwrap(), ReconcileOutcome::Updated);
    }

    #[test]
    fn test_invalid_update_keeps_state() {
        let l = listener(config("udp"));
        let mut bad = config("udp");
        bad.min_relay_port = 5000;
        bad.max_relay_port = 4000;

        assert!(matches!(l.reconcile(&bad), Err(ObjectError::Validation(_))));
        assert_eq!(l.relay_port_range(), (1 << 15, u16::MAX));

        let renamed = config("other");
        assert!(matches!(
            l.reconcile(&renamed),
            Err(ObjectError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_uri() {
        let mut c = config("tcp");
        c.protocol = Protocol::Tcp;
        c.public_address = Some("203.0.113.1".into());
        c.public_port = Some(443);
        assert_eq!(listener(c).uri(), "turn:203.0.113.1:443?transport=tcp");

        let mut c = config("v6");
        c.address = "::1".into();
        assert_eq!(listener(c).uri(), "turn:[::1]:3478?transport=udp");
    }

    #[tokio::test]
    async fn test_start_stop() {
        let l = listener(config("udp"));
        assert!(!l.is_running());

        let addr = l.start().await.unwrap();
        assert!(l.is_running());
        assert!(matches!(l.socket(), Some(ServerSocket::Packet(_))));
        assert_eq!(l.start().await.unwrap(), addr);
        assert_eq!(l.status().local_addr, Some(addr));

        l.close().unwrap();
        assert!(!l.is_running());

        let mut tcp = config("tcp");
        tcp.protocol = Protocol::Tcp;
        let l = listener(tcp);
        l.start().await.unwrap();
        assert!(matches!(l.socket(), Some(ServerSocket::Stream(_))));
        l.stop();
        assert!(l.socket().is_none());
    }
}
