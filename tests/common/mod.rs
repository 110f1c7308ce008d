//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, UdpSocket};

use relay_plane::config::{
    AuthConfig, AuthType, ClusterConfig, ClusterType, ListenerConfig, RelayConfig,
};
use relay_plane::net::{Net, PacketConn};
use relay_plane::observability::LoggerFactory;
use relay_plane::resolver::{MockResolver, ResolverService};
use relay_plane::Relay;

/// `Net` that binds every socket on an ephemeral loopback port and records
/// the addresses it was asked for.
#[derive(Default)]
pub struct LoopbackNet {
    requested: Mutex<Vec<SocketAddr>>,
}

impl LoopbackNet {
    pub fn requested(&self) -> Vec<SocketAddr> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Net for LoopbackNet {
    async fn listen_packet(&self, addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>> {
        self.requested.lock().unwrap().push(addr);
        Ok(Arc::new(UdpSocket::bind("127.0.0.1:0").await?))
    }

    async fn listen_stream(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        self.requested.lock().unwrap().push(addr);
        TcpListener::bind("127.0.0.1:0").await
    }
}

/// A relay wired to loopback sockets and an in-memory resolver.
pub struct TestRelay {
    pub relay: Relay,
    pub net: Arc<LoopbackNet>,
    pub dns: Arc<MockResolver>,
    pub resolver: ResolverService,
}

pub fn test_relay() -> TestRelay {
    let net = Arc::new(LoopbackNet::default());
    let dns = Arc::new(MockResolver::new());
    let resolver = ResolverService::new(dns.clone(), Duration::from_secs(3600));
    let relay = Relay::new(net.clone(), resolver.clone(), LoggerFactory::detached("info"));
    TestRelay {
        relay,
        net,
        dns,
        resolver,
    }
}

pub fn static_auth(username: &str, password: &str) -> AuthConfig {
    let mut auth = AuthConfig {
        auth_type: AuthType::Static,
        realm: "example.org".into(),
        ..Default::default()
    };
    auth.credentials.insert("username".into(), username.into());
    auth.credentials.insert("password".into(), password.into());
    auth
}

pub fn ephemeral_auth(secret: &str) -> AuthConfig {
    let mut auth = AuthConfig {
        auth_type: AuthType::Ephemeral,
        realm: "example.org".into(),
        ..Default::default()
    };
    auth.credentials.insert("secret".into(), secret.into());
    auth
}

pub fn udp_listener(name: &str, routes: &[&str]) -> ListenerConfig {
    ListenerConfig {
        name: name.into(),
        address: "127.0.0.1".into(),
        port: 3478,
        routes: routes.iter().map(|r| r.to_string()).collect(),
        ..Default::default()
    }
}

pub fn static_cluster(name: &str, endpoints: &[&str]) -> ClusterConfig {
    ClusterConfig {
        name: name.into(),
        cluster_type: ClusterType::Static,
        endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
    }
}

pub fn domain_cluster(name: &str, endpoints: &[&str]) -> ClusterConfig {
    ClusterConfig {
        cluster_type: ClusterType::Domain,
        ..static_cluster(name, endpoints)
    }
}

/// One UDP listener routed to an `allow-any` cluster covering every IPv4 peer.
pub fn allow_any_config() -> RelayConfig {
    RelayConfig {
        auth: static_auth("user1", "passwd1"),
        listeners: vec![udp_listener("udp", &["allow-any"])],
        clusters: vec![static_cluster("allow-any", &["0.0.0.0/0"])],
        ..Default::default()
    }
}

pub fn peer(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}
