//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listener bring-up:
//!     Relay::start
//!     → Net::listen_packet / Net::listen_stream (socket factory)
//!     → bound sockets handed to the protocol engine
//!
//! Relay allocation:
//!     protocol engine asks relay.rs for a relay socket
//!     → random port in the listener's relay range via Net
//!     → wrapped in the permission filter (routing::filter)
//!     → connection.rs tracks it until dropped
//! ```
//!
//! # Design Decisions
//! - The core never creates raw sockets itself; everything goes through `Net`
//! - `PacketConn` is object-safe so filters can decorate any transport
//! - TLS material is validated here, TLS itself is the protocol engine's job

pub mod connection;
pub mod relay;
pub mod tls;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, UdpSocket};

/// A datagram socket, as used for listener and relay transports.
#[async_trait]
pub trait PacketConn: Send + Sync {
    /// Receive one datagram, returning its length and source.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to `target`.
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Local address the socket is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl PacketConn for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Socket factory consumed by listeners and relay address generators.
#[async_trait]
pub trait Net: Send + Sync {
    /// Bind a datagram socket.
    async fn listen_packet(&self, addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>>;

    /// Bind a stream listener.
    async fn listen_stream(&self, addr: SocketAddr) -> io::Result<TcpListener>;
}

/// `Net` backed by the operating system's sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNet;

#[async_trait]
impl Net for SystemNet {
    async fn listen_packet(&self, addr: SocketAddr) -> io::Result<Arc<dyn PacketConn>> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Arc::new(socket))
    }

    async fn listen_stream(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }
}
