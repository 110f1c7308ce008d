mod common;

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use relay_plane::routing::router;
use relay_plane::RelayError;

use common::*;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_port_ranges_and_route_order() {
    let t = test_relay();
    let mut config = allow_any_config();
    config.clusters = vec![
        static_cluster("a-media", &["10.0.0.0/8:<10000-20000>"]),
        static_cluster("b-any", &["0.0.0.0/0"]),
    ];
    config.listeners[0].routes = vec!["a-media".into(), "b-any".into()];
    t.relay.reconcile(config).unwrap();

    let handler = t.relay.permission_handler("udp");
    assert!(handler.permit(peer("10.1.2.3:15000")));
    // The first cluster containing the address decides, even if a later one
    // would allow the port.
    assert!(!handler.permit(peer("10.1.2.3:25000")));
    assert!(handler.permit(peer("192.0.2.1:25000")));
}

#[test]
fn test_cached_decision_matches_fresh_scan() {
    let t = test_relay();
    let mut config = allow_any_config();
    config.clusters = vec![
        static_cluster("allow-any", &["0.0.0.0/0:<1-1024>"]),
        static_cluster("media", &["192.0.2.0/24"]),
    ];
    config.listeners[0].routes = vec!["media".into(), "allow-any".into()];
    t.relay.reconcile(config).unwrap();

    let handler = t.relay.permission_handler("udp");
    let routes = t.relay.listener("udp").unwrap().routes();
    let peers = [
        "192.0.2.1:5000",
        "192.0.2.1:80",
        "198.51.100.1:80",
        "198.51.100.1:5000",
        "192.0.2.1:0",
    ];
    for _ in 0..3 {
        for p in peers {
            let p = peer(p);
            assert_eq!(
                handler.permit(p),
                router::admit(&t.relay, &routes, p.ip(), p.port()),
                "peer {}",
                p
            );
        }
    }
}

#[tokio::test]
async fn test_domain_cluster_follows_resolution() {
    let t = test_relay();
    t.dns.insert("media.example.org", vec![ip("192.0.2.10")]);
    let mut config = allow_any_config();
    config.clusters = vec![domain_cluster("media", &["media.example.org:<3000-4000>"])];
    config.listeners[0].routes = vec!["media".into()];
    t.relay.reconcile(config).unwrap();

    let handler = t.relay.permission_handler("udp");
    assert!(!handler.permit(peer("192.0.2.10:3500")));

    t.resolver.refresh().await;
    assert!(handler.permit(peer("192.0.2.10:3500")));
    assert!(!handler.permit(peer("192.0.2.10:5000")));

    t.dns.insert("media.example.org", vec![ip("192.0.2.20")]);
    t.resolver.refresh().await;
    assert!(!handler.permit(peer("192.0.2.10:3500")));
    assert!(handler.permit(peer("192.0.2.20:3500")));

    t.dns.set_failing(true);
    t.resolver.refresh().await;
    assert!(handler.permit(peer("192.0.2.20:3500")));
}

#[test]
fn test_ipv4_mapped_peers_admitted_like_ipv4() {
    let t = test_relay();
    t.relay.reconcile(allow_any_config()).unwrap();
    let handler = t.relay.permission_handler("udp");

    assert!(handler.permit(peer("1.1.1.1:5000")));
    assert!(handler.permit(peer("[::ffff:1.1.1.1]:5000")));
    assert!(handler.permit(peer("[::ffff:3.0.0.0]:5000")));
    // Native IPv6 peers stay outside an IPv4-only cluster.
    assert!(!handler.permit(peer("[2001:db8::1]:5000")));
}

#[test]
fn test_unknown_listener() {
    let t = test_relay();
    t.relay.reconcile(allow_any_config()).unwrap();

    assert!(!t.relay.permission_handler("tcp").permit(peer("1.1.1.1:1")));
    assert!(matches!(
        t.relay.relay_address_generator("tcp"),
        Err(RelayError::UnknownListener(_))
    ));
}

#[tokio::test]
async fn test_relay_socket_filters_traffic() {
    let t = test_relay();
    let mut config = allow_any_config();
    config.listeners[0].min_relay_port = 50000;
    config.listeners[0].max_relay_port = 50100;
    config.clusters[0].endpoints = vec!["127.0.0.1".into()];
    t.relay.reconcile(config).unwrap();

    let generator = t.relay.relay_address_generator("udp").unwrap();
    assert_eq!(generator.port_range(), (50000, 50100));
    let (relay_conn, relay_addr) = generator.allocate().await.unwrap();
    let requested = t.net.requested();
    assert!((50000..=50100).contains(&requested[0].port()));

    let listener = t.relay.listener("udp").unwrap();
    assert_eq!(listener.tracker().active_count(), 1);

    let allowed = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let allowed_addr = allowed.local_addr().unwrap();
    relay_conn.send_to(b"to-peer", allowed_addr).await.unwrap();
    let mut buf = [0u8; 32];
    let (n, _) = allowed.recv_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"to-peer");

    let err = relay_conn
        .send_to(b"x", peer("198.51.100.1:3478"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

    allowed.send_to(b"from-peer", relay_addr).await.unwrap();
    let (n, from) = timeout(Duration::from_secs(2), relay_conn.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"from-peer");
    assert_eq!(from, allowed_addr);

    // Revoking the cluster applies to relay sockets already allocated.
    let mut config = allow_any_config();
    config.listeners[0].min_relay_port = 50000;
    config.listeners[0].max_relay_port = 50100;
    config.clusters[0].endpoints = vec!["203.0.113.0/24".into()];
    t.relay.reconcile(config).unwrap();
    let err = relay_conn.send_to(b"x", allowed_addr).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

    drop(relay_conn);
    assert_eq!(listener.tracker().active_count(), 0);
}
