mod common;

use std::time::{Duration, SystemTime};

use relay_plane::auth::credentials::{ephemeral_credentials, generate_auth_key};

use common::*;

#[test]
fn test_static_credentials() {
    let t = test_relay();
    t.relay.reconcile(allow_any_config()).unwrap();
    let handler = t.relay.auth_handler();
    let client = peer("192.0.2.1:40000");

    assert_eq!(
        handler.authenticate("user1", "example.org", client),
        Some(generate_auth_key("user1", "example.org", "passwd1"))
    );
    assert_eq!(handler.authenticate("user2", "example.org", client), None);
}

#[test]
fn test_handler_sees_reconciled_policy() {
    let t = test_relay();
    t.relay.reconcile(allow_any_config()).unwrap();
    let handler = t.relay.auth_handler();
    let client = peer("192.0.2.1:40000");

    let mut config = allow_any_config();
    config.auth = ephemeral_auth("my-secret");
    t.relay.reconcile(config).unwrap();

    assert_eq!(handler.authenticate("user1", "example.org", client), None);

    let creds = ephemeral_credentials(
        "alice",
        Duration::from_secs(600),
        "my-secret",
        SystemTime::now(),
    )
    .unwrap();
    assert_eq!(
        handler.authenticate(&creds.username, "example.org", client),
        Some(generate_auth_key(&creds.username, "example.org", &creds.password))
    );

    let expired = ephemeral_credentials(
        "alice",
        Duration::from_secs(600),
        "my-secret",
        SystemTime::now() - Duration::from_secs(3600),
    )
    .unwrap();
    assert_eq!(handler.authenticate(&expired.username, "example.org", client), None);
}

#[test]
fn test_no_policy_rejects() {
    let t = test_relay();
    let handler = t.relay.auth_handler();
    assert_eq!(
        handler.authenticate("user1", "example.org", peer("192.0.2.1:1")),
        None
    );
}
