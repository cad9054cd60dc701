//! A second `identify` presenting the correct `override_key` evicts the
//! first session — cancelling its in-flight server-initiated requests with
//! `TransportClosed` — and installs the new one under the same identifier
//! (spec.md §8, override scenario; §9's eviction resolution).

use std::sync::Arc;
use std::time::Duration;

use zonis::client::ClientSessionBuilder;
use zonis::server::{OverridePolicy, ServerConfig, ServerHub};
use zonis::{handler_fn, ZonisError};
use zonis_test_util::spawn_client;

#[tokio::test]
async fn matching_override_key_evicts_the_old_session_and_fails_its_pending_request() {
    let hub = Arc::new(ServerHub::new(
        ServerConfig::new(OverridePolicy::RejectUnknownOverride).with_secret_key("shared", "s3cr3t"),
    ));

    // The first session registers a route that replies well after the
    // override lands, so its in-flight request is still open in the hub's
    // pending registry at eviction time.
    let client_a = spawn_client(
        Arc::clone(&hub),
        ClientSessionBuilder::new("mock://unused")
            .identifier("shared")
            .route("slow", handler_fn(|_arguments| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(serde_json::json!("too late"))
            })),
    )
    .await
    .unwrap();
    assert_eq!(client_a.identifier(), "shared");

    let hub_for_request = Arc::clone(&hub);
    let pending_request =
        tokio::spawn(async move { hub_for_request.request("slow", serde_json::Map::new(), Some("shared")).await });

    // Give the request a moment to register itself before the override.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client_b = spawn_client(
        Arc::clone(&hub),
        ClientSessionBuilder::new("mock://unused")
            .identifier("shared")
            .override_key("s3cr3t"),
    )
    .await
    .unwrap();

    let outcome = pending_request.await.unwrap();
    assert!(matches!(outcome, Err(ZonisError::TransportClosed)));

    assert!(client_b.is_running());
    assert_eq!(hub.connected_identifiers().await, vec!["shared".to_owned()]);
}
