//! `ServerHub::request_all` fans out to every connected client
//! concurrently and aggregates per-identifier outcomes, never failing as a
//! whole (spec.md §8, fan-out scenario).

use std::sync::Arc;

use zonis::client::ClientSessionBuilder;
use zonis::server::{OverridePolicy, ServerConfig, ServerHub};
use zonis::handler_fn;
use zonis_test_util::spawn_client;

#[tokio::test]
async fn request_all_collects_every_connected_client_reply() {
    let hub = Arc::new(ServerHub::new(ServerConfig::new(
        OverridePolicy::RejectUnknownOverride,
    )));

    for i in 0..4 {
        let builder = ClientSessionBuilder::new("mock://unused")
            .identifier(format!("client-{i}"))
            .route("ping", handler_fn(move |_arguments| async move {
                Ok(serde_json::json!(format!("pong-{i}")))
            }));
        spawn_client(Arc::clone(&hub), builder).await.unwrap();
    }

    let results = hub.request_all("ping", serde_json::Map::new()).await;
    assert_eq!(results.len(), 4);
    for i in 0..4 {
        let identifier = format!("client-{i}");
        let value = results.get(&identifier).unwrap().as_ref().unwrap();
        assert_eq!(*value, serde_json::json!(format!("pong-{i}")));
    }
}

#[tokio::test]
async fn request_all_with_no_clients_returns_an_empty_map() {
    let hub = ServerHub::new(ServerConfig::new(OverridePolicy::RejectUnknownOverride));
    let results = hub.request_all("ping", serde_json::Map::new()).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn request_all_keeps_the_keyset_even_when_one_client_has_no_matching_route() {
    let hub = Arc::new(ServerHub::new(ServerConfig::new(
        OverridePolicy::RejectUnknownOverride,
    )));

    let ok_builder = ClientSessionBuilder::new("mock://unused")
        .identifier("ok")
        .route("ping", handler_fn(|_arguments| async { Ok(serde_json::json!("pong")) }));
    spawn_client(Arc::clone(&hub), ok_builder).await.unwrap();

    let broken_builder = ClientSessionBuilder::new("mock://unused").identifier("broken");
    spawn_client(Arc::clone(&hub), broken_builder).await.unwrap();

    let results = hub.request_all("ping", serde_json::Map::new()).await;
    assert_eq!(results.len(), 2);
    assert!(results.get("ok").unwrap().is_ok());
    assert!(results.get("broken").unwrap().is_err());
}
