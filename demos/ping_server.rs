//! Demonstration server: hosts a [`zonis::server::ServerHub`] behind one
//! axum WebSocket route and exposes a `ping` route clients can call.
//!
//! Configured the way `services/server/src/main.rs` configures its own
//! axum server: a single `BIND_ADDR` environment variable with a literal
//! fallback, no flag parser needed for one setting. `tracing_subscriber`
//! with `EnvFilter` read from `RUST_LOG`.

use std::env;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tracing_subscriber::EnvFilter;

use zonis::server::{axum_ws, OverridePolicy, ServerConfig, ServerHub};
use zonis::{handler_fn, RouteTable};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:9876".to_owned());

    let routes = RouteTable::new().route(
        "ping",
        handler_fn(|_arguments| async { Ok(serde_json::json!("pong")) }),
    );
    let hub = Arc::new(ServerHub::new(
        ServerConfig::new(OverridePolicy::RejectUnknownOverride).with_routes(routes),
    ));

    let app = Router::new()
        .route("/ws", get(axum_ws::upgrade))
        .with_state(hub);

    tracing::info!(%bind_addr, "starting zonis ping server");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
