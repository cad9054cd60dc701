//! Demonstration client: connects to a zonis server, registers its own
//! `ping` route so the server can call back, issues one `ping` request of
//! its own, then blocks until the connection closes.
//!
//! Configured the way `services/streamer/src/main.rs` and
//! `services/emulator/src/main.rs` configure their own uplinks: a
//! `clap::Command`/`Arg` builder with `value_parser`-validated flags, not
//! `#[derive(Parser)]` — no file in the teacher tree uses clap's derive
//! API.

use clap::{Arg, Command};
use tracing_subscriber::EnvFilter;

use zonis::client::ClientSessionBuilder;
use zonis::handler_fn;

fn validate_url(value: &str) -> Result<String, String> {
    if value.starts_with("ws://") || value.starts_with("wss://") {
        Ok(value.to_owned())
    } else {
        Err("URL must start with ws:// or wss://".to_owned())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = Command::new("Zonis Ping Client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Demonstration zonis client issuing a single ping")
        .arg(
            Arg::new("url")
                .help("WebSocket URL of the server's upgrade route")
                .short('u')
                .long("url")
                .value_parser(validate_url)
                .default_value("ws://127.0.0.1:9876/ws"),
        )
        .arg(
            Arg::new("identifier")
                .help("Identifier to present at connect. A fresh one is generated when omitted")
                .short('i')
                .long("identifier"),
        )
        .get_matches();

    let url = matches
        .get_one::<String>("url")
        .expect("url has a default")
        .clone();
    let identifier = matches.get_one::<String>("identifier").cloned();

    let mut builder = ClientSessionBuilder::new(url).route(
        "ping",
        handler_fn(|_arguments| async { Ok(serde_json::json!("pong")) }),
    );
    if let Some(identifier) = identifier {
        builder = builder.identifier(identifier);
    }

    let session = builder.connect().await.expect("connect to server");
    tracing::info!(identifier = session.identifier(), "connected");

    match session.request("ping", serde_json::Map::new()).await {
        Ok(value) => tracing::info!(?value, "ping replied"),
        Err(e) => tracing::warn!(error = %e, "ping failed"),
    }

    session.block_until_closed().await;
}
