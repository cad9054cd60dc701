//! In-memory transport double and connection fixtures for exercising
//! [`zonis::client`] and [`zonis::server`] without opening a real socket.
//!
//! Grounded in `crates/rt-test-utils`'s `mock_ws_server.rs` /
//! `mock_ws_client.rs` doubles, taken one step further: those two still
//! loop back over real TCP sockets, where [`MockTransport`] is a pure
//! in-memory `mpsc` pair — appropriate here since this crate's own spec
//! explicitly treats the transport as an external collaborator outside its
//! surface, so the more direct double is the better fit. The
//! `test-support`-feature gating idiom (this crate only compiled in when
//! that feature is enabled) follows `leynos-mxd`'s `test-util` workspace
//! member.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tokio::sync::mpsc;

use zonis::client::{ClientSession, ClientSessionBuilder};
use zonis::server::{run_connection, OverridePolicy, ServerConfig, ServerHub};
use zonis::{Frame, Result, RouteTable};

/// An in-memory duplex pair. Each end implements `Stream<Item =
/// Result<Frame, String>> + Sink<Frame, Error = String>` — the bound
/// [`zonis::transport::WsTransport`] requires — by forwarding frames sent
/// on one end to the other via a pair of unbounded `mpsc` channels.
pub struct MockTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<Frame>,
}

impl MockTransport {
    /// Build two connected ends: whatever is sent into one arrives on the
    /// other's stream half.
    pub fn pair() -> (MockTransport, MockTransport) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        (
            MockTransport {
                outbound: tx_a,
                inbound: rx_b,
            },
            MockTransport {
                outbound: tx_b,
                inbound: rx_a,
            },
        )
    }
}

impl Stream for MockTransport {
    type Item = std::result::Result<Frame, String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx).map(|item| item.map(Ok))
    }
}

impl Sink<Frame> for MockTransport {
    type Error = String;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> std::result::Result<(), Self::Error> {
        self.outbound.send(item).map_err(|e| e.to_string())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Spawn the server-side half of a connection against `hub` over a fresh
/// in-memory pair, and connect `builder` over the client-side half.
/// `builder`'s url is never dialed — the transport is already open.
pub async fn spawn_client(hub: Arc<ServerHub>, builder: ClientSessionBuilder) -> Result<ClientSession> {
    let (client_end, server_end) = MockTransport::pair();
    tokio::spawn(async move {
        if let Err(e) = run_connection(server_end, hub).await {
            tracing::warn!(error = %e, "zonis-test-util: mock connection ended with an error");
        }
    });
    builder.connect_with_transport(client_end).await
}

/// A ready-made hub plus `count` already-identified clients (`"client-0"`,
/// `"client-1"`, ...), each with an empty route table of its own. Used by
/// the end-to-end scenario tests that only need the server side to expose
/// routes.
pub async fn hub_with_clients(
    routes: RouteTable,
    override_policy: OverridePolicy,
    count: usize,
) -> (Arc<ServerHub>, Vec<ClientSession>) {
    let hub = Arc::new(ServerHub::new(
        ServerConfig::new(override_policy).with_routes(routes),
    ));
    let mut clients = Vec::with_capacity(count);
    for i in 0..count {
        let builder = ClientSessionBuilder::new("mock://unused").identifier(format!("client-{i}"));
        let client = spawn_client(Arc::clone(&hub), builder)
            .await
            .expect("mock connection never fails to identify");
        clients.push(client);
    }
    (hub, clients)
}

/// Collects `request_all`-style per-identifier outcomes into plain JSON
/// values, panicking on any per-identifier failure — convenient for tests
/// asserting on the happy path only.
pub fn unwrap_all(
    outcomes: HashMap<String, Result<serde_json::Value>>,
) -> HashMap<String, serde_json::Value> {
    outcomes
        .into_iter()
        .map(|(id, outcome)| (id, outcome.unwrap_or_else(|e| panic!("{id}: {e}"))))
        .collect()
}
