//! The dispatch loop shared by a client session's reader task and a
//! server hub's per-connection ingestion point.
//!
//! spec.md §4.5 states the server's ingestion loop is "logically the
//! session's reader: it classifies the frame exactly as the client reader
//! does." This module is that shared classification, parameterized only by
//! which packet variant counts as "please run one of my routes" — `Request`
//! for a client reader, `ClientToServer` for server ingestion — and which
//! route table / pending registry to use.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::ZonisError;
use crate::packet::{Packet, PacketData, PacketId, RequestPayload};
use crate::pending::PendingRegistry;
use crate::routes::RouteTable;
use crate::transport::Frame;

/// Selects which tagged variant this side treats as an inbound request to
/// dispatch through its own route table.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestishKind {
    /// A client reader dispatches `Request` frames (server-initiated calls).
    Request,
    /// Server ingestion dispatches `ClientToServer` frames.
    ClientToServer,
}

fn as_requestish(data: &PacketData, kind: RequestishKind) -> Option<&RequestPayload> {
    match (kind, data) {
        (RequestishKind::Request, PacketData::Request(payload)) => Some(payload),
        (RequestishKind::ClientToServer, PacketData::ClientToServer(payload)) => Some(payload),
        _ => None,
    }
}

/// Serialize and enqueue `packet` on `outbound`. The outbound channel only
/// disconnects once the session's writer task has exited, which happens
/// after (or concurrently with) the reader noticing transport close — so a
/// send failure here is folded into the same "transport closed" path as a
/// recv failure, not treated as a distinct error kind.
pub(crate) fn send_packet(outbound: &mpsc::UnboundedSender<Frame>, packet: Packet) {
    match packet.to_text() {
        Ok(text) => {
            let _ = outbound.send(Frame::Text(text));
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize outbound packet");
        }
    }
}

/// Handle one inbound text frame. Returns `Err` only for conditions the
/// caller should log and continue past (never terminate the reader task
/// over) — matching spec.md §7's propagation policy that protocol-
/// structural errors never kill a session.
pub(crate) async fn handle_inbound_text(
    text: &str,
    routes: Option<&Arc<RouteTable>>,
    pending: &PendingRegistry,
    outbound: &mpsc::UnboundedSender<Frame>,
    kind: RequestishKind,
) -> Result<(), ZonisError> {
    let packet = Packet::from_text(text)
        .map_err(|_| ZonisError::UnknownPacket(text.to_owned()))?;
    handle_inbound_packet(packet, routes, pending, outbound, kind).await
}

async fn handle_inbound_packet(
    packet: Packet,
    routes: Option<&Arc<RouteTable>>,
    pending: &PendingRegistry,
    outbound: &mpsc::UnboundedSender<Frame>,
    kind: RequestishKind,
) -> Result<(), ZonisError> {
    let Packet { packet_id, data } = packet;

    if let Some(payload) = as_requestish(&data, kind) {
        return dispatch_request(packet_id, payload, routes, outbound).await;
    }

    match data {
        PacketData::Response(value) => {
            pending.settle(&packet_id, Ok(value)).await;
            Ok(())
        }
        PacketData::FailureResponse(failure) => {
            pending
                .settle(&packet_id, Err(ZonisError::RequestFailed(failure.exception)))
                .await;
            Ok(())
        }
        other => Err(ZonisError::UnhandledWebsocketType(format!("{other:?}"))),
    }
}

async fn dispatch_request(
    packet_id: PacketId,
    payload: &RequestPayload,
    routes: Option<&Arc<RouteTable>>,
    outbound: &mpsc::UnboundedSender<Frame>,
) -> Result<(), ZonisError> {
    let result = match routes {
        Some(routes) => routes.dispatch(&payload.route, payload.arguments.clone()).await,
        None => Err(ZonisError::MissingReceiveHandler),
    };
    let reply = match result {
        Ok(value) => Packet::response(packet_id, value),
        Err(e) => Packet::failure(packet_id, e.to_string()),
    };
    send_packet(outbound, reply);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::handler_fn;

    fn ping_routes() -> Arc<RouteTable> {
        Arc::new(RouteTable::new().route(
            "ping",
            handler_fn(|_args| async { Ok(serde_json::json!("pong")) }),
        ))
    }

    #[tokio::test]
    async fn client_role_dispatches_request_frames_and_replies_with_response() {
        let routes = ping_routes();
        let pending = PendingRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let packet = Packet::request(PacketId("1".into()), "ping", serde_json::Map::new());

        handle_inbound_text(
            &packet.to_text().unwrap(),
            Some(&routes),
            &pending,
            &tx,
            RequestishKind::Request,
        )
        .await
        .unwrap();

        let Frame::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let reply = Packet::from_text(&text).unwrap();
        assert_eq!(reply.data, PacketData::Response(serde_json::json!("pong")));
    }

    #[tokio::test]
    async fn server_role_ignores_request_frames_but_dispatches_client_to_server() {
        let routes = ping_routes();
        let pending = PendingRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let packet =
            Packet::client_to_server(PacketId("1".into()), "ping", serde_json::Map::new());

        handle_inbound_text(
            &packet.to_text().unwrap(),
            Some(&routes),
            &pending,
            &tx,
            RequestishKind::ClientToServer,
        )
        .await
        .unwrap();

        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn missing_route_table_surfaces_missing_receive_handler_as_a_failure_reply() {
        let pending = PendingRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let packet = Packet::request(PacketId("1".into()), "ping", serde_json::Map::new());

        handle_inbound_text(
            &packet.to_text().unwrap(),
            None,
            &pending,
            &tx,
            RequestishKind::Request,
        )
        .await
        .unwrap();

        let Frame::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let reply = Packet::from_text(&text).unwrap();
        assert!(matches!(reply.data, PacketData::FailureResponse(_)));
    }

    #[tokio::test]
    async fn response_frame_settles_pending_slot() {
        let pending = PendingRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (id, receiver) = pending.open().await;
        let packet = Packet::response(id, serde_json::json!(42));

        handle_inbound_text(
            &packet.to_text().unwrap(),
            None,
            &pending,
            &tx,
            RequestishKind::Request,
        )
        .await
        .unwrap();

        assert_eq!(receiver.await.unwrap().unwrap(), serde_json::json!(42));
    }

    #[tokio::test]
    async fn unknown_frame_shape_is_reported_but_does_not_panic() {
        let pending = PendingRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = handle_inbound_text(
            "{not-json",
            None,
            &pending,
            &tx,
            RequestishKind::Request,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ZonisError::UnknownPacket(_)));
    }
}
