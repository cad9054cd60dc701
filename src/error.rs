//! Error taxonomy for the request/response dispatch core.
//!
//! All variants surface to callers of [`crate::client::ClientSession`] or
//! [`crate::server::ServerHub`]; protocol-structural errors (an unknown
//! wire `type`, a route collision on registration) are also logged at the
//! call site and do not by themselves terminate a session.

use crate::packet::PacketId;

/// Errors produced by the dispatch core.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ZonisError {
    /// Identify presented an identifier already bound in the session map,
    /// with no (or an invalid) override key.
    #[error("client identifier {0:?} is already connected")]
    DuplicateConnection(String),

    /// `RouteTable::register` was called twice with the same name.
    #[error("route {0:?} is already registered")]
    DuplicateRoute(String),

    /// An inbound frame had a `type` tag this implementation does not
    /// recognize, or was not valid JSON for the envelope shape.
    #[error("unhandled websocket frame: {0}")]
    UnhandledWebsocketType(String),

    /// A request or client_to_server frame named a route absent from the
    /// local table.
    #[error("no such route: {0:?}")]
    UnknownRoute(String),

    /// A server unicast `request` named a client identifier not present in
    /// the session map, or omitted the identifier while zero or multiple
    /// clients are connected.
    #[error("unknown or ambiguous client: {0}")]
    UnknownClient(String),

    /// A frame was valid JSON but did not match any recognized envelope
    /// shape for its `type`.
    #[error("malformed packet: {0}")]
    UnknownPacket(String),

    /// A session was asked to dispatch an inbound request but has no
    /// route table attached.
    #[error("session has no route table to dispatch requests against")]
    MissingReceiveHandler,

    /// The remote handler raised; carries the stringified cause from the
    /// peer's `failure_response` frame.
    #[error("remote handler failed: {0}")]
    RequestFailed(String),

    /// The transport closed (or was closed) before a pending request
    /// could be settled.
    #[error("transport closed")]
    TransportClosed,

    /// The packet id referenced by a response frame (or by a settle/cancel
    /// call) was not found — not itself fatal, see [`crate::pending`].
    #[error("unknown packet id: {0}")]
    UnknownPendingId(PacketId),

    /// Underlying transport I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ZonisError {
    fn from(value: serde_json::Error) -> Self {
        ZonisError::Json(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ZonisError>;
