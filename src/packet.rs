//! The wire envelope: `{packet_id, type, data}` JSON text frames.
//!
//! `type` is not a literal struct field in the Rust model; it is carried by
//! the `#[serde(tag = "type", content = "data")]` discriminant on
//! [`PacketData`], the same translation the teacher protocol crate uses for
//! its `kind`-tagged `WsMessage` union.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ZonisError;

/// Opaque correlation id, unique within one session's in-flight set.
///
/// Generated from 16 random bytes, base64-encoded. Never parsed back to
/// anything structured — only ever echoed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId(pub String);

impl PacketId {
    /// Generate a fresh, collision-free-in-practice packet id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        PacketId(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            bytes,
        ))
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PacketId {
    fn from(value: &str) -> Self {
        PacketId(value.to_owned())
    }
}

/// Request payload: `{route, arguments}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub route: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Failure response payload: `{exception}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
    pub exception: String,
}

/// Identify payload: `{override_key, client_identifier}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    #[serde(default)]
    pub override_key: Option<String>,
    pub client_identifier: String,
}

/// The envelope's variant payload, tagged on `type` with content under
/// `data`, matching spec.md's five wire types exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PacketData {
    Request(RequestPayload),
    Response(serde_json::Value),
    Identify(IdentifyPayload),
    ClientToServer(RequestPayload),
    FailureResponse(FailurePayload),
}

/// The full wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub packet_id: PacketId,
    #[serde(flatten)]
    pub data: PacketData,
}

impl Packet {
    pub fn request(
        id: PacketId,
        route: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Packet {
            packet_id: id,
            data: PacketData::Request(RequestPayload {
                route: route.into(),
                arguments,
            }),
        }
    }

    pub fn client_to_server(
        id: PacketId,
        route: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Packet {
            packet_id: id,
            data: PacketData::ClientToServer(RequestPayload {
                route: route.into(),
                arguments,
            }),
        }
    }

    pub fn response(id: PacketId, value: serde_json::Value) -> Self {
        Packet {
            packet_id: id,
            data: PacketData::Response(value),
        }
    }

    pub fn failure(id: PacketId, exception: impl Into<String>) -> Self {
        Packet {
            packet_id: id,
            data: PacketData::FailureResponse(FailurePayload {
                exception: exception.into(),
            }),
        }
    }

    pub fn identify(client_identifier: impl Into<String>, override_key: Option<String>) -> Self {
        Packet {
            packet_id: PacketId("IDENTIFY".to_owned()),
            data: PacketData::Identify(IdentifyPayload {
                override_key,
                client_identifier: client_identifier.into(),
            }),
        }
    }

    pub fn to_text(&self) -> Result<String, ZonisError> {
        serde_json::to_string(self).map_err(Into::into)
    }

    pub fn from_text(text: &str) -> Result<Self, ZonisError> {
        serde_json::from_str(text)
            .map_err(|e| ZonisError::UnhandledWebsocketType(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let mut args = serde_json::Map::new();
        args.insert("n".to_owned(), serde_json::json!(3));
        let packet = Packet::request(PacketId("abc".into()), "ping", args);
        let text = packet.to_text().unwrap();
        let back = Packet::from_text(&text).unwrap();
        assert_eq!(packet, back);
    }

    #[test]
    fn response_round_trips_with_arbitrary_value() {
        let packet = Packet::response(PacketId("abc".into()), serde_json::json!({"pong": true}));
        let text = packet.to_text().unwrap();
        let back = Packet::from_text(&text).unwrap();
        assert_eq!(packet, back);
    }

    #[test]
    fn failure_round_trips() {
        let packet = Packet::failure(PacketId("abc".into()), "boom");
        let text = packet.to_text().unwrap();
        let back = Packet::from_text(&text).unwrap();
        match back.data {
            PacketData::FailureResponse(FailurePayload { exception }) => {
                assert_eq!(exception, "boom");
            }
            other => panic!("expected failure_response, got {other:?}"),
        }
    }

    #[test]
    fn identify_carries_override_key_when_present() {
        let packet = Packet::identify("client-a", Some("s3cr3t".to_owned()));
        let text = packet.to_text().unwrap();
        assert!(text.contains("\"client_identifier\":\"client-a\""));
        assert!(text.contains("\"override_key\":\"s3cr3t\""));
    }

    #[test]
    fn unknown_type_tag_fails_to_parse_rather_than_panicking() {
        let text = r#"{"packet_id":"x","type":"not_a_real_type","data":{}}"#;
        assert!(Packet::from_text(text).is_err());
    }

    #[test]
    fn packet_ids_generated_are_non_empty_and_distinct() {
        let a = PacketId::generate();
        let b = PacketId::generate();
        assert!(!a.0.is_empty());
        assert_ne!(a, b);
    }
}
