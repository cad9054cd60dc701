//! The server hub: the many-to-one counterpart of [`crate::client`]. One
//! hub serves an arbitrary number of concurrently connected identities,
//! each behind its own transport, while callers talk to it by identifier
//! rather than by connection.
//!
//! Grounded in `services/server/src/state.rs::AppState`'s
//! `Arc<RwLock<HashMap<...>>>` session registry shape and
//! `services/server/src/ws_forwarder.rs`'s per-connection ingestion loop.

#[cfg(feature = "axum-integration")]
pub mod axum_ws;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};

use futures_util::{SinkExt, StreamExt};

use crate::dispatch::{handle_inbound_text, send_packet, RequestishKind};
use crate::error::{Result, ZonisError};
use crate::packet::{Packet, PacketData, PacketId};
use crate::pending::PendingRegistry;
use crate::routes::RouteTable;
use crate::transport::{Frame, WsTransport};

/// Governs what happens when an `identify` names an identifier that has no
/// configured secret key at all, under an override attempt — spec.md §6's
/// `override_policy` knob. Both variants always reject with
/// `DuplicateConnection`; they differ in whether the rejected connection is
/// told why before its transport closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePolicy {
    /// The rejected connection receives an explicit `failure_response`
    /// frame (echoing the identify's `packet_id`) naming the cause, and
    /// the rejection is logged, before the transport closes.
    RejectUnknownOverride,
    /// The connection is simply closed with no explanatory frame and no
    /// log line — the attempting peer sees only a closed transport.
    SilentUnknownOverride,
}

pub struct ServerConfig {
    pub secret_keys: HashMap<String, String>,
    pub override_policy: OverridePolicy,
    pub routes: Option<Arc<RouteTable>>,
}

impl ServerConfig {
    pub fn new(override_policy: OverridePolicy) -> Self {
        ServerConfig {
            secret_keys: HashMap::new(),
            override_policy,
            routes: None,
        }
    }

    pub fn with_secret_key(mut self, identifier: impl Into<String>, key: impl Into<String>) -> Self {
        self.secret_keys.insert(identifier.into(), key.into());
        self
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(Arc::new(routes));
        self
    }
}

/// A connected client's send handle plus the bookkeeping needed to
/// selectively cancel its in-flight server-initiated requests on eviction
/// or disconnect (spec.md §9's eviction resolution) without touching any
/// other session's requests.
struct ClientHandle {
    outbound: mpsc::UnboundedSender<Frame>,
    disconnect: Arc<Notify>,
    open_ids: Mutex<HashSet<PacketId>>,
}

/// The many-to-one hub. `pending` is a single registry shared across all
/// connections — packet ids are unique per-request regardless of which
/// connection they're addressed to, the same way the client side treats
/// its own registry — while `ClientHandle::open_ids` tracks which of those
/// ids belong to which connection, so eviction cancels only that
/// connection's outstanding requests.
pub struct ServerHub {
    sessions: RwLock<HashMap<String, ClientHandle>>,
    secret_keys: HashMap<String, String>,
    routes: Option<Arc<RouteTable>>,
    pending: Arc<PendingRegistry>,
    override_policy: OverridePolicy,
}

impl ServerHub {
    pub fn new(config: ServerConfig) -> Self {
        ServerHub {
            sessions: RwLock::new(HashMap::new()),
            secret_keys: config.secret_keys,
            routes: config.routes,
            pending: Arc::new(PendingRegistry::new()),
            override_policy: config.override_policy,
        }
    }

    /// Decode an `identify` frame and install the session. On a taken
    /// identifier, checks `override_key` against the configured secret;
    /// a match atomically evicts the old handle (cancelling its in-flight
    /// requests with `TransportClosed` and notifying its ingestion loop to
    /// stop) and installs the new one. A mismatch always fails with
    /// `DuplicateConnection`; an override attempt against an identifier
    /// with no configured secret additionally sends an explicit
    /// `failure_response` over `outbound` and logs a warning under
    /// `RejectUnknownOverride`, or neither under `SilentUnknownOverride`.
    pub async fn parse_identify(
        &self,
        frame: &Packet,
        outbound: mpsc::UnboundedSender<Frame>,
        disconnect: Arc<Notify>,
    ) -> Result<String> {
        let PacketData::Identify(payload) = &frame.data else {
            return Err(ZonisError::UnhandledWebsocketType(format!(
                "expected identify, got {:?}",
                frame.data
            )));
        };
        let identifier = payload.client_identifier.clone();

        let mut sessions = self.sessions.write().await;
        let taken = sessions.contains_key(&identifier);
        if taken {
            let configured = self.secret_keys.get(&identifier);
            let authorized = matches!(
                (configured, &payload.override_key),
                (Some(secret), Some(candidate)) if secret == candidate
            );
            if !authorized {
                let unknown_override = configured.is_none() && payload.override_key.is_some();
                if unknown_override
                    && self.override_policy == OverridePolicy::RejectUnknownOverride
                {
                    tracing::warn!(%identifier, "override attempted against identifier with no configured secret");
                    send_packet(
                        &outbound,
                        Packet::failure(
                            frame.packet_id.clone(),
                            format!(
                                "client identifier {identifier:?} has no configured secret; override rejected"
                            ),
                        ),
                    );
                }
                return Err(ZonisError::DuplicateConnection(identifier));
            }
            if let Some(evicted) = sessions.remove(&identifier) {
                evicted_cleanup(&self.pending, evicted).await;
            }
        }

        sessions.insert(
            identifier.clone(),
            ClientHandle {
                outbound,
                disconnect,
                open_ids: Mutex::new(HashSet::new()),
            },
        );
        Ok(identifier)
    }

    /// Dispatch one inbound frame from `identifier`'s transport: a
    /// `ClientToServer` request runs through the hub's route table and
    /// replies; a `Response`/`FailureResponse` settles the hub's pending
    /// registry. Mirrors `crate::client`'s reader loop, parameterized by
    /// `RequestishKind::ClientToServer`.
    pub async fn ingest(&self, identifier: &str, text: &str) -> Result<()> {
        let outbound = {
            let sessions = self.sessions.read().await;
            let handle = sessions
                .get(identifier)
                .ok_or_else(|| ZonisError::UnknownClient(identifier.to_owned()))?;
            handle.outbound.clone()
        };
        handle_inbound_text(
            text,
            self.routes.as_ref(),
            &self.pending,
            &outbound,
            RequestishKind::ClientToServer,
        )
        .await
    }

    /// Send a request to one connected client and await its reply.
    /// `client_identifier` is required unless exactly one client is
    /// connected, in which case it defaults to that client.
    pub async fn request(
        &self,
        route: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
        client_identifier: Option<&str>,
    ) -> Result<serde_json::Value> {
        let route = route.into();
        let identifier = self.resolve_target(client_identifier).await?;

        let (id, receiver) = self.pending.open().await;

        // Capturing `outbound` and registering `id` in this connection's
        // `open_ids` must happen under the same read-guard acquisition: a
        // write-locked eviction (`parse_identify`, `disconnect_if_current`)
        // cannot interleave between them and drain `open_ids` before `id`
        // is in it, which would leave `id`'s frame sent on a stale
        // `outbound` with nothing left to ever cancel it.
        let outbound = {
            let sessions = self.sessions.read().await;
            let Some(handle) = sessions.get(&identifier) else {
                drop(sessions);
                self.pending.cancel(&id).await;
                return Err(ZonisError::UnknownClient(identifier));
            };
            handle.open_ids.lock().await.insert(id.clone());
            handle.outbound.clone()
        };

        send_packet(&outbound, Packet::request(id.clone(), route, arguments));

        let outcome = match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ZonisError::TransportClosed),
        };

        let sessions = self.sessions.read().await;
        if let Some(handle) = sessions.get(&identifier) {
            handle.open_ids.lock().await.remove(&id);
        }
        outcome
    }

    async fn resolve_target(&self, client_identifier: Option<&str>) -> Result<String> {
        if let Some(identifier) = client_identifier {
            return Ok(identifier.to_owned());
        }
        let sessions = self.sessions.read().await;
        match sessions.len() {
            1 => Ok(sessions.keys().next().expect("len checked above").clone()),
            0 => Err(ZonisError::UnknownClient("no clients connected".to_owned())),
            _ => Err(ZonisError::UnknownClient(
                "identifier required: multiple clients connected".to_owned(),
            )),
        }
    }

    /// Fan out a request to every currently connected client concurrently.
    /// Never fails as a whole — each identifier's outcome is reported
    /// independently. Grounded in the teacher's `client_pool.rs` fan-out
    /// over `futures::future::join_all`.
    pub async fn request_all(
        &self,
        route: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> HashMap<String, Result<serde_json::Value>> {
        let route = route.into();
        let identifiers = self.connected_identifiers().await;
        let futures = identifiers.iter().map(|identifier| {
            let route = route.clone();
            let arguments = arguments.clone();
            async move {
                (
                    identifier.clone(),
                    self.request(route, arguments, Some(identifier)).await,
                )
            }
        });
        join_all(futures).await.into_iter().collect()
    }

    /// Idempotent: removing an unknown identifier is a silent no-op
    /// (spec.md §4.5's stated default).
    pub async fn disconnect(&self, identifier: &str) {
        let removed = self.sessions.write().await.remove(identifier);
        if let Some(handle) = removed {
            evicted_cleanup(&self.pending, handle).await;
        }
    }

    /// Remove `identifier`'s session only if it is still the one
    /// identified by `token` — an override may already have replaced it
    /// with a newer connection under the same name, in which case this is
    /// a no-op. Used by [`run_connection`] to clean up after itself
    /// without evicting a session that has since overridden it.
    async fn disconnect_if_current(&self, identifier: &str, token: &Arc<Notify>) {
        let mut sessions = self.sessions.write().await;
        let is_current = sessions
            .get(identifier)
            .is_some_and(|handle| Arc::ptr_eq(&handle.disconnect, token));
        if !is_current {
            return;
        }
        if let Some(handle) = sessions.remove(identifier) {
            drop(sessions);
            evicted_cleanup(&self.pending, handle).await;
        }
    }

    pub async fn connected_identifiers(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

/// Drive one connection end-to-end against `hub`: read its first frame as
/// `identify`, install the session, then loop ingesting frames until the
/// transport closes or the hub evicts this identity. Generic over
/// [`WsTransport`] so `axum_ws::upgrade` and `zonis-test-util`'s in-memory
/// fixtures share this one implementation rather than duplicating the
/// `tokio::select!` loop per transport kind.
pub async fn run_connection<T: WsTransport + 'static>(transport: T, hub: Arc<ServerHub>) -> Result<()> {
    let (mut sink, mut stream) = transport.split();

    let Some(first) = stream.next().await else {
        return Ok(());
    };
    let first = first.map_err(ZonisError::Transport)?;
    let Frame::Text(text) = first else {
        return Ok(());
    };
    let identify_packet = Packet::from_text(&text)?;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let disconnect = Arc::new(Notify::new());

    // Spawned before admission is decided: a rejected identify under
    // `OverridePolicy::RejectUnknownOverride` still needs this task alive
    // to drain and deliver its explicit failure frame.
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let is_close = matches!(frame, Frame::Close);
            if sink.send(frame).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Held only long enough to outlive `parse_identify`'s rejection path;
    // dropped immediately after so the channel's one remaining sender is
    // whichever clone `parse_identify` stored in the installed
    // `ClientHandle` on success — that clone's `Drop`, once the hub evicts
    // the session, is what closes the writer task above.
    let rejection_notice = outbound_tx.clone();
    let identify_outcome = hub
        .parse_identify(&identify_packet, outbound_tx, Arc::clone(&disconnect))
        .await;
    drop(rejection_notice);
    let identifier = identify_outcome?;

    loop {
        tokio::select! {
            _ = disconnect.notified() => break,
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    if let Err(e) = hub.ingest(&identifier, &text).await {
                        tracing::warn!(%identifier, error = %e, "server: ingest error");
                    }
                }
                Some(Ok(Frame::Close)) | None => break,
                Some(Err(e)) => {
                    tracing::warn!(%identifier, error = %e, "server: transport error");
                    break;
                }
            },
        }
    }

    hub.disconnect_if_current(&identifier, &disconnect).await;
    Ok(())
}

/// Cancel every pending slot this handle still owns, with `TransportClosed`,
/// and wake its ingestion loop so it stops reading a transport the hub no
/// longer considers live.
async fn evicted_cleanup(pending: &PendingRegistry, handle: ClientHandle) {
    let ids: Vec<PacketId> = handle.open_ids.lock().await.drain().collect();
    for id in ids {
        pending.settle(&id, Err(ZonisError::TransportClosed)).await;
    }
    handle.disconnect.notify_waiters();
}
