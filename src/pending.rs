//! The pending request registry: a correlation map from packet id to a
//! one-shot completion slot awaiting a response.
//!
//! Backed by `tokio::sync::oneshot`, the same primitive the teacher uses
//! for its `ForwarderCommand::ConfigGet { reply: oneshot::Sender<...> }`
//! server-to-forwarder proxy calls in `state.rs`. A oneshot channel already
//! buffers exactly one value, which is what makes it the right fit for the
//! spec's "latch, not a channel" requirement: a `settle` arriving before
//! the caller polls its receiver is not a race, it's the normal case.

use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

use crate::error::ZonisError;
use crate::packet::PacketId;

/// What a pending request settles to: the handler's return value, or an
/// error (remote failure, transport loss, cancellation).
pub type Outcome = Result<serde_json::Value, ZonisError>;

/// Correlation map from packet id to a one-shot completion slot.
///
/// Mutated by both the requester (`open`/`cancel`) and the session's reader
/// task (`settle`) — serialized behind a `tokio::sync::Mutex`, mirroring the
/// `Arc<RwLock<HashMap<...>>>` registries in the teacher's `AppState`.
pub struct PendingRegistry {
    slots: Mutex<HashMap<PacketId, oneshot::Sender<Outcome>>>,
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRegistry {
    pub fn new() -> Self {
        PendingRegistry {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh packet id and a one-shot completion slot, stored
    /// indexed by id.
    pub async fn open(&self) -> (PacketId, oneshot::Receiver<Outcome>) {
        let id = PacketId::generate();
        let (tx, rx) = oneshot::channel();
        self.slots.lock().await.insert(id.clone(), tx);
        (id, rx)
    }

    /// Fulfill the slot for `id` with `outcome`. A second settle, or a
    /// settle on an unknown id, is a silent no-op — it may correspond to a
    /// concurrently cancelled slot or a stale peer reply.
    pub async fn settle(&self, id: &PacketId, outcome: Outcome) {
        if let Some(tx) = self.slots.lock().await.remove(id) {
            let _ = tx.send(outcome);
        }
    }

    /// Remove the slot for `id` without settling it, e.g. when the caller
    /// cancels its awaiting `request` — the slot must not linger in the
    /// registry once nobody is waiting on it.
    pub async fn cancel(&self, id: &PacketId) {
        self.slots.lock().await.remove(id);
    }

    /// Settle every outstanding slot with `Err(reason)`. Used on session
    /// close / disconnect.
    pub async fn cancel_all(&self, reason: ZonisError) {
        let mut slots = self.slots.lock().await;
        for (_, tx) in slots.drain() {
            let _ = tx.send(Err(reason.clone()));
        }
    }

    /// Number of outstanding (unfulfilled) slots. Used by tests asserting
    /// the registry returns to empty after a request completes.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settle_fulfills_the_matching_slot() {
        let registry = PendingRegistry::new();
        let (id, rx) = registry.open().await;
        registry.settle(&id, Ok(serde_json::json!("pong"))).await;
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), serde_json::json!("pong"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn settle_on_unknown_id_is_a_silent_no_op() {
        let registry = PendingRegistry::new();
        registry
            .settle(&PacketId("never-opened".into()), Ok(serde_json::json!(1)))
            .await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn second_settle_on_same_id_is_a_no_op() {
        let registry = PendingRegistry::new();
        let (id, rx) = registry.open().await;
        registry.settle(&id, Ok(serde_json::json!(1))).await;
        // A stale duplicate reply for the same id must not panic or overwrite.
        registry.settle(&id, Ok(serde_json::json!(2))).await;
        assert_eq!(rx.await.unwrap().unwrap(), serde_json::json!(1));
    }

    #[tokio::test]
    async fn cancel_removes_the_slot_without_settling() {
        let registry = PendingRegistry::new();
        let (id, rx) = registry.open().await;
        registry.cancel(&id).await;
        assert!(registry.is_empty().await);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn cancel_all_settles_every_outstanding_slot_with_the_given_reason() {
        let registry = PendingRegistry::new();
        let (id_a, rx_a) = registry.open().await;
        let (id_b, rx_b) = registry.open().await;

        registry.cancel_all(ZonisError::TransportClosed).await;

        assert!(matches!(
            rx_a.await.unwrap(),
            Err(ZonisError::TransportClosed)
        ));
        assert!(matches!(
            rx_b.await.unwrap(),
            Err(ZonisError::TransportClosed)
        ));
        assert!(registry.is_empty().await);
        let _ = (id_a, id_b);
    }

    #[tokio::test]
    async fn concurrent_requests_on_distinct_ids_settle_independently() {
        let registry = PendingRegistry::new();
        let (id_a, rx_a) = registry.open().await;
        let (id_b, rx_b) = registry.open().await;
        assert_ne!(id_a, id_b);

        registry.settle(&id_b, Ok(serde_json::json!("b"))).await;
        registry.settle(&id_a, Ok(serde_json::json!("a"))).await;

        assert_eq!(rx_a.await.unwrap().unwrap(), serde_json::json!("a"));
        assert_eq!(rx_b.await.unwrap().unwrap(), serde_json::json!("b"));
    }
}
