use std::sync::Arc;

use aggmcp_active::ChangeNotifier;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Backlog/live-stream capacity for the notification channel. A slow reader
/// falls behind and `tokio::sync::broadcast` drops its oldest unread
/// messages rather than blocking the sender — exactly the drop-oldest
/// overflow policy this design calls for, with no bespoke queue needed.
const NOTIFY_CAPACITY: usize = 64;

/// The single live upstream session. Dropping it (on reset or teardown) is
/// enough to "close" it: there is no downstream resource attached to a
/// session object itself, only the notification channel subscribers read
/// from.
pub struct Session {
    pub id: String,
    tx: broadcast::Sender<Value>,
}

impl Session {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            id: Uuid::new_v4().to_string(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.tx.subscribe()
    }

    pub fn notify(&self, payload: Value) {
        let _ = self.tx.send(payload);
    }
}

/// Holds the singleton session, swapped on every `initialize`.
#[derive(Default)]
pub struct SessionSlot(RwLock<Option<Arc<Session>>>);

impl SessionSlot {
    pub fn new() -> Self {
        Self(RwLock::new(None))
    }

    /// Reset semantics (§4.7 boundary behavior): replace whatever session
    /// was live, if any, with a fresh one. The prior `Arc<Session>` is
    /// dropped once its last reader (any open GET stream) disconnects.
    pub async fn reset(&self) -> Arc<Session> {
        let fresh = Arc::new(Session::new());
        *self.0.write().await = Some(Arc::clone(&fresh));
        fresh
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.0.read().await.clone()
    }

    pub async fn teardown(&self) {
        *self.0.write().await = None;
    }

    /// Broadcasts to the live session, if any; a no-op otherwise (nothing
    /// is listening before the first `initialize`).
    pub async fn notify(&self, payload: Value) {
        if let Some(session) = self.current().await {
            session.notify(payload);
        }
    }
}

/// Bridges the Active Set Manager's [`ChangeNotifier`] callback (sync, fired
/// from inside `admit`/`evict`/`reload_from_disk`) to the session's async
/// broadcast. Spawns rather than blocks, since `tool_list_changed` itself
/// must stay synchronous.
pub struct SessionNotifier(Arc<SessionSlot>);

impl SessionNotifier {
    pub fn new(slot: Arc<SessionSlot>) -> Self {
        Self(slot)
    }
}

impl ChangeNotifier for SessionNotifier {
    fn tool_list_changed(&self) {
        let slot = Arc::clone(&self.0);
        tokio::spawn(async move {
            slot.notify(json!({
                "jsonrpc": "2.0",
                "method": "notifications/tools/list_changed",
            }))
            .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_replaces_prior_session_id() {
        let slot = SessionSlot::new();
        let first = slot.reset().await;
        let second = slot.reset().await;
        assert_ne!(first.id, second.id);
        assert_eq!(slot.current().await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn notify_before_initialize_is_a_noop() {
        let slot = SessionSlot::new();
        slot.notify(serde_json::json!({"method": "notifications/tools/list_changed"}))
            .await;
    }

    #[tokio::test]
    async fn subscriber_receives_notify_after_reset() {
        let slot = SessionSlot::new();
        let session = slot.reset().await;
        let mut rx = session.subscribe();
        slot.notify(serde_json::json!({"method": "notifications/tools/list_changed"}))
            .await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received["method"], "notifications/tools/list_changed");
    }

    #[tokio::test]
    async fn session_notifier_forwards_to_live_session() {
        let slot = Arc::new(SessionSlot::new());
        let session = slot.reset().await;
        let mut rx = session.subscribe();

        let notifier = SessionNotifier::new(Arc::clone(&slot));
        notifier.tool_list_changed();

        let received = rx.recv().await.unwrap();
        assert_eq!(received["method"], "notifications/tools/list_changed");
    }
}
