use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::connection::{ConnectionManager, ConnectionStatus};
use super::registry::{EventHandler, SubscriptionId};

/// Fire-and-forget emit/subscribe surface over a [`ConnectionManager`].
///
/// Nothing emitted while disconnected is queued, and nothing is
/// acknowledged. Ordering is whatever the socket gives (FIFO per
/// connection).
#[derive(Clone)]
pub struct EventChannel {
    manager: Arc<ConnectionManager>,
}

impl EventChannel {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.watch_status()
    }

    /// Sends `payload` under `event`. Returns `false` and does nothing when
    /// the channel is not connected.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        if !self.manager.is_connected() {
            tracing::debug!(event = %event, "Dropping emit while disconnected");
            return false;
        }

        let sent = self.manager.send(event, payload);
        if !sent {
            tracing::debug!(event = %event, "Dropping emit, socket went away");
        }
        sent
    }

    /// Serializes `payload` and emits it. Serialization failures count as a
    /// dropped emit.
    pub fn emit_json<T: Serialize>(&self, event: &str, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(value) => self.emit(event, value),
            Err(e) => {
                tracing::error!(error = %e, event = %event, "Failed to serialize event payload");
                false
            }
        }
    }

    /// Registers `handler` for `event`. Returns `None` once the manager has
    /// been shut down.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if self.manager.is_shut_down() {
            tracing::debug!(event = %event, "Refusing subscription on shut down channel");
            return None;
        }

        let handler: EventHandler = Arc::new(handler);
        Some(self.manager.registry().add(event, handler))
    }

    /// Like [`subscribe`](Self::subscribe), decoding each payload into `T`.
    /// Payloads that fail to decode are logged and skipped.
    pub fn subscribe_typed<T, F>(&self, event: &str, handler: F) -> Option<SubscriptionId>
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = event.to_string();
        self.subscribe(event, move |data: &Value| {
            match T::deserialize(data) {
                Ok(payload) => handler(payload),
                Err(e) => tracing::warn!(
                    error = %e,
                    event = %name,
                    "Discarding inbound event with unexpected payload"
                ),
            }
        })
    }

    /// Removes one handler, or all handlers for `event` when `id` is `None`.
    pub fn unsubscribe(&self, event: &str, id: Option<SubscriptionId>) -> usize {
        self.manager.registry().remove(event, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use crate::config::RealtimeConfig;
    use crate::realtime::ReconnectPolicy;
    use serde_json::json;
    use std::sync::Mutex;

    fn channel() -> EventChannel {
        let config = RealtimeConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            path: "/ws".to_string(),
            reconnect: ReconnectPolicy::disabled(),
        };
        EventChannel::new(ConnectionManager::new(config, AuthSession::new()))
    }

    #[test]
    fn test_emit_while_disconnected_returns_false() {
        let channel = channel();
        assert!(!channel.emit("quiz-progress", json!({"sessionId": "s"})));
        assert!(!channel.emit_json("quiz-completed", &json!({"sessionId": "s"})));
    }

    #[test]
    fn test_typed_subscription_skips_bad_payloads() {
        #[derive(serde::Deserialize)]
        struct Payload {
            action: String,
        }

        let channel = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel
            .subscribe_typed("teacher-intervention", move |p: Payload| {
                sink.lock().unwrap().push(p.action);
            })
            .unwrap();

        let registry = channel.manager().registry();
        registry.dispatch("teacher-intervention", &json!({"action": "warn"}));
        registry.dispatch("teacher-intervention", &json!({"message": "no action"}));

        assert_eq!(*seen.lock().unwrap(), vec!["warn".to_string()]);
    }

    #[test]
    fn test_unsubscribe_by_id() {
        let channel = channel();
        let id = channel.subscribe("student-progress", |_| {}).unwrap();
        channel.subscribe("student-progress", |_| {}).unwrap();

        assert_eq!(channel.unsubscribe("student-progress", Some(id)), 1);
        assert_eq!(channel.unsubscribe("student-progress", None), 1);
    }

    #[tokio::test]
    async fn test_subscribe_refused_after_shutdown() {
        let channel = channel();
        channel.manager().shutdown();
        assert!(channel.subscribe("violation-alert", |_| {}).is_none());
    }
}
