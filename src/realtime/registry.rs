use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Callback invoked for every inbound frame of a subscribed event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event name -> handlers, in subscription order.
///
/// Lives on the connection manager rather than on a socket, so handlers
/// survive reconnects.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one handler, or every handler for `event` when `id` is
    /// `None`. Returns how many were removed.
    pub fn remove(&self, event: &str, id: Option<SubscriptionId>) -> usize {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());

        let removed = match (handlers.get_mut(event), id) {
            (None, _) => 0,
            (Some(list), Some(id)) => {
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                before - list.len()
            }
            (Some(list), None) => {
                let count = list.len();
                list.clear();
                count
            }
        };

        if handlers.get(event).map_or(false, Vec::is_empty) {
            handlers.remove(event);
        }

        removed
    }

    /// Calls every handler registered for `event`. Handlers are cloned out
    /// of the lock first, so a handler may subscribe or unsubscribe.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        let targets: Vec<EventHandler> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match handlers.get(event) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return 0,
            }
        };

        for handler in &targets {
            handler(data);
        }

        targets.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (EventHandler, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EventHandler = Arc::new(move |data: &Value| {
            sink.lock().unwrap().push(data.clone());
        });
        (handler, seen)
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let order = order.clone();
            registry.add(
                "student-progress",
                Arc::new(move |_: &Value| order.lock().unwrap().push(label)),
            );
        }

        assert_eq!(registry.dispatch("student-progress", &json!({})), 2);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_dispatch_unknown_event() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.dispatch("nobody-listens", &json!(null)), 0);
    }

    #[test]
    fn test_remove_single_handler() {
        let registry = SubscriptionRegistry::new();
        let (a, seen_a) = recorder();
        let (b, seen_b) = recorder();
        let id_a = registry.add("violation-alert", a);
        registry.add("violation-alert", b);

        assert_eq!(registry.remove("violation-alert", Some(id_a)), 1);
        registry.dispatch("violation-alert", &json!({"studentId": "s1"}));

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(seen_b.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_all_handlers_for_event() {
        let registry = SubscriptionRegistry::new();
        let (a, _) = recorder();
        let (b, _) = recorder();
        registry.add("teacher-intervention", a);
        registry.add("teacher-intervention", b);

        assert_eq!(registry.remove("teacher-intervention", None), 2);
        assert_eq!(registry.handler_count("teacher-intervention"), 0);
        assert_eq!(registry.remove("teacher-intervention", None), 0);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let inner = registry.clone();
        registry.add(
            "student-started-quiz",
            Arc::new(move |_: &Value| {
                inner.remove("student-started-quiz", None);
            }),
        );

        assert_eq!(registry.dispatch("student-started-quiz", &json!({})), 1);
        assert_eq!(registry.handler_count("student-started-quiz"), 0);
    }
}
