//! Subscription multiplexer
//!
//! Maps chat room ids to transport-level subscriptions over the single
//! physical connection. Subscribing to a room that already has a handler
//! is a no-op (the first handler wins); a full disconnect invalidates
//! every mapping at once, without transport-level unsubscribes, since the
//! transport is already gone. Callers re-subscribe explicitly after
//! reconnecting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::realtime::message::InboundFrame;

/// Callback invoked with each inbound message for a subscribed room.
pub type MessageHandler = Arc<dyn Fn(InboundFrame) + Send + Sync>;

struct RoomSubscription {
    subscription_id: String,
    handler: MessageHandler,
}

/// Room id → active subscription registry.
#[derive(Default)]
pub struct SubscriptionMultiplexer {
    rooms: Mutex<HashMap<i64, RoomSubscription>>,
}

impl SubscriptionMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a room. Returns the new transport
    /// subscription id, or `None` when the room already has one (the
    /// caller must not issue a second SUBSCRIBE).
    pub fn register(&self, room_id: i64, handler: MessageHandler) -> Option<String> {
        let mut rooms = self.rooms.lock().expect("subscription map poisoned");
        if rooms.contains_key(&room_id) {
            return None;
        }
        let subscription_id = format!("sub-{}", room_id);
        rooms.insert(
            room_id,
            RoomSubscription {
                subscription_id: subscription_id.clone(),
                handler,
            },
        );
        Some(subscription_id)
    }

    /// Remove a room's subscription, returning its transport subscription
    /// id if one existed.
    pub fn remove(&self, room_id: i64) -> Option<String> {
        self.rooms
            .lock()
            .expect("subscription map poisoned")
            .remove(&room_id)
            .map(|subscription| subscription.subscription_id)
    }

    /// Handler registered for a room, if any.
    pub fn handler_for(&self, room_id: i64) -> Option<MessageHandler> {
        self.rooms
            .lock()
            .expect("subscription map poisoned")
            .get(&room_id)
            .map(|subscription| subscription.handler.clone())
    }

    /// Drop every mapping (connection is gone; handles are invalid).
    pub fn clear(&self) {
        let mut rooms = self.rooms.lock().expect("subscription map poisoned");
        if !rooms.is_empty() {
            tracing::debug!("[Realtime] clearing {} subscription(s)", rooms.len());
        }
        rooms.clear();
    }

    /// Whether a room currently has a subscription.
    pub fn contains(&self, room_id: i64) -> bool {
        self.rooms
            .lock()
            .expect("subscription map poisoned")
            .contains_key(&room_id)
    }

    /// Currently subscribed room ids.
    pub fn rooms(&self) -> Vec<i64> {
        self.rooms
            .lock()
            .expect("subscription map poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.rooms.lock().expect("subscription map poisoned").len()
    }

    /// True when no room is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_handler() -> MessageHandler {
        Arc::new(|_frame| {})
    }

    #[test]
    fn test_register_is_idempotent() {
        let multiplexer = SubscriptionMultiplexer::new();
        assert_eq!(multiplexer.register(42, noop_handler()).as_deref(), Some("sub-42"));
        assert_eq!(multiplexer.register(42, noop_handler()), None);
        assert_eq!(multiplexer.len(), 1);
    }

    #[test]
    fn test_first_handler_wins() {
        let multiplexer = SubscriptionMultiplexer::new();
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let first = first_calls.clone();
        multiplexer.register(7, Arc::new(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        }));
        let second = second_calls.clone();
        multiplexer.register(7, Arc::new(move |_| {
            second.fetch_add(1, Ordering::SeqCst);
        }));

        let handler = multiplexer.handler_for(7).unwrap();
        handler(InboundFrame {
            room_id: 7,
            sender_id: 1,
            sender_nickname: "bo".to_string(),
            content: "hi".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        });

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let multiplexer = SubscriptionMultiplexer::new();
        assert_eq!(multiplexer.remove(1), None);

        multiplexer.register(1, noop_handler());
        assert_eq!(multiplexer.remove(1).as_deref(), Some("sub-1"));
        assert!(multiplexer.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let multiplexer = SubscriptionMultiplexer::new();
        multiplexer.register(1, noop_handler());
        multiplexer.register(2, noop_handler());
        multiplexer.clear();
        assert!(multiplexer.is_empty());
        assert!(multiplexer.handler_for(1).is_none());
    }
}
