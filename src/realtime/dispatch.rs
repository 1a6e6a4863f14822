//! Message dispatcher
//!
//! Decodes inbound MESSAGE frames and routes each to the handler
//! registered for its room, synchronously and in arrival order. Frames
//! for rooms with no subscription are dropped (at-most-once, best-effort
//! delivery; nothing is buffered for a handler that does not exist).
//! A malformed frame is logged and skipped; it never aborts processing of
//! the frames behind it.

use crate::realtime::message::InboundFrame;
use crate::realtime::stomp::Frame;
use crate::realtime::subscription::SubscriptionMultiplexer;
use crate::realtime::TOPIC_PREFIX;

/// Room id encoded in a `/topic/chat/{roomId}` destination.
pub(crate) fn room_id_from_destination(destination: &str) -> Option<i64> {
    destination.strip_prefix(TOPIC_PREFIX)?.parse().ok()
}

/// Route one inbound frame to its room handler.
pub(crate) fn dispatch(subscriptions: &SubscriptionMultiplexer, frame: &Frame) {
    let Some(destination) = frame.header("destination") else {
        tracing::warn!("[Realtime] dropping frame without destination header");
        return;
    };
    let Some(room_id) = room_id_from_destination(destination) else {
        tracing::warn!(
            "[Realtime] dropping frame with unrecognized destination: {}",
            destination
        );
        return;
    };

    let inbound: InboundFrame = match serde_json::from_str(frame.body()) {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!(
                "[Realtime] dropping malformed frame for room {}: {}",
                room_id,
                err
            );
            return;
        }
    };

    let Some(handler) = subscriptions.handler_for(room_id) else {
        tracing::debug!("[Realtime] no subscriber for room {}, dropping", room_id);
        return;
    };
    handler(inbound);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::stomp::Command;
    use std::sync::{Arc, Mutex};

    fn message_frame(room_id: i64, content: &str) -> Frame {
        Frame::new(Command::Message)
            .with_header("destination", format!("/topic/chat/{}", room_id))
            .with_body(format!(
                r#"{{"roomId":{room_id},"senderId":1,"senderNickname":"bo","content":"{content}","timestamp":"2026-01-01T00:00:00Z"}}"#
            ))
    }

    fn recording(multiplexer: &SubscriptionMultiplexer, room_id: i64) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        multiplexer.register(
            room_id,
            Arc::new(move |frame| sink.lock().unwrap().push(frame.content)),
        );
        seen
    }

    #[test]
    fn test_room_id_parsing() {
        assert_eq!(room_id_from_destination("/topic/chat/42"), Some(42));
        assert_eq!(room_id_from_destination("/topic/chat/abc"), None);
        assert_eq!(room_id_from_destination("/queue/other"), None);
    }

    #[test]
    fn test_dispatch_preserves_arrival_order() {
        let multiplexer = SubscriptionMultiplexer::new();
        let seen = recording(&multiplexer, 7);

        dispatch(&multiplexer, &message_frame(7, "m1"));
        dispatch(&multiplexer, &message_frame(7, "m2"));
        dispatch(&multiplexer, &message_frame(7, "m3"));

        assert_eq!(*seen.lock().unwrap(), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_malformed_frame_does_not_abort_later_frames() {
        let multiplexer = SubscriptionMultiplexer::new();
        let seen = recording(&multiplexer, 7);

        dispatch(&multiplexer, &message_frame(7, "m1"));
        let broken = Frame::new(Command::Message)
            .with_header("destination", "/topic/chat/7")
            .with_body("{not json");
        dispatch(&multiplexer, &broken);
        dispatch(&multiplexer, &message_frame(7, "m3"));

        assert_eq!(*seen.lock().unwrap(), vec!["m1", "m3"]);
    }

    #[test]
    fn test_unsubscribed_room_is_dropped() {
        let multiplexer = SubscriptionMultiplexer::new();
        let seen = recording(&multiplexer, 7);

        dispatch(&multiplexer, &message_frame(8, "elsewhere"));
        assert!(seen.lock().unwrap().is_empty());
    }
}
