//! Chat message payloads
//!
//! Wire shapes for the chat channel. Field names are camelCase on the
//! wire (the backend is a Spring-style service); timestamps are RFC3339
//! strings. Outbound messages carry their text under `message`, inbound
//! envelopes under `content`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::session::Identity;

/// Outbound chat message, published to `/app/chat/{roomId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: i64,
    pub sender_id: i64,
    pub sender_nickname: String,
    pub message: String,
    /// RFC3339 timestamp, stamped at construction
    pub timestamp: String,
}

impl ChatMessage {
    /// Build a message from the current identity, stamped with now().
    pub fn new(room_id: i64, identity: &Identity, message: impl Into<String>) -> Self {
        Self {
            room_id,
            sender_id: identity.user_id,
            sender_nickname: identity.nickname.clone(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Decoded inbound message envelope from `/topic/chat/{roomId}`.
///
/// Ephemeral: handed to the room's subscription handler and not retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub room_id: i64,
    pub sender_id: i64,
    pub sender_nickname: String,
    pub content: String,
    pub timestamp: String,
}
