//! Realtime chat channel
//!
//! STOMP over websocket against the marketplace chat broker. The
//! [`RealtimeSessionManager`] owns the single physical connection and its
//! state machine; rooms multiplex over it as STOMP subscriptions on
//! `/topic/chat/{roomId}` and publish to `/app/chat/{roomId}`.

pub mod manager;
pub mod message;
pub mod stomp;
pub mod subscription;
pub mod transport;

mod dispatch;

pub use manager::{ConnectionState, RealtimeSessionManager};
pub use message::{ChatMessage, InboundFrame};
pub use stomp::{Command, Frame};
pub use subscription::{MessageHandler, SubscriptionMultiplexer};
pub use transport::{Connection, InboundEvent, Transport, WsTransport};

/// Broker destination prefix rooms are received on.
pub const TOPIC_PREFIX: &str = "/topic/chat/";

/// Application destination prefix rooms are published to.
pub const APP_PREFIX: &str = "/app/chat/";
