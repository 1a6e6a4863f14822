//! Gonggu Client - Connectivity Core
//!
//! Client-side connectivity library for the Gonggu group-buying
//! marketplace. Two concerns live here:
//!
//! - **Authenticated requests** (`http`): every API call carries the
//!   session's bearer token; on a 401 the access token is refreshed
//!   exactly once across all concurrent callers and each failed request
//!   is replayed exactly once with the new token. When refresh itself
//!   fails, the session ends and every waiting caller is told so.
//! - **Realtime chat** (`realtime`): a single STOMP-over-websocket
//!   connection multiplexing any number of chat rooms, with bounded
//!   automatic reconnect and heartbeat-based liveness detection.
//!
//! # Module Structure
//!
//! - **`config`** - endpoint and timing configuration
//! - **`session`** - shared token + identity store, session-ended signal
//! - **`http`** - API client, request authenticator, refresh coordinator
//! - **`realtime`** - chat session manager, STOMP codec, subscriptions
//! - **`error`** - the crate-wide error type
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gonggu_client::config::Config;
//! use gonggu_client::http::{ApiClient, LoginRequest};
//! use gonggu_client::realtime::RealtimeSessionManager;
//! use gonggu_client::session::SessionStore;
//!
//! # async fn example() -> Result<(), gonggu_client::error::ClientError> {
//! let config = Config::from_env();
//! let session = SessionStore::new();
//! let api = ApiClient::new(config.clone(), session.clone())?;
//!
//! api.login(&LoginRequest {
//!     email: "user@example.com".to_string(),
//!     password: "secret".to_string(),
//! })
//! .await?;
//!
//! let chat = RealtimeSessionManager::new(config, session);
//! chat.connect().await?;
//! chat.subscribe_to_room(42, Arc::new(|frame| {
//!     println!("{}: {}", frame.sender_nickname, frame.content);
//! }))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! All handle types (`SessionStore`, `ApiClient`,
//! `RealtimeSessionManager`) are cheap clones over shared state and safe
//! to use from any task. Locks guarding that state are never held across
//! await points.

/// Endpoint and timing configuration
pub mod config;

/// Crate-wide error type
pub mod error;

/// Authenticated HTTP API client
pub mod http;

/// Realtime chat channel
pub mod realtime;

/// Session token and identity store
pub mod session;

pub use config::Config;
pub use error::ClientError;
pub use http::ApiClient;
pub use realtime::{ConnectionState, RealtimeSessionManager};
pub use session::{Identity, SessionStore};
