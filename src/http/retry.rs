//! Retry dispatcher
//!
//! Replays one captured request with the fresh token, exactly once. The
//! replay goes straight to the network path and never re-enters the
//! refresh coordinator: if it fails with 401 again, that failure is
//! terminal and surfaces to the original caller.

use std::sync::Arc;

use reqwest::StatusCode;

use crate::config::Config;
use crate::error::ClientError;
use crate::session::SessionStore;

use super::{into_result, send_request, ApiRequest, ApiResponse};

/// Replays pending requests after a successful refresh.
#[derive(Clone)]
pub(crate) struct RetryDispatcher {
    http: reqwest::Client,
    config: Arc<Config>,
    session: SessionStore,
}

impl RetryDispatcher {
    pub(crate) fn new(http: reqwest::Client, config: Arc<Config>, session: SessionStore) -> Self {
        Self {
            http,
            config,
            session,
        }
    }

    /// Re-issue a request with the current (fresh) session snapshot.
    ///
    /// The request is marked as retried before it leaves, so nothing
    /// downstream can queue it for a second refresh.
    pub(crate) async fn replay(&self, mut request: ApiRequest) -> Result<ApiResponse, ClientError> {
        request.retried = true;
        let response = send_request(&self.http, &self.config, &self.session, &request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                "[Auth] replay of {} {} still unauthorized, giving up",
                request.method,
                request.path
            );
            return Err(ClientError::Unauthorized);
        }
        into_result(response)
    }
}
