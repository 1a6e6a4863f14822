//! Refresh coordinator
//!
//! Single-flight controller around token refresh. Invariants:
//!
//! - At most one refresh call is in flight system-wide. The `refreshing`
//!   flag lives behind a sync mutex that is never held across an await.
//! - Every request that fails while a refresh is in flight is queued and
//!   settled exactly once: resolved by a replay against the new token,
//!   or rejected with the refresh error.
//! - A request is never replayed more than once automatically; replays are
//!   marked before they leave (see [`super::retry`]).
//!
//! The refresh call itself goes straight to the network and bypasses the
//! coordinator, so it can never re-enter it. The flag is released through
//! a scoped guard on every exit path, including panics; any waiter still
//! queued at that point is rejected rather than leaked.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::config::Config;
use crate::error::ClientError;
use crate::session::SessionStore;

use super::retry::RetryDispatcher;
use super::{bearer_token, ApiRequest, ApiResponse, REFRESH_PATH};

/// Tokens with this prefix belong to seeded demo accounts and have no
/// refresh credential behind them; refreshing is pointless, so they
/// short-circuit straight to failure without a round-trip.
const NON_REFRESHABLE_PREFIX: &str = "test-token";

/// One request waiting for the in-flight refresh to settle it.
struct PendingRequest {
    request: ApiRequest,
    settle: oneshot::Sender<Result<ApiResponse, ClientError>>,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
}

struct CoordinatorInner {
    http: reqwest::Client,
    config: Arc<Config>,
    session: SessionStore,
    retry: RetryDispatcher,
    state: Mutex<RefreshState>,
}

/// Single-flight token refresh coordinator. Cheap to clone; clones share
/// the flag and the queue.
#[derive(Clone)]
pub(crate) struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

/// Releases the single-flight flag on every exit path. Disarmed once the
/// normal settle path has already cleared the flag under its final lock;
/// if it fires (early return or panic), any stragglers in the queue are
/// rejected so no waiter hangs forever.
struct FlightGuard {
    inner: Arc<CoordinatorInner>,
    armed: bool,
}

impl FlightGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state.lock().expect("refresh state poisoned");
        state.refreshing = false;
        for pending in state.queue.drain(..) {
            let _ = pending
                .settle
                .send(Err(ClientError::refresh_failed("refresh aborted")));
        }
    }
}

impl RefreshCoordinator {
    pub(crate) fn new(http: reqwest::Client, config: Arc<Config>, session: SessionStore) -> Self {
        let retry = RetryDispatcher::new(http.clone(), config.clone(), session.clone());
        Self {
            inner: Arc::new(CoordinatorInner {
                http,
                config,
                session,
                retry,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Recover a request that failed with a stale token.
    ///
    /// If a refresh is already in flight, the request joins the queue and
    /// this future resolves when that refresh settles it. Otherwise this
    /// call becomes the trigger: it performs the one refresh, replays
    /// itself first (it failed first), then drains the queue in FIFO
    /// order.
    pub(crate) async fn recover(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let waiter = {
            let mut state = self.inner.state.lock().expect("refresh state poisoned");
            if state.refreshing {
                let (settle, waiter) = oneshot::channel();
                state.queue.push_back(PendingRequest { request: request.clone(), settle });
                Some(waiter)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(waiter) = waiter {
            tracing::debug!(
                "[Refresh] refresh in flight, queueing {} {}",
                request.method,
                request.path
            );
            return match waiter.await {
                Ok(outcome) => outcome,
                Err(_) => Err(ClientError::refresh_failed("refresh coordinator dropped")),
            };
        }

        let mut guard = FlightGuard {
            inner: self.inner.clone(),
            armed: true,
        };

        match self.perform_refresh().await {
            Ok(token) => {
                self.inner.session.set_token(token);
                tracing::info!("[Refresh] token refreshed, replaying failed requests");

                // Trigger first: it failed first, so replay issuance order
                // matches failure order.
                let outcome = self.inner.retry.replay(request).await;
                self.drain_resolving().await;
                guard.disarm();
                outcome
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!("[Refresh] token refresh failed: {}", reason);
                self.drain_rejecting(&reason);
                guard.disarm();
                self.inner.session.expire();
                Err(err)
            }
        }
    }

    /// Pop-replay-settle until the queue is empty, then clear the flag in
    /// the same critical section as the emptiness check so a late 401
    /// cannot slip in unsettled.
    async fn drain_resolving(&self) {
        loop {
            let next = {
                let mut state = self.inner.state.lock().expect("refresh state poisoned");
                match state.queue.pop_front() {
                    Some(pending) => Some(pending),
                    None => {
                        state.refreshing = false;
                        None
                    }
                }
            };
            let Some(pending) = next else { break };
            let outcome = self.inner.retry.replay(pending.request).await;
            let _ = pending.settle.send(outcome);
        }
    }

    /// Reject every waiter with the refresh error, then clear the flag.
    fn drain_rejecting(&self, reason: &str) {
        let mut state = self.inner.state.lock().expect("refresh state poisoned");
        for pending in state.queue.drain(..) {
            let _ = pending
                .settle
                .send(Err(ClientError::refresh_failed(reason.to_string())));
        }
        state.refreshing = false;
    }

    /// The one refresh network call. Bypasses the coordinator and the
    /// authenticator: the credential travels as a cookie, and the new
    /// token comes back in the `Authorization` response header.
    async fn perform_refresh(&self) -> Result<String, ClientError> {
        if let Some(token) = self.inner.session.token() {
            if token.starts_with(NON_REFRESHABLE_PREFIX) {
                return Err(ClientError::refresh_failed(
                    "placeholder token is not refreshable",
                ));
            }
        }

        let url = self.inner.config.api_url(REFRESH_PATH);
        let response = self.inner.http.post(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::refresh_failed(format!(
                "refresh endpoint returned {}",
                status
            )));
        }

        bearer_token(response.headers()).ok_or_else(|| {
            ClientError::refresh_failed("refresh response missing Authorization header")
        })
    }
}
