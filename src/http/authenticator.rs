//! Request authenticator
//!
//! Stamps outgoing requests with the bearer token and identity headers.
//! Pure with respect to the session: the caller reads the store once and
//! passes the contents in, so a request is stamped with one consistent
//! snapshot even if a refresh lands mid-flight.
//!
//! Absence of a token simply means no `Authorization` header; the backend
//! rejects the call and the failure is handled downstream.

use crate::session::Identity;

/// Header carrying the numeric user id on user-scoped endpoints.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Apply `Authorization: Bearer <token>` and `X-User-Id` headers to an
/// outgoing request. Each header is omitted when its value is absent.
pub fn authenticate(
    builder: reqwest::RequestBuilder,
    token: Option<&str>,
    identity: Option<&Identity>,
) -> reqwest::RequestBuilder {
    let builder = match token {
        Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    };
    match identity {
        Some(identity) => builder.header(USER_ID_HEADER, identity.user_id),
        None => builder,
    }
}
