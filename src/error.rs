//! Admission errors surfaced to clients.
//!
//! Only two outcomes can stop a request at the gate. Both are terminal for the
//! request and map directly onto an HTTP rejection.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Reasons the gate refuses to forward a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Authentication is required and the credential is missing or unknown.
    #[error("invalid or missing API key")]
    Unauthorized,

    /// The caller exceeded its admission threshold for the current window.
    #[error("rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimited { limit: u64, retry_after: Duration },
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

/// Whole seconds until the window resets, never reported as zero.
pub(crate) fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 || secs == 0 {
        secs + 1
    } else {
        secs
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            GateError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    error: "unauthorized",
                    message: "Invalid or missing API key",
                    retry_after_secs: None,
                }),
            )
                .into_response(),
            GateError::RateLimited { limit, retry_after } => {
                let secs = retry_after_secs(retry_after);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorBody {
                        error: "rate_limited",
                        message: "Too many requests, please try again later",
                        retry_after_secs: Some(secs),
                    }),
                )
                    .into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(0u64));
                response
            }
        }
    }
}
