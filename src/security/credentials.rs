//! Bearer credential extraction.
//!
//! A missing or malformed `Authorization` header is not an error: it simply
//! means the caller presented no credential.

use std::fmt;

use axum::http::{header::AUTHORIZATION, HeaderMap};

const BEARER: &str = "bearer";

/// Length of the visible part of a key id.
const KEY_ID_VISIBLE: usize = 8;

/// An opaque API key presented by a caller.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated, non-secret rendering suitable for logs and annotations.
    pub fn key_id(&self) -> String {
        let visible: String = self.0.chars().take(KEY_ID_VISIBLE).collect();
        if self.0.chars().count() <= KEY_ID_VISIBLE {
            "...".to_string()
        } else {
            format!("{visible}...")
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.key_id()).finish()
    }
}

/// Pull a bearer token out of the `Authorization` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = token.trim_start();
    if token.is_empty() {
        return None;
    }
    Some(Credential::new(token))
}
