//! API key authentication.
//!
//! Validates the bearer credential against the known key set. In required mode
//! an absent or unknown key stops the request with 401; in optional mode the
//! request always proceeds and is only annotated.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::AuthMode;
use crate::error::GateError;
use crate::observability::metrics;
use crate::security::credentials::{extract_bearer, Credential};

/// The set of known API keys, replaceable at runtime.
#[derive(Debug)]
pub struct KeyStore {
    keys: ArcSwap<HashSet<String>>,
}

impl KeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: ArcSwap::from_pointee(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn contains(&self, credential: &Credential) -> bool {
        self.keys.load().contains(credential.as_str())
    }

    /// Atomically swap in a new key set.
    pub fn replace<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: HashSet<String> = keys.into_iter().map(Into::into).collect();
        tracing::info!(count = keys.len(), "API key set replaced");
        self.keys.store(Arc::new(keys));
    }

    pub fn len(&self) -> usize {
        self.keys.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Authentication outcome attached to every request that passes the gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    credential: Option<Credential>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self { credential: None }
    }

    pub fn authenticated(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Non-secret identifier of the validated key.
    pub fn key_id(&self) -> Option<String> {
        self.credential.as_ref().map(Credential::key_id)
    }

    /// The validated key itself, for partitioning only. Never log this.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

/// Checks credentials against a [`KeyStore`].
#[derive(Debug, Clone)]
pub struct Authenticator {
    keys: Arc<KeyStore>,
    mode: AuthMode,
}

impl Authenticator {
    pub fn new(keys: Arc<KeyStore>, mode: AuthMode) -> Self {
        Self { keys, mode }
    }

    /// Required mode: fail unless a known credential is present.
    pub fn require(&self, credential: Option<&Credential>) -> Result<AuthContext, GateError> {
        match credential {
            Some(cred) if self.keys.contains(cred) => Ok(AuthContext::authenticated(cred.clone())),
            _ => Err(GateError::Unauthorized),
        }
    }

    /// Optional mode: validate if present, never fail.
    pub fn optional(&self, credential: Option<&Credential>) -> AuthContext {
        match credential {
            Some(cred) if self.keys.contains(cred) => AuthContext::authenticated(cred.clone()),
            _ => AuthContext::anonymous(),
        }
    }

    /// Run whichever mode is configured.
    pub fn authenticate(&self, credential: Option<&Credential>) -> Result<AuthContext, GateError> {
        match self.mode {
            AuthMode::Required => self.require(credential),
            AuthMode::Optional => Ok(self.optional(credential)),
        }
    }
}

/// Middleware: authenticate and attach [`AuthContext`] to the request.
pub async fn auth_middleware(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credential = extract_bearer(request.headers());
    let presented = credential.is_some();

    match auth.authenticate(credential.as_ref()) {
        Ok(ctx) => {
            let outcome = match (ctx.is_authenticated(), presented) {
                (true, _) => "authenticated",
                (false, true) => "invalid",
                (false, false) => "anonymous",
            };
            metrics::record_auth(outcome);
            if outcome == "invalid" {
                tracing::debug!("Unknown API key presented; continuing as anonymous");
            }
            request.extensions_mut().insert(ctx.clone());
            let mut response = next.run(request).await;
            // Outer layers (request logging) only see the response.
            response.extensions_mut().insert(ctx);
            response
        }
        Err(err) => {
            metrics::record_auth(if presented { "invalid" } else { "missing" });
            tracing::warn!(
                path = %request.uri().path(),
                key_id = ?credential.as_ref().map(Credential::key_id),
                "Authentication failed"
            );
            err.into_response()
        }
    }
}
