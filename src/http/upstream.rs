//! Forwarding admitted requests to the upstream MCP server.
//!
//! The request goes out unchanged apart from the URI authority and two
//! annotation headers describing the authentication outcome. Without an
//! upstream the gateway answers admitted requests itself.

use std::str::FromStr;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        HeaderName, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;

use crate::security::AuthContext;

pub const X_MCP_AUTHENTICATED: HeaderName = HeaderName::from_static("x-mcp-authenticated");
pub const X_MCP_KEY_ID: HeaderName = HeaderName::from_static("x-mcp-key-id");

/// Error building the forwarder.
#[derive(Debug, thiserror::Error)]
#[error("invalid upstream address '{address}': {source}")]
pub struct UpstreamError {
    address: String,
    #[source]
    source: axum::http::uri::InvalidUri,
}

/// Where admitted traffic goes.
#[derive(Clone)]
pub struct Upstream {
    target: Option<(Authority, Client<HttpConnector, Body>)>,
}

impl Upstream {
    pub fn new(address: Option<&str>) -> Result<Self, UpstreamError> {
        let target = match address {
            Some(address) => {
                let authority = Authority::from_str(address).map_err(|source| UpstreamError {
                    address: address.to_string(),
                    source,
                })?;
                let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
                Some((authority, client))
            }
            None => None,
        };
        Ok(Self { target })
    }

    pub fn is_local(&self) -> bool {
        self.target.is_none()
    }
}

/// Handler for every gated route.
pub async fn forward_handler(State(upstream): State<Upstream>, request: Request<Body>) -> Response {
    let ctx = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_default();

    let Some((authority, client)) = &upstream.target else {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "admitted",
                "authenticated": ctx.is_authenticated(),
                "key_id": ctx.key_id(),
            })),
        )
            .into_response();
    };

    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(authority.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream URI");
            return bad_gateway();
        }
    };

    annotate(&mut parts.headers, &ctx);

    match client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %authority, error = %e, "Upstream error");
            bad_gateway()
        }
    }
}

fn annotate(headers: &mut axum::http::HeaderMap, ctx: &AuthContext) {
    headers.insert(
        X_MCP_AUTHENTICATED,
        HeaderValue::from_static(if ctx.is_authenticated() { "true" } else { "false" }),
    );
    headers.remove(X_MCP_KEY_ID);
    if let Some(value) = ctx.key_id().and_then(|id| HeaderValue::from_str(&id).ok()) {
        headers.insert(X_MCP_KEY_ID, value);
    }
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "error": "bad_gateway",
            "message": "Upstream request failed",
        })),
    )
        .into_response()
}
