//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: `/health` plus the gated catch-all
//! - Wire up middleware (request ID, request log, timeout, auth, rate limit)
//! - Bind server to listener with peer addresses available to the gate
//! - Apply hot-reloaded key sets
//! - Run the idle counter sweeper

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AuthMode, GatewayConfig};
use crate::http::request::{request_log_middleware, MakeRequestUuidV4};
use crate::http::upstream::{forward_handler, Upstream, UpstreamError};
use crate::security::auth::auth_middleware;
use crate::security::rate_limit::{rate_limit_middleware, spawn_sweeper};
use crate::security::{AdmissionLimiter, Authenticator, KeyStore};

/// The gateway HTTP server.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    keys: Arc<KeyStore>,
    limiter: Arc<AdmissionLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given (validated) configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, UpstreamError> {
        let keys = Arc::new(KeyStore::new(config.auth.api_keys.iter().cloned()));
        let authenticator = Arc::new(Authenticator::new(keys.clone(), config.auth.mode));
        let limiter = Arc::new(AdmissionLimiter::from_config(&config.rate_limit));
        let upstream = Upstream::new(config.upstream.address.as_deref())?;

        if upstream.is_local() {
            tracing::warn!("No upstream configured; admitted requests are answered locally");
        }

        let router = Self::build_router(&config, authenticator, limiter.clone(), upstream);
        Ok(Self {
            router,
            config,
            keys,
            limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// On the gated router later layers wrap earlier ones, so auth runs before
    /// the limiter. The shared stack runs top to bottom: request IDs are
    /// assigned before anything logs, and the request log sits outside the
    /// timeout so timed-out requests are still recorded.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        authenticator: Arc<Authenticator>,
        limiter: Arc<AdmissionLimiter>,
        upstream: Upstream,
    ) -> Router {
        let gated = Router::new()
            .route("/", any(forward_handler))
            .route("/{*path}", any(forward_handler))
            .with_state(upstream)
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(authenticator, auth_middleware));

        Router::new()
            .route("/health", get(health_handler))
            .merge(gated)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(middleware::from_fn(request_log_middleware))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// `config_updates` delivers reloaded configurations; the key set is
    /// swapped in immediately.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            auth_mode = ?self.config.auth.mode,
            keys = self.keys.len(),
            rate_limit_enabled = self.limiter.is_enabled(),
            "HTTP server starting"
        );

        let sweeper = self.limiter.is_enabled().then(|| {
            spawn_sweeper(
                self.limiter.clone(),
                Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
                shutdown.resubscribe(),
            )
        });

        let keys = self.keys.clone();
        let current = self.config.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_reload(&keys, &current, &new_config);
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap in reloaded keys. The live auth mode is the startup one, so an empty
/// key set is refused while it is `required`.
fn apply_reload(keys: &KeyStore, current: &GatewayConfig, new_config: &GatewayConfig) {
    if current.auth.mode == AuthMode::Required && new_config.auth.api_keys.is_empty() {
        tracing::warn!(
            kept = keys.len(),
            "Reloaded config has no API keys while auth is required; keeping current keys"
        );
    } else {
        keys.replace(new_config.auth.api_keys.iter().cloned());
    }

    if new_config.auth.mode != current.auth.mode
        || new_config.rate_limit.window_secs != current.rate_limit.window_secs
        || new_config.rate_limit.anonymous_max != current.rate_limit.anonymous_max
        || new_config.rate_limit.authenticated_max != current.rate_limit.authenticated_max
        || new_config.rate_limit.composition != current.rate_limit.composition
        || new_config.rate_limit.enabled != current.rate_limit.enabled
    {
        tracing::warn!("Auth mode and rate limit changes take effect after restart");
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
