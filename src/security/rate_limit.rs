//! Per-identity admission limiting with fixed windows.
//!
//! Anonymous callers are partitioned by source IP, authenticated callers by
//! API key. Authenticated callers get the higher threshold. How the two
//! ceilings combine is an explicit [`LimiterComposition`].

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::{LimiterComposition, RateLimitConfig};
use crate::error::{retry_after_secs, GateError};
use crate::observability::metrics;
use crate::security::auth::AuthContext;
use crate::security::window::{Decision, WindowCounter};

/// Partition key for rate limiting.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Anonymous(IpAddr),
    Authenticated(String),
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Anonymous(ip) => write!(f, "Anonymous({ip})"),
            Identity::Authenticated(_) => write!(f, "Authenticated(..)"),
        }
    }
}

/// Request ceilings per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub anonymous: u64,
    pub authenticated: u64,
}

/// One independent set of window counters.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    counters: DashMap<Identity, WindowCounter>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            counters: DashMap::new(),
        }
    }

    /// Count one request for `identity`. The entry guard holds the shard lock,
    /// so concurrent requests from one identity cannot under-count.
    pub fn check_at(&self, identity: Identity, threshold: u64, now: Instant) -> Decision {
        let mut counter = self
            .counters
            .entry(identity)
            .or_insert_with(|| WindowCounter::new(now));
        counter.hit(now, self.window, threshold)
    }

    /// Drop counters whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.counters.len();
        let window = self.window;
        self.counters.retain(|_, c| !c.is_expired(now, window));
        before.saturating_sub(self.counters.len())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// The gate's admission policy: two limiters plus a composition rule.
#[derive(Debug)]
pub struct AdmissionLimiter {
    enabled: bool,
    composition: LimiterComposition,
    thresholds: Thresholds,
    anonymous: FixedWindowLimiter,
    authenticated: FixedWindowLimiter,
}

impl AdmissionLimiter {
    pub fn new(
        window: Duration,
        thresholds: Thresholds,
        composition: LimiterComposition,
    ) -> Self {
        Self {
            enabled: true,
            composition,
            thresholds,
            anonymous: FixedWindowLimiter::new(window),
            authenticated: FixedWindowLimiter::new(window),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut limiter = Self::new(
            Duration::from_secs(config.window_secs),
            Thresholds {
                anonymous: config.anonymous_max,
                authenticated: config.authenticated_max,
            },
            config.composition,
        );
        limiter.enabled = config.enabled;
        limiter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn admit(&self, ctx: &AuthContext, ip: IpAddr) -> Result<Option<Decision>, GateError> {
        self.admit_at(ctx, ip, Instant::now())
    }

    /// Decide one request. `Ok(None)` means limiting is disabled.
    pub fn admit_at(
        &self,
        ctx: &AuthContext,
        ip: IpAddr,
        now: Instant,
    ) -> Result<Option<Decision>, GateError> {
        if !self.enabled {
            return Ok(None);
        }

        let key = ctx
            .credential()
            .map(|c| Identity::Authenticated(c.as_str().to_string()));

        let decision = match (self.composition, key) {
            (_, None) => self.charge_anonymous(ip, now)?,
            (LimiterComposition::Tiered, Some(key)) => self.charge_authenticated(key, now)?,
            (LimiterComposition::Stacked, Some(key)) => {
                let ip_decision = self.charge_anonymous(ip, now)?;
                let key_decision = self.charge_authenticated(key, now)?;
                stricter(ip_decision, key_decision)
            }
        };
        Ok(Some(decision))
    }

    fn charge_anonymous(&self, ip: IpAddr, now: Instant) -> Result<Decision, GateError> {
        let decision =
            self.anonymous
                .check_at(Identity::Anonymous(ip), self.thresholds.anonymous, now);
        reject_if_exceeded(decision, "anonymous")
    }

    fn charge_authenticated(&self, key: Identity, now: Instant) -> Result<Decision, GateError> {
        let decision = self
            .authenticated
            .check_at(key, self.thresholds.authenticated, now);
        reject_if_exceeded(decision, "authenticated")
    }

    /// Evict idle counters from both limiters.
    pub fn sweep(&self, now: Instant) -> usize {
        let removed = self.anonymous.sweep(now) + self.authenticated.sweep(now);
        metrics::set_limiter_identities(self.tracked_identities());
        removed
    }

    pub fn tracked_identities(&self) -> usize {
        self.anonymous.len() + self.authenticated.len()
    }
}

fn reject_if_exceeded(decision: Decision, tier: &'static str) -> Result<Decision, GateError> {
    match decision {
        Decision::Reject { limit, retry_after } => {
            metrics::record_rate_limited(tier);
            Err(GateError::RateLimited { limit, retry_after })
        }
        admitted => Ok(admitted),
    }
}

/// Of two admissions, report the one with less headroom.
fn stricter(a: Decision, b: Decision) -> Decision {
    match (a, b) {
        (
            Decision::Admit { remaining: ra, .. },
            Decision::Admit { remaining: rb, .. },
        ) if rb < ra => b,
        _ => a,
    }
}

/// Periodically evict idle counters until shutdown.
pub fn spawn_sweeper(
    limiter: Arc<AdmissionLimiter>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep(Instant::now());
                    if removed > 0 {
                        tracing::debug!(
                            removed,
                            remaining = limiter.tracked_identities(),
                            "Evicted idle rate limit counters"
                        );
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

/// Middleware: admit or reject based on the caller's identity.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<AdmissionLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_default();

    match limiter.admit(&ctx, addr.ip()) {
        Ok(decision) => {
            let mut response = next.run(request).await;
            if let Some(Decision::Admit {
                limit,
                remaining,
                reset_after,
            }) = decision
            {
                let headers = response.headers_mut();
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
                headers.insert(
                    "x-ratelimit-reset",
                    HeaderValue::from(retry_after_secs(reset_after)),
                );
            }
            response
        }
        Err(err) => {
            tracing::warn!(
                client = %addr.ip(),
                authenticated = ctx.is_authenticated(),
                key_id = ?ctx.key_id(),
                "Rate limit exceeded"
            );
            err.into_response()
        }
    }
}
