//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges, addresses and the
//! key set. Returns every problem found, not just the first.

use std::net::SocketAddr;

use crate::config::schema::{AuthMode, GatewayConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("rate_limit.authenticated_max ({authenticated}) is lower than rate_limit.anonymous_max ({anonymous})")]
    InvertedThresholds { anonymous: u64, authenticated: u64 },

    #[error("auth.api_keys[{0}] is empty")]
    EmptyKey(usize),

    #[error("auth.api_keys[{index}] does not start with prefix '{prefix}'")]
    MissingPrefix { index: usize, prefix: String },

    #[error("auth.mode is 'required' but no API keys are configured")]
    NoKeys,
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );
    if let Some(upstream) = &config.upstream.address {
        check_address(&mut errors, "upstream.address", upstream);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        if rl.window_secs == 0 {
            errors.push(ValidationError::Zero("rate_limit.window_secs"));
        }
        if rl.anonymous_max == 0 {
            errors.push(ValidationError::Zero("rate_limit.anonymous_max"));
        }
        if rl.authenticated_max == 0 {
            errors.push(ValidationError::Zero("rate_limit.authenticated_max"));
        }
        if rl.sweep_interval_secs == 0 {
            errors.push(ValidationError::Zero("rate_limit.sweep_interval_secs"));
        }
        if rl.authenticated_max < rl.anonymous_max {
            errors.push(ValidationError::InvertedThresholds {
                anonymous: rl.anonymous_max,
                authenticated: rl.authenticated_max,
            });
        }
    }

    let auth = &config.auth;
    for (index, key) in auth.api_keys.iter().enumerate() {
        if key.trim().is_empty() {
            errors.push(ValidationError::EmptyKey(index));
        } else if !auth.key_prefix.is_empty() && !key.starts_with(&auth.key_prefix) {
            errors.push(ValidationError::MissingPrefix {
                index,
                prefix: auth.key_prefix.clone(),
            });
        }
    }
    if auth.mode == AuthMode::Required && auth.api_keys.is_empty() {
        errors.push(ValidationError::NoKeys);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
