//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! All errors are collected, not just the first one.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
        if config.admin.request_timeout_secs == 0 {
            errors.push(ValidationError::new("admin.request_timeout_secs", "must be > 0"));
        }
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be > 0"));
    }
    if config.breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.reset_timeout_ms", "must be > 0"));
    }

    if config.resources.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("resources.probe_timeout_ms", "must be > 0"));
    }

    if config.queries.capacity == 0 {
        errors.push(ValidationError::new("queries.capacity", "must be > 0"));
    }
    if config.queries.recent_window > config.queries.capacity {
        errors.push(ValidationError::new(
            "queries.recent_window",
            "must not exceed queries.capacity",
        ));
    }

    if config.logging.capacity == 0 {
        errors.push(ValidationError::new("logging.capacity", "must be > 0"));
    }

    if config.navigation.storage_key.is_empty() {
        errors.push(ValidationError::new("navigation.storage_key", "must not be empty"));
    }
    if config.navigation.max_edges_per_route == 0 {
        errors.push(ValidationError::new("navigation.max_edges_per_route", "must be > 0"));
    }
    if config.navigation.window_days == 0 {
        errors.push(ValidationError::new("navigation.window_days", "must be > 0"));
    }

    if config.recovery.enabled && config.recovery.error_threshold == 0 {
        errors.push(ValidationError::new("recovery.error_threshold", "must be > 0"));
    }

    if config.entropy.batch_size == 0 {
        errors.push(ValidationError::new("entropy.batch_size", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
