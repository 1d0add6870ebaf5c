//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::{BalancerConfig, DatabaseConfig, DatabaseRole};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoDatabases,
    DuplicateDatabase(String),
    InvalidUrl { database: String, reason: String },
    MultiplePrimaries(Vec<String>),
    ZeroAttempts,
    ZeroRefreshInterval,
    ZeroSubmitTimeout,
    ZeroThreshold(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoDatabases => write!(f, "at least one database must be configured"),
            ValidationError::DuplicateDatabase(name) => write!(f, "duplicate database name `{}`", name),
            ValidationError::InvalidUrl { database, reason } => {
                write!(f, "database `{}` has an invalid url: {}", database, reason)
            }
            ValidationError::MultiplePrimaries(names) => {
                write!(f, "more than one primary configured: {}", names.join(", "))
            }
            ValidationError::ZeroAttempts => write!(f, "read.max_attempts must be at least 1"),
            ValidationError::ZeroRefreshInterval => write!(f, "read.refresh_interval_ms must be > 0"),
            ValidationError::ZeroSubmitTimeout => write!(f, "timeouts.submit_ms must be > 0"),
            ValidationError::ZeroThreshold(field) => write!(f, "health.{} must be at least 1", field),
        }
    }
}

/// Check the database list on its own.
pub fn validate_databases(databases: &[DatabaseConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if databases.is_empty() {
        errors.push(ValidationError::NoDatabases);
    }

    let mut seen = HashSet::new();
    for db in databases {
        if !seen.insert(db.name.as_str()) {
            errors.push(ValidationError::DuplicateDatabase(db.name.clone()));
        }
        if let Err(e) = Url::parse(&db.url) {
            errors.push(ValidationError::InvalidUrl {
                database: db.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    let primaries: Vec<String> = databases
        .iter()
        .filter(|db| db.role == DatabaseRole::Primary)
        .map(|db| db.name.clone())
        .collect();
    if primaries.len() > 1 {
        errors.push(ValidationError::MultiplePrimaries(primaries));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a full configuration.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = match validate_databases(&config.databases) {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };

    if config.read.max_attempts == 0 {
        errors.push(ValidationError::ZeroAttempts);
    }
    if config.read.refresh_interval_ms == 0 {
        errors.push(ValidationError::ZeroRefreshInterval);
    }
    if config.timeouts.submit_ms == 0 {
        errors.push(ValidationError::ZeroSubmitTimeout);
    }
    if config.health.unhealthy_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold("unhealthy_threshold"));
    }
    if config.health.healthy_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold("healthy_threshold"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
