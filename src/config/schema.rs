//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Physical databases, in registration order.
    pub databases: Vec<DatabaseConfig>,

    /// Read selection settings.
    pub read: ReadConfig,

    /// Mutation routing settings.
    pub mutation: MutationConfig,

    /// Passive health tracking.
    pub health: HealthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Role a database plays for mutation routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseRole {
    Primary,
    #[default]
    Replica,
}

/// One physical database connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Unique database identifier.
    pub name: String,

    /// Connection URL (e.g., "postgres://replica-1:5432/app").
    pub url: String,

    #[serde(default)]
    pub role: DatabaseRole,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            role: DatabaseRole::Replica,
        }
    }

    pub fn primary(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            role: DatabaseRole::Primary,
            ..Self::new(name, url)
        }
    }
}

/// Read algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadAlgorithmKind {
    #[default]
    Interval,
    RoundRobin,
}

/// Read selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadConfig {
    pub algorithm: ReadAlgorithmKind,

    /// Telemetry refresh period in milliseconds (interval algorithm).
    pub refresh_interval_ms: u64,

    /// Operation name the driver runs as a load probe.
    pub probe_operation: String,

    /// Full passes over the candidates before giving up.
    pub max_attempts: u32,

    /// Base delay between passes in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay between passes in milliseconds.
    pub backoff_max_ms: u64,

    /// Re-dispatches of a read whose database became unreachable.
    pub failover_attempts: u32,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            algorithm: ReadAlgorithmKind::Interval,
            refresh_interval_ms: 1000,
            probe_operation: "load".to_string(),
            max_attempts: 4,
            backoff_base_ms: 5,
            backoff_max_ms: 40,
            failover_attempts: 2,
        }
    }
}

/// Mutation strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MutationStrategy {
    #[default]
    PrimaryOnly,
    AllReplicas,
}

/// Mutation routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MutationConfig {
    pub strategy: MutationStrategy,
}

/// Passive health tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Track health from query and probe outcomes.
    pub passive: bool,

    /// Consecutive unreachable outcomes before marking a database down.
    pub unhealthy_threshold: u32,

    /// Consecutive successful outcomes before marking a database up.
    pub healthy_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            passive: true,
            unhealthy_threshold: 1,
            healthy_threshold: 2,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum time a submit waits for its result, in milliseconds.
    pub submit_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { submit_ms: 30_000 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [[databases]]
            name = "db0"
            url = "postgres://db0:5432/app"
            role = "primary"

            [[databases]]
            name = "db1"
            url = "postgres://db1:5432/app"

            [mutation]
            strategy = "all_replicas"
            "#,
        )
        .unwrap();

        assert_eq!(config.databases.len(), 2);
        assert_eq!(config.databases[0].role, DatabaseRole::Primary);
        assert_eq!(config.databases[1].role, DatabaseRole::Replica);
        assert_eq!(config.mutation.strategy, MutationStrategy::AllReplicas);
        assert_eq!(config.read.algorithm, ReadAlgorithmKind::Interval);
        assert_eq!(config.read.max_attempts, 4);
        assert_eq!(config.timeouts.submit_ms, 30_000);
    }
}
