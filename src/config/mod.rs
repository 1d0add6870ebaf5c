//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → LoadBalancer::from_config builds databases and algorithms
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Fatal problems surface at configure time, never on first query

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BalancerConfig, DatabaseConfig, DatabaseRole, HealthConfig, MutationConfig, MutationStrategy,
    ObservabilityConfig, ReadAlgorithmKind, ReadConfig, TimeoutConfig,
};
pub use validation::ValidationError;
