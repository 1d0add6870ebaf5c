//! Client-side read/write load balancer over database replicas.
//!
//! One [`LoadBalancer`] owns N physical database connections and routes
//! each query to a chosen replica: reads by a [`ReadAlgorithm`], mutations
//! (create/update/delete) by a [`MutationAlgorithm`]. Callers see a single
//! call that returns the result of their own query.

pub mod config;
pub mod driver;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod query;
pub mod resilience;

pub use config::BalancerConfig;
pub use driver::{Driver, MemoryDriver};
pub use error::BalancerError;
pub use health::HealthState;
pub use load_balancer::database::Database;
pub use load_balancer::{configure, BalancerOptions, LoadBalancer, MutationAlgorithm, ReadAlgorithm};
pub use query::{Intent, OperationKind, Query, QueryOutput, QueryResult};
