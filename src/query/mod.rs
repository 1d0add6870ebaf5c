//! Query model and execution.
//!
//! # Data Flow
//! ```text
//! ORM layer builds Query (target, operation, kind, intent, args/kwargs)
//!     → LoadBalancer::submit assigns the correlation id
//!     → algorithm enqueues it on one or more databases
//!     → worker pops it and picks an executor:
//!         - executor.rs QueryExecutor (application queries)
//!         - executor.rs TelemetryExecutor (probe queries)
//!     → QueryOutput (serialized payload) flows back through the
//!       completion table to the waiting caller
//! ```
//!
//! # Design Decisions
//! - `intent` only selects the dispatch path; probes are marked separately
//! - Results are serialized to JSON bytes before crossing back to the caller
//! - Driver errors travel the same completion path as successes

pub mod executor;
pub mod types;

pub use executor::{Executor, PassiveHealth, QueryExecutor, TelemetryExecutor};
pub use types::{CorrelationId, Intent, OperationKind, Query, QueryOutput, QueryResult};
