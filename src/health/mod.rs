//! Replica health tracking.
//!
//! # Data Flow
//! ```text
//! External monitor:
//!     Database::report_health(status) → state.rs (set directly)
//!
//! Passive observation (executors):
//!     driver Unreachable → record_failure
//!     successful query/probe → record_success
//!     → state.rs transitions once a threshold is crossed
//! ```
//!
//! # Design Decisions
//! - Read selection skips DOWN databases
//! - Probes still reach DOWN databases, so they double as recovery checks
//! - Consecutive counters reset on every opposite outcome

pub mod state;

pub use state::{HealthState, HealthTracker};
