//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Read selection pass finds no eligible database:
//!     → backoff.rs (wait with exponential delay + jitter)
//!     → next pass, until max_attempts → RoutingExhausted
//!
//! Submit waiting on its mailbox:
//!     → tokio::time::timeout → SubmitTimeout, id abandoned
//! ```
//!
//! # Design Decisions
//! - Every wait is bounded; no selection loop spins forever
//! - Jittered backoff keeps concurrent callers from retrying in lockstep

pub mod backoff;

pub use backoff::RetryPolicy;
