//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (LoadBalancer::configure):
//!     Validate databases → spawn one worker per database
//!     → spawn the refresh loop if the read algorithm needs one
//!
//! Shutdown (supervisor.rs):
//!     LoadBalancer::shutdown → fail waiting callers with Shutdown
//!     → close dispatch (drop pending queries) → broadcast stop → join tasks
//!     Dropping the balancer closes the broadcast channel, which also stops them
//! ```

pub mod supervisor;

pub use supervisor::Supervisor;
