//! Database health state machine.
//!
//! # State Transitions
//! ```text
//! Up → Down: consecutive failures >= unhealthy_threshold
//! Down → Up: consecutive successes >= healthy_threshold
//! ```

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Health of one database.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Up = 1,
    Down = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            2 => HealthState::Down,
            _ => HealthState::Up,
        }
    }
}

/// Lock-free health flag with hysteresis counters.
#[derive(Debug)]
pub struct HealthTracker {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl HealthTracker {
    pub fn new(initial: HealthState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_up(&self) -> bool {
        self.state() == HealthState::Up
    }

    /// Force the state, clearing the counters. Returns the previous state.
    pub fn set(&self, state: HealthState) -> HealthState {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        HealthState::from(self.state.swap(state as u8, Ordering::AcqRel))
    }

    /// Record a successful call. Returns true when this flipped the state to Up.
    pub fn record_success(&self, healthy_threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.is_up() {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return self.state.swap(HealthState::Up as u8, Ordering::AcqRel) != HealthState::Up as u8;
        }
        false
    }

    /// Record an unreachable call. Returns true when this flipped the state to Down.
    pub fn record_failure(&self, unhealthy_threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if !self.is_up() {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return self.state.swap(HealthState::Down as u8, Ordering::AcqRel) != HealthState::Down as u8;
        }
        false
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthState::Up)
    }
}
