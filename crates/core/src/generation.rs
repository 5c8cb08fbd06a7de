// crates/core/src/generation.rs
//! Generation counters for discarding stale async results.
//!
//! A loop takes a [`Ticket`] when it starts. Stopping or tearing down bumps
//! the counter, so every continuation still holding the old ticket sees
//! `is_live() == false` and drops its result instead of applying it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Generation {
    counter: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for the current generation.
    pub fn ticket(&self) -> Ticket {
        Ticket {
            counter: Arc::clone(&self.counter),
            issued: self.counter.load(Ordering::Acquire),
        }
    }

    /// Invalidate every outstanding ticket. Returns the new generation.
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    counter: Arc<AtomicU64>,
    issued: u64,
}

impl Ticket {
    pub fn is_live(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.issued
    }

    pub fn generation(&self) -> u64 {
        self.issued
    }
}
