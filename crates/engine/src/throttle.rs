// crates/engine/src/throttle.rs
//! Batched flush: coalesce repeated triggers into one execution per window.
//!
//! The throttle only tracks a deadline; the owning read loop waits on
//! [`sleep_until`] alongside its other suspension points and runs the flush
//! itself. Both throttles of a stream (output notification and persistence)
//! are the same type with different windows.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct BatchedFlush {
    window: Duration,
    deadline: Option<Instant>,
    triggers: u64,
}

impl BatchedFlush {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            triggers: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the throttle if idle. Triggers while armed do not move the
    /// deadline, so a steady stream of triggers still flushes once per window.
    pub fn trigger(&mut self) {
        self.triggers += 1;
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.window);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn take_due(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarm unconditionally, returning whether a flush was pending.
    /// Used for the final flush on terminal events and cancellation.
    pub fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Total trigger calls; used to verify coalescing.
    pub fn triggers(&self) -> u64 {
        self.triggers
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
