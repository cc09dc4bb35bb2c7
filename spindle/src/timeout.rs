//! Timeouts for the blocking waits of gates and task handles.

use std::time::Duration;

use minstant::Instant;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl Timeout {
    /// Starts the clock for this timeout.
    pub(crate) fn start(self) -> Deadline {
        match self {
            Self::Infinite => Deadline(None),
            // A duration too large to represent never expires in practice.
            Self::Duration(d) => Deadline(Instant::now().checked_add(d)),
        }
    }
}

/// A running timeout, measured against the monotonic TSC clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// Time left before the deadline.
    ///
    /// Returns `None` for an infinite wait and `Some(Duration::ZERO)` once
    /// the deadline has passed.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.0.map(|dl| {
            let now = Instant::now();
            if now >= dl {
                Duration::ZERO
            } else {
                dl.duration_since(now)
            }
        })
    }

    /// Returns `true` once a finite deadline has passed.
    pub(crate) fn expired(&self) -> bool {
        self.remaining() == Some(Duration::ZERO)
    }
}
