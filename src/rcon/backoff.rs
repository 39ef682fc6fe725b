//! Exponential reconnect backoff.

use std::time::Duration;

/// Doubling delay sequence between a floor and a ceiling.
///
/// The first delay after a fresh connection equals the floor. Each further
/// failure doubles it until the ceiling caps it. [`Backoff::reset`] returns
/// to the floor once a handshake succeeds.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `floor`, never exceeding `ceiling`.
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Return the delay to wait now and advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Delay the next call to [`Backoff::next_delay`] would return.
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Return to the floor.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}
