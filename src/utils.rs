use std::time::{Duration, Instant};

/// A started countdown against an optional deadline.
///
/// `Timer::unlimited()` never expires; the search uses it when no time limit
/// is given so the hot path carries a single check either way.
#[derive(Clone, Copy, Debug)]
pub struct Timer {
    duration: Option<Duration>,
    start: Instant,
}

impl Timer {
    pub fn started(duration: Duration) -> Self {
        Timer {
            duration: Some(duration),
            start: Instant::now(),
        }
    }

    pub fn unlimited() -> Self {
        Timer {
            duration: None,
            start: Instant::now(),
        }
    }

    pub fn is_over(&self) -> bool {
        match self.duration {
            Some(d) => d <= self.start.elapsed(),
            None => false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before expiry, or `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.duration.map(|d| d.saturating_sub(self.start.elapsed()))
    }
}
