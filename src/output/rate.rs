//! Windowed rate tracking
//!
//! The rate is the sum of values recorded inside a trailing window divided by
//! the window length. Entries straddling the window edge are not
//! interpolated, so the figure is a smoothing approximation, not an exact
//! sliding average.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default trailing window for throughput figures
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Rolling accumulator of `(timestamp, value)` samples
#[derive(Debug, Clone)]
pub struct WindowedRate {
    window: Duration,
    entries: VecDeque<(Instant, f64)>,
}

impl WindowedRate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    /// Records a sample at `at`
    ///
    /// Instants must be non-decreasing across calls. Samples older than the
    /// window are dropped here as well as on read, so a counter that is
    /// written but never reported stays bounded.
    pub fn record_at(&mut self, at: Instant, value: f64) {
        self.prune(at);
        self.entries.push_back((at, value));
    }

    /// Events per second over the trailing window ending at `now`
    pub fn rate_at(&mut self, now: Instant) -> f64 {
        self.prune(now);
        let sum: f64 = self.entries.iter().map(|(_, value)| value).sum();
        sum / self.window.as_secs_f64()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.entries.front() {
            if now.saturating_duration_since(at) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for WindowedRate {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
