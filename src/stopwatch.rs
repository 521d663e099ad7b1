use std::time::{Duration, Instant};

/// A stopwatch accumulating wall-clock time over start/stop pairs.
///
/// The solvers share one global time budget across many separately timed
/// concerns (lower bounds, primal heuristics), so the watch must survive
/// being started and stopped repeatedly without losing the accumulated
/// duration. Backed by [Instant], i.e. a monotonic clock.
#[derive(Debug, Default)]
pub struct Stopwatch {
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start measuring; has no effect if already running.
    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    /// Stop measuring and fold the elapsed time into the total; has no effect
    /// if already stopped.
    pub fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// The accumulated duration over all start/stop pairs, including the
    /// currently running one.
    pub fn total_duration(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }

    /// Whether the total duration strictly exceeds the limit.
    /// `None` means no limit.
    pub fn time_limit_reached(&self, time_limit: Option<Duration>) -> bool {
        match time_limit {
            Some(limit) => self.total_duration() > limit,
            None => false,
        }
    }

    /// Time left until the limit is reached (zero once exceeded).
    /// `None` means no limit.
    pub fn remaining_time(&self, time_limit: Option<Duration>) -> Option<Duration> {
        time_limit.map(|limit| limit.saturating_sub(self.total_duration()))
    }
}
