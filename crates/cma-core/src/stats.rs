use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Process-lifetime apply counters, for diagnostics only.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    /// Targets that already matched the city.
    pub apply_result_ignored: u32,
    /// Targets that needed requests.
    pub apply_result_applied: u32,
    /// Applies where only a refresh could be sent.
    pub refresh_forced: u32,
    started: Instant,
}

impl Default for ApplyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplyStats {
    pub fn new() -> Self {
        Self {
            apply_result_ignored: 0,
            apply_result_applied: 0,
            refresh_forced: 0,
            started: Instant::now(),
        }
    }

    /// Zero the counters and restart the wall clock.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self) -> StatsReport {
        let total = self.apply_result_ignored + self.apply_result_applied;
        let ignored_per_mill = (self.apply_result_ignored * 1000) / total.max(1);
        StatsReport {
            ignored: self.apply_result_ignored,
            applied: self.apply_result_applied,
            refresh_forced: self.refresh_forced,
            total,
            ignored_per_mill,
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }
}

/// Snapshot of [`ApplyStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub ignored: u32,
    pub applied: u32,
    pub refresh_forced: u32,
    pub total: u32,
    pub ignored_per_mill: u32,
    pub elapsed_ms: u64,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let applied_per_mill = 1000 - self.ignored_per_mill;
        write!(
            f,
            "apply_result: ignored={:2}.{}% ({}) applied={:2}.{}% ({}) total={} forced_refresh={}",
            self.ignored_per_mill / 10,
            self.ignored_per_mill % 10,
            self.ignored,
            applied_per_mill / 10,
            applied_per_mill % 10,
            self.applied,
            self.total,
            self.refresh_forced
        )
    }
}
