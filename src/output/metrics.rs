//! Run metrics
//!
//! A registry value threaded through the coordinator and each pipeline run.
//! Every source run records into its own registry, which the coordinator
//! merges into the run registry once the source finishes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Aggregated timings for one timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStats {
    pub count: u64,
    pub total_ms: f64,
    pub max_ms: f64,
}

impl TimerStats {
    fn record(&mut self, ms: f64) {
        self.count += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
    }

    fn merge(&mut self, other: &TimerStats) {
        self.count += other.count;
        self.total_ms += other.total_ms;
        self.max_ms = self.max_ms.max(other.max_ms);
    }

    /// Mean duration in milliseconds
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// Exported state of a registry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub timers: BTreeMap<String, TimerStats>,
}

/// Counters, gauges and timers keyed by name
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MetricsSnapshot) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Adds `by` to a counter
    pub fn incr(&self, name: &str, by: u64) {
        self.with(|m| *m.counters.entry(name.to_string()).or_default() += by);
    }

    /// Sets a gauge to `value`
    pub fn gauge(&self, name: &str, value: f64) {
        self.with(|m| {
            m.gauges.insert(name.to_string(), value);
        });
    }

    /// Records one timing
    pub fn observe(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.with(|m| m.timers.entry(name.to_string()).or_default().record(ms));
    }

    /// Folds another registry into this one
    ///
    /// Counters and timers accumulate; gauges take the other registry's value.
    pub fn merge(&self, other: &MetricsRegistry) {
        let other = other.snapshot();
        self.with(|m| {
            for (name, value) in other.counters {
                *m.counters.entry(name).or_default() += value;
            }
            for (name, value) in other.gauges {
                m.gauges.insert(name, value);
            }
            for (name, timer) in other.timers {
                m.timers.entry(name).or_default().merge(&timer);
            }
        });
    }

    /// Exports the current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with(|m| m.clone())
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.with(|m| m.counters.get(name).copied().unwrap_or(0))
    }
}
