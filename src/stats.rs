//! Pipeline counters.
//!
//! Lock-free tallies of what flowed through the pipeline, shared between the
//! consumer task and whoever reports on it.

use crate::source::types::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for one process lifetime.
#[derive(Debug)]
pub struct PipelineStats {
    sensor_samples: AtomicU64,
    synthetic_samples: AtomicU64,
    derived_states: AtomicU64,
    spikes_triggered: AtomicU64,
    /// Trigger notifications nobody was subscribed to receive
    triggers_unheard: AtomicU64,
    sessions_started: AtomicU64,
    created: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            sensor_samples: AtomicU64::new(0),
            synthetic_samples: AtomicU64::new(0),
            derived_states: AtomicU64::new(0),
            spikes_triggered: AtomicU64::new(0),
            triggers_unheard: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            created: Utc::now(),
        }
    }

    /// Record one raw sample accepted from a source.
    pub fn record_sample(&self, kind: SourceKind) {
        let counter = match kind {
            SourceKind::Sensor => &self.sensor_samples,
            SourceKind::Synthetic => &self.synthetic_samples,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_derived_state(&self) {
        self.derived_states.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spike(&self) {
        self.spikes_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trigger_unheard(&self) {
        self.triggers_unheard.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sensor_samples: self.sensor_samples.load(Ordering::Relaxed),
            synthetic_samples: self.synthetic_samples.load(Ordering::Relaxed),
            derived_states: self.derived_states.load(Ordering::Relaxed),
            spikes_triggered: self.spikes_triggered.load(Ordering::Relaxed),
            triggers_unheard: self.triggers_unheard.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            uptime_secs: (Utc::now() - self.created).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Sensor samples: {}\n\
             - Synthetic samples: {}\n\
             - Stress states derived: {}\n\
             - Breathing triggers: {} ({} without a listener)\n\
             - Sessions started: {}\n\
             - Uptime: {} seconds",
            stats.sensor_samples,
            stats.synthetic_samples,
            stats.derived_states,
            stats.spikes_triggered,
            stats.triggers_unheard,
            stats.sessions_started,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub sensor_samples: u64,
    pub synthetic_samples: u64,
    pub derived_states: u64,
    pub spikes_triggered: u64,
    pub triggers_unheard: u64,
    pub sessions_started: u64,
    pub uptime_secs: u64,
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<PipelineStats>;

/// Create a new shared stats handle.
pub fn create_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}
