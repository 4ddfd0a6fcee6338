//! Session sample accounting.
//!
//! The buffer keeps two views of the same samples: the full session log used
//! for the summary, and the pending list handed out (and cleared) on each
//! drain. Both live behind one lock so a drain never races an append.
//!
//! Each [`SessionBuffer::start`] opens a new generation; appends carry the
//! generation they belong to, and late appends from a finished session are
//! refused.

use crate::core::stress::DerivedState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Durable projection of a derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    #[serde(rename = "tsMs")]
    pub timestamp_ms: i64,
    #[serde(rename = "hrBpm", skip_serializing_if = "Option::is_none", default)]
    pub heart_rate_bpm: Option<u16>,
    #[serde(rename = "rmssd", skip_serializing_if = "Option::is_none", default)]
    pub hrv: Option<f64>,
    #[serde(rename = "stress0to100", skip_serializing_if = "Option::is_none", default)]
    pub stress_score: Option<u8>,
}

impl From<&DerivedState> for SessionSample {
    fn from(state: &DerivedState) -> Self {
        Self {
            timestamp_ms: state.timestamp_ms,
            heart_rate_bpm: state.heart_rate_bpm,
            hrv: state.hrv,
            stress_score: Some(state.stress_score),
        }
    }
}

/// Aggregates over the whole session log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub avg_hr: f64,
    pub avg_stress: f64,
    pub avg_rmssd: f64,
    pub max_stress: f64,
}

impl SessionSummary {
    /// Keyed form used at the transport boundary.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("avgHr", self.avg_hr),
            ("avgStress", self.avg_stress),
            ("avgRmssd", self.avg_rmssd),
            ("maxStress", self.max_stress),
        ])
    }
}

#[derive(Debug, Default)]
struct Buffers {
    generation: u64,
    log: Vec<SessionSample>,
    pending: Vec<SessionSample>,
}

/// Thread-safe per-session sample store.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    inner: Mutex<Buffers>,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both the log and the pending list for a new session and return
    /// its generation.
    pub fn start(&self) -> u64 {
        let mut buffers = self.inner.lock();
        buffers.generation += 1;
        buffers.log.clear();
        buffers.pending.clear();
        buffers.generation
    }

    /// Append to the session `generation`. Returns false, leaving the
    /// buffers untouched, if another session has started since.
    pub fn append(&self, generation: u64, sample: SessionSample) -> bool {
        let mut buffers = self.inner.lock();
        if buffers.generation != generation {
            return false;
        }
        buffers.log.push(sample.clone());
        buffers.pending.push(sample);
        true
    }

    /// Take everything appended since the previous drain.
    pub fn drain_pending(&self) -> Vec<SessionSample> {
        std::mem::take(&mut self.inner.lock().pending)
    }

    /// Number of samples in the session log.
    pub fn len(&self) -> usize {
        self.inner.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the full session log.
    pub fn snapshot(&self) -> Vec<SessionSample> {
        self.inner.lock().log.clone()
    }

    /// Means and maximum over the values present in the session log.
    pub fn summary(&self) -> SessionSummary {
        let (hr, stress, rmssd) = {
            let buffers = self.inner.lock();
            let hr: Vec<f64> = buffers
                .log
                .iter()
                .filter_map(|s| s.heart_rate_bpm.map(f64::from))
                .collect();
            let stress: Vec<f64> = buffers
                .log
                .iter()
                .filter_map(|s| s.stress_score.map(f64::from))
                .collect();
            let rmssd: Vec<f64> = buffers.log.iter().filter_map(|s| s.hrv).collect();
            (hr, stress, rmssd)
        };

        SessionSummary {
            avg_hr: mean_or_zero(&hr),
            avg_stress: mean_or_zero(&stress),
            avg_rmssd: mean_or_zero(&rmssd),
            max_stress: stress.iter().copied().fold(0.0, f64::max),
        }
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(ts: i64, hr: Option<u16>, hrv: Option<f64>, stress: Option<u8>) -> SessionSample {
        SessionSample {
            timestamp_ms: ts,
            heart_rate_bpm: hr,
            hrv,
            stress_score: stress,
        }
    }

    #[test]
    fn test_drain_returns_new_samples_once() {
        let buffer = SessionBuffer::new();
        let session = buffer.start();
        let a = sample(1, Some(70), Some(40.0), Some(73));
        let b = sample(2, Some(80), None, Some(36));
        assert!(buffer.append(session, a.clone()));
        assert!(buffer.append(session, b.clone()));

        assert_eq!(buffer.drain_pending(), vec![a, b]);
        assert!(buffer.drain_pending().is_empty());

        let summary = buffer.summary();
        assert_eq!(summary.avg_hr, 75.0);
        assert_eq!(summary.avg_rmssd, 40.0);
        assert_eq!(summary.avg_stress, 54.5);
        assert_eq!(summary.max_stress, 73.0);
    }

    #[test]
    fn test_start_clears_everything() {
        let buffer = SessionBuffer::new();
        let first = buffer.start();
        buffer.append(first, sample(1, Some(60), None, Some(10)));
        let second = buffer.start();
        assert_ne!(first, second);
        assert!(buffer.is_empty());
        assert!(buffer.drain_pending().is_empty());
    }

    #[test]
    fn test_append_from_finished_session_is_refused() {
        let buffer = SessionBuffer::new();
        let old = buffer.start();
        let current = buffer.start();

        assert!(!buffer.append(old, sample(1, Some(60), None, Some(10))));
        assert!(buffer.is_empty());
        assert!(buffer.drain_pending().is_empty());

        assert!(buffer.append(current, sample(2, Some(70), None, Some(20))));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let buffer = SessionBuffer::new();
        assert_eq!(buffer.summary(), SessionSummary::default());

        buffer.append(0, sample(1, None, None, None));
        assert_eq!(buffer.summary(), SessionSummary::default());
    }

    #[test]
    fn test_summary_map_keys() {
        let map = SessionSummary {
            avg_hr: 1.0,
            avg_stress: 2.0,
            avg_rmssd: 3.0,
            max_stress: 4.0,
        }
        .to_map();
        assert_eq!(map["avgHr"], 1.0);
        assert_eq!(map["avgStress"], 2.0);
        assert_eq!(map["avgRmssd"], 3.0);
        assert_eq!(map["maxStress"], 4.0);
    }

    #[test]
    fn test_sample_wire_names() {
        let json = serde_json::to_value(sample(5, Some(70), Some(12.5), Some(90))).unwrap();
        assert_eq!(json["tsMs"], 5);
        assert_eq!(json["hrBpm"], 70);
        assert_eq!(json["rmssd"], 12.5);
        assert_eq!(json["stress0to100"], 90);

        let bare = serde_json::to_value(sample(5, None, None, None)).unwrap();
        assert!(bare.get("hrBpm").is_none());
    }

    #[test]
    fn test_concurrent_append_and_drain_loses_nothing() {
        let buffer = Arc::new(SessionBuffer::new());
        let session = buffer.start();

        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..1_000 {
                    buffer.append(session, sample(i, Some(70), None, Some(50)));
                }
            })
        };

        let mut drained = Vec::new();
        while !writer.is_finished() {
            drained.extend(buffer.drain_pending());
        }
        writer.join().unwrap();
        drained.extend(buffer.drain_pending());

        assert_eq!(drained.len(), 1_000);
        assert!(drained.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert_eq!(buffer.len(), 1_000);
    }
}
