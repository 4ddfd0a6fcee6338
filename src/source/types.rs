//! Raw biometric sample types produced by every sample source.
//!
//! A sample is created once per decoded sensor notification or generated
//! synthetic beat, and consumed once by the signal processor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A physical heart-rate sensor
    Sensor,
    /// The synthetic generator
    Synthetic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Sensor => write!(f, "sensor"),
            SourceKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// One heart-rate frame as reported by a source.
///
/// Beat intervals from a synthetic source are always within 350..=1400 ms.
/// Sensor intervals are passed through exactly as the device reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Wall-clock time of the frame, ms since the Unix epoch
    pub timestamp_ms: i64,
    /// Instantaneous heart rate, if the frame carried one
    pub heart_rate_bpm: Option<u16>,
    /// Successive inter-beat intervals in ms, oldest first
    pub beat_intervals_ms: Vec<u32>,
    /// Producing source
    pub source: SourceKind,
}

impl RawSample {
    pub fn new(
        timestamp_ms: i64,
        heart_rate_bpm: Option<u16>,
        beat_intervals_ms: Vec<u32>,
        source: SourceKind,
    ) -> Self {
        Self {
            timestamp_ms,
            heart_rate_bpm,
            beat_intervals_ms,
            source,
        }
    }

    /// True when the frame carries neither a heart rate nor any interval.
    pub fn is_empty(&self) -> bool {
        self.heart_rate_bpm.is_none() && self.beat_intervals_ms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample_detection() {
        let empty = RawSample::new(1, None, Vec::new(), SourceKind::Sensor);
        assert!(empty.is_empty());

        let hr_only = RawSample::new(1, Some(70), Vec::new(), SourceKind::Sensor);
        assert!(!hr_only.is_empty());

        let rr_only = RawSample::new(1, None, vec![800], SourceKind::Sensor);
        assert!(!rr_only.is_empty());
    }

    #[test]
    fn test_source_kind_serialization() {
        let json = serde_json::to_string(&SourceKind::Synthetic).unwrap();
        assert_eq!(json, "\"synthetic\"");
        assert_eq!(SourceKind::Sensor.to_string(), "sensor");
    }
}
