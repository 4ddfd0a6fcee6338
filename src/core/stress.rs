//! Stress scoring and the per-sample signal processor.
//!
//! Variability-based scoring is preferred; heart rate alone is a lower
//! confidence fallback, and a frame with no signal scores a neutral zero
//! with zero confidence.

use crate::core::hrv::rmssd;
use crate::source::types::{RawSample, SourceKind};
use serde::{Deserialize, Serialize};

const HRV_FLOOR_MS: f64 = 10.0;
const HRV_CEILING_MS: f64 = 120.0;
const HR_FLOOR_BPM: f64 = 50.0;
const HR_CEILING_BPM: f64 = 150.0;

/// Confidence of an HRV-derived score.
pub const HRV_CONFIDENCE: f64 = 0.9;
/// Confidence of a heart-rate-only score.
pub const HR_CONFIDENCE: f64 = 0.45;

/// Stress estimate derived from one raw sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedState {
    pub timestamp_ms: i64,
    pub heart_rate_bpm: Option<u16>,
    /// RMSSD in ms
    pub hrv: Option<f64>,
    /// 0 (relaxed) to 100 (highly stressed)
    pub stress_score: u8,
    /// 0 to 1
    pub confidence: f64,
    pub source: SourceKind,
}

impl DerivedState {
    /// Placeholder published before the first sample arrives.
    pub fn initial() -> Self {
        Self {
            timestamp_ms: 0,
            heart_rate_bpm: None,
            hrv: None,
            stress_score: 0,
            confidence: 0.0,
            source: SourceKind::Sensor,
        }
    }
}

/// Score stress from heart rate and HRV. Returns `(score, confidence)`.
pub fn score(heart_rate_bpm: Option<u16>, hrv: Option<f64>) -> (u8, f64) {
    if let Some(hrv) = hrv {
        // Lower variability means more stress.
        let clamped = hrv.clamp(HRV_FLOOR_MS, HRV_CEILING_MS);
        let raw = ((HRV_CEILING_MS - clamped) / (HRV_CEILING_MS - HRV_FLOOR_MS) * 100.0).round();
        return (raw.clamp(0.0, 100.0) as u8, HRV_CONFIDENCE);
    }

    if let Some(hr) = heart_rate_bpm {
        let clamped = f64::from(hr).clamp(HR_FLOOR_BPM, HR_CEILING_BPM);
        let raw = ((clamped - HR_FLOOR_BPM) / (HR_CEILING_BPM - HR_FLOOR_BPM) * 100.0).round();
        return (raw.clamp(0.0, 100.0) as u8, HR_CONFIDENCE);
    }

    (0, 0.0)
}

/// Converts raw samples into derived stress states.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProcessor;

impl SignalProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, sample: &RawSample) -> DerivedState {
        let hrv = rmssd(&sample.beat_intervals_ms);
        let (stress_score, confidence) = score(sample.heart_rate_bpm, hrv);

        DerivedState {
            timestamp_ms: sample.timestamp_ms,
            heart_rate_bpm: sample.heart_rate_bpm,
            hrv,
            stress_score,
            confidence,
            source: sample.source,
        }
    }
}
