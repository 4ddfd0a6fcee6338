//! Sustained stress spike detection.
//!
//! A spike is flagged when the most recent scores sit at or above the
//! threshold and the current score stands well clear of the earlier part of
//! the rolling window. A trigger starts a cooldown during which no further
//! triggers are produced.

use crate::core::stress::DerivedState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const ABOVE_WEIGHT: f64 = 0.7;
const DELTA_WEIGHT: f64 = 0.3;
const DELTA_SCALE: f64 = 25.0;

/// Tuning for [`SpikeDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Score at or above which a sample counts as elevated
    pub threshold: u8,
    /// Number of scores kept in the rolling window
    pub window: usize,
    /// Elevated samples required among the most recent ones
    pub min_above: usize,
    /// Quiet period after a trigger
    pub cooldown_ms: i64,
    /// Minimum confidence for a trigger
    pub trigger_confidence: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            threshold: 75,
            window: 12,
            min_above: 3,
            cooldown_ms: 60_000,
            trigger_confidence: 0.75,
        }
    }
}

/// Outcome of feeding one state to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeResult {
    pub should_trigger: bool,
    pub confidence: f64,
    /// Human-readable summary, not meant to be parsed.
    pub diagnostic: String,
}

impl SpikeResult {
    fn cooldown() -> Self {
        Self {
            should_trigger: false,
            confidence: 0.0,
            diagnostic: "cooldown".to_string(),
        }
    }
}

/// Rolling-window spike detector with cooldown.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: SpikeConfig,
    scores: VecDeque<u8>,
    last_trigger_ms: Option<i64>,
}

impl SpikeDetector {
    pub fn new(config: SpikeConfig) -> Self {
        Self {
            scores: VecDeque::with_capacity(config.window + 1),
            config,
            last_trigger_ms: None,
        }
    }

    /// Feed the next derived state.
    pub fn observe(&mut self, state: &DerivedState) -> SpikeResult {
        self.observe_score(state.timestamp_ms, state.stress_score)
    }

    /// Feed a bare score observed at `now_ms`.
    pub fn observe_score(&mut self, now_ms: i64, score: u8) -> SpikeResult {
        self.scores.push_back(score);
        while self.scores.len() > self.config.window {
            self.scores.pop_front();
        }

        if self.in_cooldown(now_ms) {
            return SpikeResult::cooldown();
        }

        let recent = self.config.min_above;
        let above_count = self
            .scores
            .iter()
            .rev()
            .take(recent)
            .filter(|&&s| s >= self.config.threshold)
            .count();

        let history = self.scores.len().saturating_sub(recent);
        let baseline = if history == 0 {
            f64::from(score)
        } else {
            self.scores
                .iter()
                .take(history)
                .map(|&s| f64::from(s))
                .sum::<f64>()
                / history as f64
        };
        let delta = f64::from(score) - baseline;

        let above_ratio = if recent == 0 {
            1.0
        } else {
            (above_count as f64 / recent as f64).clamp(0.0, 1.0)
        };
        let confidence =
            ABOVE_WEIGHT * above_ratio + DELTA_WEIGHT * (delta / DELTA_SCALE).clamp(0.0, 1.0);

        let should_trigger =
            above_count >= recent && confidence >= self.config.trigger_confidence;
        if should_trigger {
            self.last_trigger_ms = Some(now_ms);
        }

        SpikeResult {
            should_trigger,
            confidence,
            diagnostic: format!(
                "score={} baseline={:.0} delta={:.0} conf={:.2}",
                score, baseline, delta, confidence
            ),
        }
    }

    /// Timestamp of the most recent trigger, if any.
    pub fn last_trigger_ms(&self) -> Option<i64> {
        self.last_trigger_ms
    }

    fn in_cooldown(&self, now_ms: i64) -> bool {
        self.last_trigger_ms
            .map_or(false, |last| now_ms - last < self.config.cooldown_ms)
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(SpikeConfig::default())
    }
}
