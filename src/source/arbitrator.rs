//! Source arbitration.
//!
//! The arbitrator combines the sensor and synthetic sources into one stream
//! according to a [`Mode`] that can change at any time. A mode change drops
//! the current subscriptions (cancelling their producers) and opens new ones
//! for the new mode, without the consumer noticing anything but the change
//! in samples.

use crate::source::types::RawSample;
use crate::source::{SampleSender, SampleStream, SharedSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

/// How the two sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    SensorOnly,
    SyntheticOnly,
    /// Interleave both sources in arrival order
    MergeBoth,
    /// Sensor data, with synthetic fill-in while the sensor is silent
    #[default]
    AutoPreferSensor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::SensorOnly => "sensor-only",
            Mode::SyntheticOnly => "synthetic-only",
            Mode::MergeBoth => "merge",
            Mode::AutoPreferSensor => "auto",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "sensor" | "sensor-only" => Ok(Mode::SensorOnly),
            "synthetic" | "synthetic-only" => Ok(Mode::SyntheticOnly),
            "merge" | "merge-both" => Ok(Mode::MergeBoth),
            "auto" | "auto-prefer-sensor" => Ok(Mode::AutoPreferSensor),
            other => Err(format!(
                "unknown source mode '{other}' (expected sensor-only, synthetic-only, merge or auto)"
            )),
        }
    }
}

/// Fallback decision for [`Mode::AutoPreferSensor`].
///
/// Tracks the newest sensor timestamp seen (never moving backward) and admits
/// a synthetic sample only when no sensor sample has been seen yet or the
/// sensor has been silent for longer than the threshold.
#[derive(Debug, Clone)]
pub struct FallbackGate {
    threshold_ms: i64,
    last_sensor_ms: Option<i64>,
}

impl FallbackGate {
    pub fn new(threshold_ms: i64) -> Self {
        Self {
            threshold_ms,
            last_sensor_ms: None,
        }
    }

    /// Record a sensor sample timestamp.
    pub fn observe_sensor(&mut self, timestamp_ms: i64) {
        self.last_sensor_ms = Some(match self.last_sensor_ms {
            Some(last) => last.max(timestamp_ms),
            None => timestamp_ms,
        });
    }

    /// Whether a synthetic sample at `timestamp_ms` should be forwarded.
    pub fn admit_synthetic(&self, timestamp_ms: i64) -> bool {
        match self.last_sensor_ms {
            None => true,
            Some(last) => timestamp_ms - last > self.threshold_ms,
        }
    }

    pub fn last_sensor_ms(&self) -> Option<i64> {
        self.last_sensor_ms
    }
}

/// Combines two sources under a live-changing [`Mode`].
#[derive(Clone)]
pub struct StreamArbitrator {
    sensor: Option<SharedSource>,
    synthetic: Option<SharedSource>,
    mode: watch::Receiver<Mode>,
    fallback_after_ms: i64,
    buffer: usize,
}

impl StreamArbitrator {
    /// Create an arbitrator. Either source may be absent, in which case it
    /// behaves as a source that never produces anything.
    pub fn new(
        sensor: Option<SharedSource>,
        synthetic: Option<SharedSource>,
        mode: watch::Receiver<Mode>,
        fallback_after_ms: i64,
    ) -> Self {
        Self {
            sensor,
            synthetic,
            mode,
            fallback_after_ms,
            buffer: 64,
        }
    }

    /// The mode currently in effect.
    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    /// Open the combined stream.
    pub fn stream(&self) -> SampleStream {
        let (sender, stream) = SampleStream::channel(self.buffer);
        tokio::spawn(self.clone().run(sender));
        stream
    }

    async fn run(mut self, sender: SampleSender) {
        loop {
            let mode = *self.mode.borrow_and_update();
            tracing::info!("Source mode: {}", mode);

            match self.forward(mode, &sender).await {
                Exit::ModeChanged => continue,
                Exit::Closed => break,
            }
        }
        tracing::debug!("Arbitrated stream closed by subscriber");
    }

    /// Forward samples for one mode until the mode changes or the subscriber
    /// goes away. Source subscriptions are dropped on return.
    async fn forward(&mut self, mode: Mode, sender: &SampleSender) -> Exit {
        let (mut sensor, mut synthetic) = match mode {
            Mode::SensorOnly => (open(&self.sensor), None),
            Mode::SyntheticOnly => (None, open(&self.synthetic)),
            Mode::MergeBoth | Mode::AutoPreferSensor => {
                (open(&self.sensor), open(&self.synthetic))
            }
        };
        let mut gate = FallbackGate::new(self.fallback_after_ms);
        // Once the mode sender is gone the mode is fixed for good.
        let mut mode_live = true;

        loop {
            if sensor.is_none() && synthetic.is_none() && !mode_live {
                return Exit::Closed;
            }

            let sample = tokio::select! {
                _ = sender.closed() => return Exit::Closed,
                changed = self.mode.changed(), if mode_live => {
                    if changed.is_ok() {
                        return Exit::ModeChanged;
                    }
                    mode_live = false;
                    continue;
                }
                next = next_from(&mut sensor) => match next {
                    Some(sample) => {
                        gate.observe_sensor(sample.timestamp_ms);
                        sample
                    }
                    None => {
                        sensor = None;
                        continue;
                    }
                },
                next = next_from(&mut synthetic) => match next {
                    Some(sample) => {
                        if mode == Mode::AutoPreferSensor && !gate.admit_synthetic(sample.timestamp_ms) {
                            continue;
                        }
                        sample
                    }
                    None => {
                        synthetic = None;
                        continue;
                    }
                },
            };

            if sender.send(sample).await.is_err() {
                return Exit::Closed;
            }
        }
    }
}

enum Exit {
    ModeChanged,
    Closed,
}

fn open(source: &Option<SharedSource>) -> Option<SampleStream> {
    source.as_ref().map(|s| s.stream())
}

/// Next sample from an optional stream; pends forever when absent.
async fn next_from(stream: &mut Option<SampleStream>) -> Option<RawSample> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_admits_before_any_sensor_sample() {
        let gate = FallbackGate::new(3_000);
        assert!(gate.admit_synthetic(0));
        assert!(gate.admit_synthetic(1_000_000));
    }

    #[test]
    fn test_gate_suppresses_while_sensor_recent() {
        let mut gate = FallbackGate::new(3_000);
        gate.observe_sensor(10_000);
        assert!(!gate.admit_synthetic(12_000));
        assert!(!gate.admit_synthetic(13_000));
        assert!(gate.admit_synthetic(13_001));
    }

    #[test]
    fn test_gate_watermark_never_moves_backward() {
        let mut gate = FallbackGate::new(3_000);
        gate.observe_sensor(10_000);
        gate.observe_sensor(4_000);
        assert_eq!(gate.last_sensor_ms(), Some(10_000));
        assert!(!gate.admit_synthetic(12_500));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<Mode>(), Ok(Mode::AutoPreferSensor));
        assert_eq!("SENSOR_ONLY".parse::<Mode>(), Ok(Mode::SensorOnly));
        assert_eq!("merge".parse::<Mode>(), Ok(Mode::MergeBoth));
        assert_eq!("synthetic".parse::<Mode>(), Ok(Mode::SyntheticOnly));
        assert!("both-ish".parse::<Mode>().is_err());
        assert_eq!(Mode::default(), Mode::AutoPreferSensor);
    }
}
