//! Synthetic heart-rate source for demos and tests.
//!
//! The generator keeps a running heart rate that eases toward the target of
//! the current [`SimMode`], adds a slow breathing wave and noise, converts it
//! to a beat interval with Gaussian jitter and emits the last 30 intervals on
//! every tick. The next tick is scheduled one beat interval later.

use crate::clock::SharedClock;
use crate::source::types::{RawSample, SourceKind};
use crate::source::{SampleSender, SampleSource, SampleStream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const HISTORY_SIZE: usize = 30;
const EASE_FACTOR: f64 = 0.05;
const BREATHING_RATE: f64 = 0.12;
const NOISE_BPM: f64 = 1.2;
const JITTER_MS: f64 = 10.0;
const MIN_HR: f64 = 45.0;
const MAX_HR: f64 = 130.0;
const MIN_INTERVAL_MS: i64 = 350;
const MAX_INTERVAL_MS: i64 = 1400;
const INITIAL_HR: f64 = 72.0;

/// Physiological scenario the generator imitates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    Calm,
    #[default]
    Normal,
    Stressed,
    Recovery,
}

impl SimMode {
    /// Heart rate the generator drifts toward.
    pub fn target_bpm(self) -> f64 {
        match self {
            SimMode::Calm => 58.0,
            SimMode::Normal => 72.0,
            SimMode::Stressed => 95.0,
            SimMode::Recovery => 75.0,
        }
    }

    /// Amplitude of the breathing wave in bpm.
    pub fn breathing_amplitude(self) -> f64 {
        match self {
            SimMode::Calm => 2.5,
            SimMode::Normal => 1.8,
            SimMode::Stressed => 0.9,
            SimMode::Recovery => 1.4,
        }
    }
}

impl fmt::Display for SimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimMode::Calm => "calm",
            SimMode::Normal => "normal",
            SimMode::Stressed => "stressed",
            SimMode::Recovery => "recovery",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SimMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calm" => Ok(SimMode::Calm),
            "normal" => Ok(SimMode::Normal),
            "stressed" => Ok(SimMode::Stressed),
            "recovery" => Ok(SimMode::Recovery),
            other => Err(format!(
                "unknown sim mode '{other}' (expected calm, normal, stressed or recovery)"
            )),
        }
    }
}

/// One generated beat.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTick {
    /// Instantaneous heart rate, truncated to whole bpm
    pub heart_rate_bpm: u16,
    /// Newest beat interval, also the delay until the next tick
    pub interval_ms: u32,
    /// Sliding window of the most recent intervals, oldest first
    pub intervals_ms: Vec<u32>,
}

/// Deterministic beat generator.
#[derive(Debug)]
pub struct SyntheticGenerator {
    rng: StdRng,
    hr: f64,
    t: f64,
    history: VecDeque<u32>,
}

impl SyntheticGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            hr: INITIAL_HR,
            t: 0.0,
            history: VecDeque::with_capacity(HISTORY_SIZE + 1),
        }
    }

    /// Produce the next beat for the given scenario.
    pub fn tick(&mut self, mode: SimMode) -> SyntheticTick {
        self.hr += (mode.target_bpm() - self.hr) * EASE_FACTOR;

        let breathing = (self.t * BREATHING_RATE).sin() * mode.breathing_amplitude();
        let noise = self.rng.gen_range(-NOISE_BPM..NOISE_BPM);
        let hr_now = (self.hr + breathing + noise).clamp(MIN_HR, MAX_HR);

        let base_interval = (60_000.0 / hr_now) as i64;
        let jitter = (self.gaussian() * JITTER_MS) as i64;
        let interval = (base_interval + jitter).clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS) as u32;

        self.history.push_back(interval);
        while self.history.len() > HISTORY_SIZE {
            self.history.pop_front();
        }
        self.t += 1.0;

        SyntheticTick {
            heart_rate_bpm: hr_now as u16,
            interval_ms: interval,
            intervals_ms: self.history.iter().copied().collect(),
        }
    }

    /// Standard normal draw via the Box-Muller transform.
    fn gaussian(&mut self) -> f64 {
        let u = self.open_unit();
        let v = self.open_unit();
        (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos()
    }

    // Uniform draw in (0, 1).
    fn open_unit(&mut self) -> f64 {
        loop {
            let x: f64 = self.rng.gen();
            if x > 0.0 {
                return x;
            }
        }
    }
}

/// Function consulted on every tick for the current scenario.
pub type ModeSelector = Arc<dyn Fn() -> SimMode + Send + Sync>;

/// A [`SampleSource`] that generates plausible heart-rate data.
pub struct SyntheticSource {
    selector: ModeSelector,
    seed: u64,
    clock: SharedClock,
}

impl SyntheticSource {
    pub fn new(selector: ModeSelector, seed: u64, clock: SharedClock) -> Self {
        Self {
            selector,
            seed,
            clock,
        }
    }

    /// A source locked to a single scenario.
    pub fn fixed(mode: SimMode, seed: u64, clock: SharedClock) -> Self {
        Self::new(Arc::new(move || mode), seed, clock)
    }
}

impl SampleSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    fn stream(&self) -> SampleStream {
        let (sender, stream) = SampleStream::channel(1);
        let generator = SyntheticGenerator::new(self.seed);
        tokio::spawn(generate(
            generator,
            self.selector.clone(),
            self.clock.clone(),
            sender,
        ));
        stream
    }
}

async fn generate(
    mut generator: SyntheticGenerator,
    selector: ModeSelector,
    clock: SharedClock,
    sender: SampleSender,
) {
    loop {
        let tick = generator.tick(selector());
        let sample = RawSample::new(
            clock.now_ms(),
            Some(tick.heart_rate_bpm),
            tick.intervals_ms,
            SourceKind::Synthetic,
        );

        if sender.send(sample).await.is_err() {
            break;
        }

        tokio::select! {
            _ = sender.closed() => break,
            _ = tokio::time::sleep(Duration::from_millis(u64::from(tick.interval_ms))) => {}
        }
    }
    tracing::debug!("Synthetic stream closed by subscriber");
}
