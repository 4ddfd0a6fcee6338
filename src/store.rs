//! Session orchestration.
//!
//! [`StressStore`] gates sessions on two external flags, runs one consumer
//! task per session over the arbitrated sample stream, and exposes the live
//! state, the breathing trigger notification and the session buffer to the
//! layers above.

use crate::clock::SharedClock;
use crate::core::{DerivedState, SessionBuffer, SessionSample, SessionSummary};
use crate::core::{SignalProcessor, SpikeConfig, SpikeDetector};
use crate::source::{RawSample, SampleStream, StreamArbitrator};
use crate::stats::SharedStats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Time after session start before spike detection begins
    pub warmup_ms: i64,
    pub spike: SpikeConfig,
    /// Trigger notifications a slow subscriber may fall behind by
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 10_000,
            spike: SpikeConfig::default(),
            event_capacity: 8,
        }
    }
}

/// Discrete notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StressEvent {
    /// A sustained stress spike was detected.
    TriggerBreathing {
        at_ms: i64,
        confidence: f64,
        diagnostic: String,
    },
}

/// State shared with the session consumer task.
struct Pipeline {
    processor: SignalProcessor,
    detector: Mutex<SpikeDetector>,
    buffer: SessionBuffer,
    clock: SharedClock,
    stats: SharedStats,
    warmup_ms: i64,
    session_started_at: AtomicI64,
    state: watch::Sender<DerivedState>,
    events: broadcast::Sender<StressEvent>,
}

impl Pipeline {
    /// Process one sample on behalf of session `generation`.
    fn handle(&self, generation: u64, sample: RawSample) {
        let state = self.processor.process(&sample);
        if !self.buffer.append(generation, SessionSample::from(&state)) {
            tracing::debug!("Dropping sample from a finished session");
            return;
        }

        self.stats.record_sample(sample.source);
        self.stats.record_derived_state();
        tracing::debug!(
            "{} sample: hr={:?} hrv={:?} stress={}",
            state.source,
            state.heart_rate_bpm,
            state.hrv,
            state.stress_score
        );
        self.state.send_replace(state.clone());

        let elapsed = self.clock.now_ms() - self.session_started_at.load(Ordering::SeqCst);
        if elapsed < self.warmup_ms {
            return;
        }

        let spike = self.detector.lock().observe(&state);
        if !spike.should_trigger {
            return;
        }

        self.stats.record_spike();
        tracing::info!("Stress spike detected ({})", spike.diagnostic);

        let event = StressEvent::TriggerBreathing {
            at_ms: state.timestamp_ms,
            confidence: spike.confidence,
            diagnostic: spike.diagnostic,
        };
        if self.events.send(event).is_err() {
            self.stats.record_trigger_unheard();
            tracing::debug!("Breathing trigger dropped: no subscribers");
        }
    }
}

struct Session {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Wires sources, processing, spike detection and the session buffer.
pub struct StressStore {
    arbitrator: StreamArbitrator,
    pipeline: Arc<Pipeline>,
    logged_in: AtomicBool,
    app_opened: AtomicBool,
    running: AtomicBool,
    session: Mutex<Option<Session>>,
}

impl StressStore {
    pub fn new(
        arbitrator: StreamArbitrator,
        config: StoreConfig,
        clock: SharedClock,
        stats: SharedStats,
    ) -> Self {
        let (state, _) = watch::channel(DerivedState::initial());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            arbitrator,
            pipeline: Arc::new(Pipeline {
                processor: SignalProcessor::new(),
                detector: Mutex::new(SpikeDetector::new(config.spike)),
                buffer: SessionBuffer::new(),
                clock,
                stats,
                warmup_ms: config.warmup_ms,
                session_started_at: AtomicI64::new(0),
                state,
                events,
            }),
            logged_in: AtomicBool::new(false),
            app_opened: AtomicBool::new(false),
            running: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    pub fn set_logged_in(&self, value: bool) {
        self.logged_in.store(value, Ordering::SeqCst);
    }

    pub fn set_app_opened(&self, value: bool) {
        self.app_opened.store(value, Ordering::SeqCst);
    }

    /// Start a session if both gates are open and none is running.
    ///
    /// Returns whether a new session was started. Must be called from
    /// within a Tokio runtime.
    pub fn try_start(&self) -> bool {
        if !self.logged_in.load(Ordering::SeqCst) || !self.app_opened.load(Ordering::SeqCst) {
            tracing::debug!("Session start skipped: gates closed");
            return false;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let pipeline = &self.pipeline;
        let started_at = pipeline.clock.now_ms();
        pipeline.session_started_at.store(started_at, Ordering::SeqCst);
        let generation = pipeline.buffer.start();
        pipeline.stats.record_session_started();

        let token = CancellationToken::new();
        let task = tokio::spawn(consume(
            Arc::clone(pipeline),
            generation,
            self.arbitrator.stream(),
            token.clone(),
        ));

        // Consumer left over from a stream that ended on its own.
        if let Some(old) = self.session.lock().replace(Session { token, task }) {
            old.token.cancel();
        }

        tracing::info!(
            "Session started at {} (mode: {})",
            started_at,
            self.arbitrator.mode()
        );
        true
    }

    /// Stop consuming samples. Buffers are kept for a final drain.
    ///
    /// Does not wait for the consumer; a sample it is still handling is
    /// discarded if a new session has started by then.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(session) = self.session.lock().take() {
            session.token.cancel();
            tracing::info!("Session stopped");
        }
    }

    /// Stop and wait for the consumer task to finish, so nothing is appended
    /// after this returns.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.token.cancel();
            if let Err(e) = session.task.await {
                tracing::warn!("Session consumer ended abnormally: {}", e);
            }
            tracing::info!("Session stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start time of the current or most recent session, in ms.
    pub fn session_started_at(&self) -> i64 {
        self.pipeline.session_started_at.load(Ordering::SeqCst)
    }

    /// Samples added since the previous drain.
    pub fn drain_pending(&self) -> Vec<SessionSample> {
        self.pipeline.buffer.drain_pending()
    }

    /// Summary over the whole session log.
    pub fn summary(&self) -> SessionSummary {
        self.pipeline.buffer.summary()
    }

    /// Copy of the whole session log.
    pub fn session_log(&self) -> Vec<SessionSample> {
        self.pipeline.buffer.snapshot()
    }

    /// Watch the live derived state.
    pub fn state(&self) -> watch::Receiver<DerivedState> {
        self.pipeline.state.subscribe()
    }

    pub fn current_state(&self) -> DerivedState {
        self.pipeline.state.borrow().clone()
    }

    /// Subscribe to trigger notifications. Delivery is lossy: a subscriber
    /// that falls more than the event capacity behind misses the oldest.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StressEvent> {
        self.pipeline.events.subscribe()
    }

    pub fn stats(&self) -> &SharedStats {
        &self.pipeline.stats
    }
}

impl Drop for StressStore {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.token.cancel();
        }
    }
}

async fn consume(
    pipeline: Arc<Pipeline>,
    generation: u64,
    mut stream: SampleStream,
    token: CancellationToken,
) {
    loop {
        let sample = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = stream.next() => match next {
                Some(sample) => sample,
                None => {
                    tracing::info!("Sample stream ended");
                    break;
                }
            },
        };
        pipeline.handle(generation, sample);
    }
}
