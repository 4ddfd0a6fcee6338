//! Heart-rate sensor source.
//!
//! Each subscription opens its own radio link and runs a driver task that
//! feeds link events through the [`ConnectionMachine`], performs the
//! resulting actions and forwards decoded measurements. Transient failures
//! only ever produce gaps in the stream; the stream ends only when the
//! subscriber drops it.

use crate::clock::SharedClock;
use crate::source::connection::{Action, ConnectionMachine, ConnectionState, MachineEvent};
use crate::source::link::{
    LinkEvent, LinkEventSender, SensorAdapter, SensorLink, HEART_RATE_MEASUREMENT,
    HEART_RATE_SERVICE,
};
use crate::source::packet::decode_measurement;
use crate::source::types::{RawSample, SourceKind};
use crate::source::{SampleSender, SampleSource, SampleStream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Timing and buffering for the sensor source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// How long one scan runs before it is restarted
    pub scan_window_ms: u64,
    /// Pause after a failed scan window or a lost connection
    pub retry_pause_ms: u64,
    /// Decoded samples buffered for a slow consumer before dropping
    pub notification_buffer: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            scan_window_ms: 15_000,
            retry_pause_ms: 1_000,
            notification_buffer: 64,
        }
    }
}

/// Connection state published by the newest subscription only.
struct StatePublisher {
    latest: Mutex<u64>,
    state: watch::Sender<ConnectionState>,
}

impl StatePublisher {
    fn next_subscription(&self) -> u64 {
        let mut latest = self.latest.lock();
        *latest += 1;
        *latest
    }

    /// Writes from a superseded subscription are discarded.
    fn publish(&self, subscription: u64, state: ConnectionState) {
        let latest = self.latest.lock();
        if *latest == subscription {
            self.state.send_replace(state);
        }
    }
}

/// A [`SampleSource`] backed by a heart-rate sensor.
pub struct SensorSource {
    adapter: Arc<dyn SensorAdapter>,
    config: SensorConfig,
    clock: SharedClock,
    publisher: Arc<StatePublisher>,
}

impl SensorSource {
    pub fn new(adapter: Arc<dyn SensorAdapter>, config: SensorConfig, clock: SharedClock) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            adapter,
            config,
            clock,
            publisher: Arc::new(StatePublisher {
                latest: Mutex::new(0),
                state,
            }),
        }
    }

    /// Observe the connection state of the most recent subscription.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.publisher.state.subscribe()
    }
}

impl SampleSource for SensorSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sensor
    }

    fn stream(&self) -> SampleStream {
        let (sender, stream) = SampleStream::channel(self.config.notification_buffer);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = self.adapter.open(events_tx.clone());
        let subscription = self.publisher.next_subscription();

        let driver = SensorDriver {
            link,
            events: events_rx,
            _events_keepalive: events_tx,
            machine: ConnectionMachine::new(
                Duration::from_millis(self.config.scan_window_ms),
                Duration::from_millis(self.config.retry_pause_ms),
            ),
            deadline: None,
            clock: self.clock.clone(),
            publisher: Arc::clone(&self.publisher),
            subscription,
        };

        tokio::spawn(driver.run(sender));
        stream
    }
}

struct SensorDriver {
    link: Box<dyn SensorLink>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    // Keeps `events` from ever reporting closed if the link drops its sender.
    _events_keepalive: LinkEventSender,
    machine: ConnectionMachine,
    deadline: Option<Instant>,
    clock: SharedClock,
    publisher: Arc<StatePublisher>,
    subscription: u64,
}

impl SensorDriver {
    async fn run(mut self, sender: SampleSender) {
        self.apply(MachineEvent::Open);

        loop {
            let deadline = self.deadline;
            tokio::select! {
                _ = sender.closed() => break,
                Some(event) = self.events.recv() => match event {
                    LinkEvent::Notification(payload) => self.forward(&sender, &payload),
                    other => {
                        if let Some(event) = Self::translate(other) {
                            self.apply(event);
                        }
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.apply(MachineEvent::TimerElapsed);
                }
            }
        }

        self.apply(MachineEvent::Cancel);
        tracing::debug!("Sensor stream closed by subscriber");
    }

    fn translate(event: LinkEvent) -> Option<MachineEvent> {
        let event = match event {
            LinkEvent::DeviceFound(device) => {
                tracing::info!(
                    "Found heart-rate sensor {} ({})",
                    device.address,
                    device.name.as_deref().unwrap_or("unnamed")
                );
                MachineEvent::DeviceFound(device)
            }
            LinkEvent::ScanFailed(reason) => {
                tracing::warn!("Sensor scan failed: {}", reason);
                MachineEvent::ScanFailed
            }
            LinkEvent::Connected => {
                tracing::info!("Sensor connected");
                MachineEvent::Connected
            }
            LinkEvent::ConnectFailed(reason) => {
                tracing::warn!("Sensor connection failed: {}", reason);
                MachineEvent::ConnectFailed
            }
            LinkEvent::Subscribed => MachineEvent::Subscribed,
            LinkEvent::DiscoveryFailed(reason) => {
                tracing::warn!("Heart-rate characteristic discovery failed: {}", reason);
                MachineEvent::DiscoveryFailed
            }
            LinkEvent::Disconnected => {
                tracing::info!("Sensor disconnected");
                MachineEvent::Disconnected
            }
            LinkEvent::Notification(_) => return None,
        };
        Some(event)
    }

    /// Feed one event and everything it causes through the machine.
    fn apply(&mut self, event: MachineEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(action) {
                    queue.push_back(follow_up);
                }
            }
        }
        self.publisher.publish(self.subscription, self.machine.state());
    }

    /// Perform one action; a synchronous failure becomes the matching event.
    fn execute(&mut self, action: Action) -> Option<MachineEvent> {
        match action {
            Action::StartScan => match self.link.start_scan(HEART_RATE_SERVICE) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!("Could not start sensor scan: {}", e);
                    Some(MachineEvent::ScanFailed)
                }
            },
            Action::StopScan => {
                self.link.stop_scan();
                None
            }
            Action::Connect(device) => match self.link.connect(&device) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!("Could not connect to {}: {}", device.address, e);
                    Some(MachineEvent::ConnectFailed)
                }
            },
            Action::Subscribe => {
                match self
                    .link
                    .subscribe(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT)
                {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!("Could not subscribe to heart-rate notifications: {}", e);
                        Some(MachineEvent::DiscoveryFailed)
                    }
                }
            }
            Action::Release => {
                self.link.release();
                None
            }
            Action::Arm(after) => {
                self.deadline = Some(Instant::now() + after);
                None
            }
            Action::Disarm => {
                self.deadline = None;
                None
            }
        }
    }

    fn forward(&mut self, sender: &SampleSender, payload: &[u8]) {
        if !self.machine.is_streaming() {
            tracing::debug!("Ignoring notification outside a connection");
            return;
        }

        let measurement = decode_measurement(payload);
        let sample = RawSample::new(
            self.clock.now_ms(),
            measurement.heart_rate_bpm,
            measurement.rr_intervals_ms,
            SourceKind::Sensor,
        );

        match sender.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Subscriber is behind, dropping sensor sample");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
