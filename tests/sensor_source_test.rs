//! Integration tests for the sensor source against a scripted radio link.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use synheart_stress_agent::clock::ManualClock;
use synheart_stress_agent::source::link::{LinkEventSender, HEART_RATE_MEASUREMENT};
use synheart_stress_agent::source::{
    ConnectionState, DeviceInfo, LinkError, LinkEvent, SampleSource, SensorAdapter, SensorConfig,
    SensorLink, SensorSource, SourceKind,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    StartScan,
    StopScan,
    Connect(String),
    Subscribe,
    Release,
}

#[derive(Default)]
struct Script {
    calls: Mutex<Vec<Call>>,
    events: Mutex<Option<LinkEventSender>>,
    refuse_connect: bool,
}

impl Script {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn clear(&self) {
        self.calls.lock().clear();
    }

    fn emit(&self, event: LinkEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            events.send(event).unwrap();
        }
    }
}

struct ScriptedAdapter(Arc<Script>);

impl SensorAdapter for ScriptedAdapter {
    fn open(&self, events: LinkEventSender) -> Box<dyn SensorLink> {
        *self.0.events.lock() = Some(events);
        Box::new(ScriptedLink(Arc::clone(&self.0)))
    }
}

struct ScriptedLink(Arc<Script>);

impl SensorLink for ScriptedLink {
    fn start_scan(&mut self, _service: Uuid) -> Result<(), LinkError> {
        self.0.calls.lock().push(Call::StartScan);
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.0.calls.lock().push(Call::StopScan);
    }

    fn connect(&mut self, device: &DeviceInfo) -> Result<(), LinkError> {
        self.0.calls.lock().push(Call::Connect(device.address.clone()));
        if self.0.refuse_connect {
            return Err(LinkError::Rejected("busy".to_string()));
        }
        Ok(())
    }

    fn subscribe(&mut self, _service: Uuid, characteristic: Uuid) -> Result<(), LinkError> {
        assert_eq!(characteristic, HEART_RATE_MEASUREMENT);
        self.0.calls.lock().push(Call::Subscribe);
        Ok(())
    }

    fn release(&mut self) {
        self.0.calls.lock().push(Call::Release);
    }
}

fn sensor(script: &Arc<Script>, clock: Arc<ManualClock>) -> SensorSource {
    SensorSource::new(
        Arc::new(ScriptedAdapter(Arc::clone(script))),
        SensorConfig::default(),
        clock,
    )
}

/// Let spawned tasks run without moving the clock.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn device() -> DeviceInfo {
    DeviceInfo::new("AA:BB:CC:DD:EE:FF", Some("Polar H10".to_string()))
}

async fn connect(script: &Script) {
    script.emit(LinkEvent::DeviceFound(device()));
    script.emit(LinkEvent::Connected);
    script.emit(LinkEvent::Subscribed);
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_notifications_become_samples() {
    let script = Arc::new(Script::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let source = sensor(&script, clock.clone());
    let state = source.connection_state();
    assert_eq!(source.kind(), SourceKind::Sensor);

    let mut stream = source.stream();
    settle().await;
    assert_eq!(script.calls(), vec![Call::StartScan]);
    assert_eq!(*state.borrow(), ConnectionState::Scanning);

    connect(&script).await;
    assert_eq!(
        script.calls(),
        vec![
            Call::StartScan,
            Call::StopScan,
            Call::Connect("AA:BB:CC:DD:EE:FF".to_string()),
            Call::Subscribe,
        ]
    );
    assert_eq!(*state.borrow(), ConnectionState::Connected);

    script.emit(LinkEvent::Notification(vec![0x10, 0x4B, 0xE8, 0x03]));
    let sample = stream.next().await.unwrap();
    assert_eq!(sample.timestamp_ms, 1_700_000_000_000);
    assert_eq!(sample.heart_rate_bpm, Some(75));
    assert_eq!(sample.beat_intervals_ms, vec![977]);
    assert_eq!(sample.source, SourceKind::Sensor);
}

#[tokio::test(start_paused = true)]
async fn test_notification_outside_connection_is_ignored() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let mut stream = source.stream();
    settle().await;

    script.emit(LinkEvent::Notification(vec![0x00, 0x48]));
    settle().await;
    assert!(stream.try_next().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reconnects_without_ending_stream() {
    let script = Arc::new(Script::default());
    let clock = Arc::new(ManualClock::new(0));
    let source = sensor(&script, clock.clone());
    let state = source.connection_state();
    let mut stream = source.stream();
    settle().await;

    connect(&script).await;
    script.emit(LinkEvent::Notification(vec![0x00, 0x48]));
    assert_eq!(stream.next().await.unwrap().heart_rate_bpm, Some(72));

    script.clear();
    script.emit(LinkEvent::Disconnected);
    settle().await;
    assert_eq!(script.calls(), vec![Call::Release]);
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);

    // Retry pause, then a fresh scan.
    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert_eq!(script.calls(), vec![Call::Release, Call::StartScan]);
    assert_eq!(*state.borrow(), ConnectionState::Scanning);

    connect(&script).await;
    clock.set(5_000);
    script.emit(LinkEvent::Notification(vec![0x00, 0x50]));
    let sample = stream.next().await.unwrap();
    assert_eq!(sample.heart_rate_bpm, Some(80));
    assert_eq!(sample.timestamp_ms, 5_000);
}

#[tokio::test(start_paused = true)]
async fn test_scan_window_expires_and_restarts() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let state = source.connection_state();
    let _stream = source.stream();
    settle().await;
    assert_eq!(script.calls(), vec![Call::StartScan]);

    tokio::time::sleep(Duration::from_millis(14_900)).await;
    assert_eq!(script.calls(), vec![Call::StartScan]);

    tokio::time::sleep(Duration::from_millis(101)).await;
    assert_eq!(script.calls(), vec![Call::StartScan, Call::StopScan]);
    assert_eq!(*state.borrow(), ConnectionState::Idle);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(
        script.calls(),
        vec![Call::StartScan, Call::StopScan, Call::StartScan]
    );
    assert_eq!(*state.borrow(), ConnectionState::Scanning);
}

#[tokio::test(start_paused = true)]
async fn test_refused_connect_is_retried() {
    let script = Arc::new(Script {
        refuse_connect: true,
        ..Script::default()
    });
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let state = source.connection_state();
    let _stream = source.stream();
    settle().await;

    script.emit(LinkEvent::DeviceFound(device()));
    settle().await;
    assert_eq!(
        script.calls(),
        vec![
            Call::StartScan,
            Call::StopScan,
            Call::Connect("AA:BB:CC:DD:EE:FF".to_string()),
            Call::Release,
        ]
    );
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert_eq!(script.calls().last(), Some(&Call::StartScan));
}

#[tokio::test(start_paused = true)]
async fn test_discovery_failure_is_a_disconnect() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let state = source.connection_state();
    let _stream = source.stream();
    settle().await;

    script.emit(LinkEvent::DeviceFound(device()));
    script.emit(LinkEvent::Connected);
    script.emit(LinkEvent::DiscoveryFailed("no heart-rate service".to_string()));
    settle().await;

    assert_eq!(script.calls().last(), Some(&Call::Release));
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_stream_releases_connection() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let state = source.connection_state();
    let stream = source.stream();
    settle().await;
    connect(&script).await;

    script.clear();
    drop(stream);
    settle().await;
    assert_eq!(script.calls(), vec![Call::Release]);
    assert_eq!(*state.borrow(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_stream_while_scanning_stops_scan() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let stream = source.stream();
    settle().await;

    script.clear();
    drop(stream);
    settle().await;
    assert_eq!(script.calls(), vec![Call::StopScan]);

    // Timers were cancelled with the stream.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(script.calls(), vec![Call::StopScan]);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_connect_is_abandoned_and_rescanned() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let state = source.connection_state();
    let _stream = source.stream();
    settle().await;

    // The radio accepts the attempt and then never reports back.
    script.emit(LinkEvent::DeviceFound(device()));
    settle().await;
    assert_eq!(*state.borrow(), ConnectionState::Connecting);

    tokio::time::sleep(Duration::from_millis(14_900)).await;
    assert_eq!(*state.borrow(), ConnectionState::Connecting);

    tokio::time::sleep(Duration::from_millis(101)).await;
    assert_eq!(
        script.calls(),
        vec![
            Call::StartScan,
            Call::StopScan,
            Call::Connect("AA:BB:CC:DD:EE:FF".to_string()),
            Call::Release,
        ]
    );
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(script.calls().last(), Some(&Call::StartScan));
    assert_eq!(*state.borrow(), ConnectionState::Scanning);

    // Still retrying long after the first attempt.
    tokio::time::sleep(Duration::from_secs(600)).await;
    let scans = script
        .calls()
        .iter()
        .filter(|c| **c == Call::StartScan)
        .count();
    assert!(scans > 10);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_subscription_does_not_overwrite_state() {
    let script = Arc::new(Script::default());
    let source = sensor(&script, Arc::new(ManualClock::new(0)));
    let state = source.connection_state();

    let first = source.stream();
    settle().await;
    let second = source.stream();
    settle().await;
    assert_eq!(*state.borrow(), ConnectionState::Scanning);

    // The old driver shuts down after the new one has started.
    drop(first);
    settle().await;
    assert_eq!(
        script.calls(),
        vec![Call::StartScan, Call::StartScan, Call::StopScan]
    );
    assert_eq!(*state.borrow(), ConnectionState::Scanning);

    drop(second);
    settle().await;
    assert_eq!(*state.borrow(), ConnectionState::Idle);
}
