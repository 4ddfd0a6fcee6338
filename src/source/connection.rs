//! Sensor connection lifecycle as an explicit state machine.
//!
//! The machine is pure: it consumes [`MachineEvent`]s and returns the
//! [`Action`]s the driver must perform against the radio link. It never
//! reaches a terminal state on its own; only [`MachineEvent::Cancel`] closes
//! it.
//!
//! ```text
//!            Open / retry timer
//!   Idle ─────────────────────────▶ Scanning ──scan window──▶ Idle (retry pause)
//!    ▲                                 │
//!    │                            DeviceFound
//!    │                                 ▼
//!    │  retry timer              Connecting ──Connected──▶ Connected
//!    │       ▲                         │                      │
//!    │       └──── Disconnected ◀──────┴──── failure/lost ────┘
//!    │                          (failure or attempt timeout)
//!    │
//!  Cancel (from any state, idempotent)
//! ```

use crate::source::link::DeviceInfo;
use std::time::Duration;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

/// Inputs to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// The stream was opened
    Open,
    DeviceFound(DeviceInfo),
    ScanFailed,
    Connected,
    ConnectFailed,
    /// Notifications are enabled on the measurement characteristic
    Subscribed,
    DiscoveryFailed,
    Disconnected,
    /// The most recently armed timer fired
    TimerElapsed,
    /// The caller cancelled the stream
    Cancel,
}

/// Work the driver must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StartScan,
    StopScan,
    Connect(DeviceInfo),
    Subscribe,
    /// Close the connection handle
    Release,
    /// Replace the pending timer with one firing after the duration
    Arm(Duration),
    /// Drop the pending timer
    Disarm,
}

/// The reconnect state machine.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    closed: bool,
    subscribed: bool,
    scan_window: Duration,
    retry_pause: Duration,
}

impl ConnectionMachine {
    pub fn new(scan_window: Duration, retry_pause: Duration) -> Self {
        Self {
            state: ConnectionState::Idle,
            closed: false,
            subscribed: false,
            scan_window,
            retry_pause,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the caller has cancelled the stream.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether measurement notifications should currently be forwarded.
    pub fn is_streaming(&self) -> bool {
        !self.closed && self.state == ConnectionState::Connected
    }

    /// Whether notifications have been enabled on the current connection.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Advance the machine by one event.
    pub fn handle(&mut self, event: MachineEvent) -> Vec<Action> {
        use ConnectionState::*;

        if self.closed {
            return Vec::new();
        }

        match (self.state, event) {
            (_, MachineEvent::Cancel) => self.close(),

            (Idle, MachineEvent::Open) => self.begin_scan(),

            // At most one connection attempt in flight: stop scanning first.
            // The attempt gets one scan window to complete.
            (Scanning, MachineEvent::DeviceFound(device)) => {
                self.state = Connecting;
                vec![Action::StopScan, Action::Arm(self.scan_window), Action::Connect(device)]
            }

            (Scanning, MachineEvent::ScanFailed) => {
                self.state = Idle;
                vec![Action::Arm(self.retry_pause)]
            }

            (Scanning, MachineEvent::TimerElapsed) => {
                self.state = Idle;
                vec![Action::StopScan, Action::Arm(self.retry_pause)]
            }

            (Idle | Disconnected, MachineEvent::TimerElapsed) => self.begin_scan(),

            (Connecting, MachineEvent::Connected) => {
                self.state = Connected;
                vec![Action::Disarm, Action::Subscribe]
            }

            (Connected, MachineEvent::Subscribed) => {
                self.subscribed = true;
                Vec::new()
            }

            (Connecting, MachineEvent::ConnectFailed | MachineEvent::Disconnected)
            | (Connected, MachineEvent::DiscoveryFailed | MachineEvent::Disconnected) => {
                self.drop_connection()
            }

            // The radio never answered the connection attempt.
            (Connecting, MachineEvent::TimerElapsed) => self.drop_connection(),

            // Stale or out-of-order events are ignored.
            _ => Vec::new(),
        }
    }

    fn begin_scan(&mut self) -> Vec<Action> {
        self.state = ConnectionState::Scanning;
        vec![Action::StartScan, Action::Arm(self.scan_window)]
    }

    fn drop_connection(&mut self) -> Vec<Action> {
        self.state = ConnectionState::Disconnected;
        self.subscribed = false;
        vec![Action::Release, Action::Arm(self.retry_pause)]
    }

    fn close(&mut self) -> Vec<Action> {
        let mut actions = match self.state {
            ConnectionState::Scanning => vec![Action::StopScan],
            ConnectionState::Connecting | ConnectionState::Connected => vec![Action::Release],
            ConnectionState::Idle | ConnectionState::Disconnected => Vec::new(),
        };
        actions.push(Action::Disarm);

        self.state = ConnectionState::Idle;
        self.subscribed = false;
        self.closed = true;
        actions
    }
}
