//! Radio capability used by the sensor source.
//!
//! The physical transport (BLE stack, platform APIs) lives behind these
//! traits. A link performs non-blocking requests and reports every outcome
//! as a [`LinkEvent`] on the channel it was opened with; radio callbacks may
//! send on that channel from any thread.

use tokio::sync::mpsc;
use uuid::Uuid;

/// Heart Rate service (0x180D).
pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/// Heart Rate Measurement characteristic (0x2A37).
pub const HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// A discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Platform address or identifier
    pub address: String,
    /// Advertised name, if any
    pub name: Option<String>,
}

impl DeviceInfo {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }
}

/// Asynchronous outcome reported by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A device advertising the target service was seen
    DeviceFound(DeviceInfo),
    /// The scan could not run
    ScanFailed(String),
    /// Connection established
    Connected,
    /// Connection attempt failed
    ConnectFailed(String),
    /// Measurement characteristic found and notifications enabled
    Subscribed,
    /// Service or characteristic discovery failed
    DiscoveryFailed(String),
    /// Raw measurement notification payload
    Notification(Vec<u8>),
    /// The peer went away
    Disconnected,
}

/// Sender half handed to a link when it is opened.
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Errors reported synchronously by link requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No radio hardware or it is switched off
    Unavailable,
    /// The request was rejected by the radio stack
    Rejected(String),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Unavailable => write!(f, "Radio is unavailable"),
            LinkError::Rejected(e) => write!(f, "Radio request rejected: {e}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// One open session with the radio.
pub trait SensorLink: Send {
    /// Begin scanning for devices advertising `service`.
    fn start_scan(&mut self, service: Uuid) -> Result<(), LinkError>;

    /// Stop an in-flight scan. Must be a no-op when not scanning.
    fn stop_scan(&mut self);

    /// Request a connection to `device`.
    fn connect(&mut self, device: &DeviceInfo) -> Result<(), LinkError>;

    /// Discover `service` and enable notifications on `characteristic`.
    fn subscribe(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), LinkError>;

    /// Close the connection handle. Must be a no-op when not connected.
    fn release(&mut self);
}

/// Factory for links; one link is opened per stream subscription.
pub trait SensorAdapter: Send + Sync + 'static {
    fn open(&self, events: LinkEventSender) -> Box<dyn SensorLink>;
}

/// Adapter for hosts without a radio.
///
/// Scans are accepted and never find anything, so a sensor stream built on
/// it stays open and silent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdapter;

impl SensorAdapter for NoopAdapter {
    fn open(&self, events: LinkEventSender) -> Box<dyn SensorLink> {
        Box::new(NoopLink { _events: events })
    }
}

struct NoopLink {
    _events: LinkEventSender,
}

impl SensorLink for NoopLink {
    fn start_scan(&mut self, _service: Uuid) -> Result<(), LinkError> {
        Ok(())
    }

    fn stop_scan(&mut self) {}

    fn connect(&mut self, _device: &DeviceInfo) -> Result<(), LinkError> {
        Err(LinkError::Unavailable)
    }

    fn subscribe(&mut self, _service: Uuid, _characteristic: Uuid) -> Result<(), LinkError> {
        Err(LinkError::Unavailable)
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_uuids() {
        assert_eq!(
            HEART_RATE_SERVICE.to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            HEART_RATE_MEASUREMENT.to_string(),
            "00002a37-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_noop_link_scans_quietly() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = NoopAdapter.open(tx);
        assert!(link.start_scan(HEART_RATE_SERVICE).is_ok());
        link.stop_scan();
        link.release();
        assert!(rx.try_recv().is_err());
    }
}
