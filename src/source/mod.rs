//! Sample sources for the stress pipeline.
//!
//! A [`SampleSource`] produces a lazy, restartable sequence of
//! [`RawSample`]s. Every call to [`SampleSource::stream`] starts a fresh
//! background producer; dropping the returned [`SampleStream`] cancels it.

pub mod arbitrator;
pub mod connection;
pub mod link;
pub mod packet;
pub mod sensor;
pub mod synthetic;
pub mod types;

use std::sync::Arc;
use tokio::sync::mpsc;

// Re-export commonly used types
pub use arbitrator::{FallbackGate, Mode, StreamArbitrator};
pub use connection::{ConnectionMachine, ConnectionState};
pub use link::{DeviceInfo, LinkError, LinkEvent, NoopAdapter, SensorAdapter, SensorLink};
pub use packet::{decode_measurement, Measurement};
pub use sensor::{SensorConfig, SensorSource};
pub use synthetic::{SimMode, SyntheticGenerator, SyntheticSource};
pub use types::{RawSample, SourceKind};

/// A producer of raw biometric samples.
///
/// `stream` spawns onto the current Tokio runtime and must be called from
/// within one.
pub trait SampleSource: Send + Sync + 'static {
    fn kind(&self) -> SourceKind;

    /// Open a new subscription.
    fn stream(&self) -> SampleStream;
}

/// Thread-safe shared source.
pub type SharedSource = Arc<dyn SampleSource>;

/// Producer half of a [`SampleStream`].
pub type SampleSender = mpsc::Sender<RawSample>;

/// Consumer handle for one subscription to a source.
#[derive(Debug)]
pub struct SampleStream {
    receiver: mpsc::Receiver<RawSample>,
}

impl SampleStream {
    /// Create a connected sender/stream pair.
    pub fn channel(capacity: usize) -> (SampleSender, SampleStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, SampleStream { receiver })
    }

    /// A stream that is already finished.
    pub fn empty() -> Self {
        let (_, stream) = Self::channel(1);
        stream
    }

    /// Wait for the next sample. `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<RawSample> {
        self.receiver.recv().await
    }

    /// Take a sample if one is already queued.
    pub fn try_next(&mut self) -> Option<RawSample> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_stream_is_finished() {
        let mut stream = SampleStream::empty();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_sender() {
        let (sender, stream) = SampleStream::channel(4);
        assert!(!sender.is_closed());
        drop(stream);
        assert!(sender.is_closed());
    }
}
