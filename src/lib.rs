//! Synheart Stress Agent - real-time heart-rate stress pipeline.
//!
//! This library ingests heart-rate and beat-interval samples from a
//! Bluetooth heart-rate sensor or a synthetic generator, derives a stress
//! estimate from each sample, flags sustained stress spikes, and buffers the
//! results for periodic upload.
//!
//! # Wellness, not diagnosis
//!
//! - **Not clinical**: scores are a simple mapping of HRV and heart rate
//! - **Local first**: all processing happens on the device
//! - **Loss tolerant**: uploads that fail are dropped, never retried
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Synheart Stress Agent                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐                                                 │
//! │  │   Sensor    │──┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │ (FSM + BLE) │  ├──▶│ Arbitrator  │──▶│   Signal    │          │
//! │  └─────────────┘  │   │   (mode)    │   │  Processor  │          │
//! │  ┌─────────────┐  │   └─────────────┘   └─────────────┘          │
//! │  │  Synthetic  │──┘                            │                 │
//! │  └─────────────┘              ┌────────────────┼──────────┐      │
//! │                               ▼                ▼          ▼      │
//! │                        ┌────────────┐  ┌────────────┐ ┌───────┐  │
//! │                        │ Live state │  │   Spike    │ │Session│  │
//! │                        │  (watch)   │  │  Detector  │ │Buffer │  │
//! │                        └────────────┘  └────────────┘ └───────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_stress_agent::{
//!     clock::system_clock, source::*, stats::create_stats, StoreConfig, StressStore,
//! };
//! use tokio::sync::watch;
//!
//! # async fn demo() {
//! let clock = system_clock();
//! let synthetic: SharedSource =
//!     Arc::new(SyntheticSource::fixed(SimMode::Stressed, 42, clock.clone()));
//! let (_mode, mode_rx) = watch::channel(Mode::SyntheticOnly);
//! let arbitrator = StreamArbitrator::new(None, Some(synthetic), mode_rx, 3_000);
//!
//! let store = StressStore::new(arbitrator, StoreConfig::default(), clock, create_stats());
//! store.set_logged_in(true);
//! store.set_app_opened(true);
//! store.try_start();
//!
//! let mut live = store.state();
//! while live.changed().await.is_ok() {
//!     println!("stress: {}", live.borrow().stress_score);
//! }
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod gateway;
pub mod source;
pub mod stats;
pub mod store;

// Re-export key types at crate root for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, ConfigError};
pub use core::{
    DerivedState, SessionBuffer, SessionSample, SessionSummary, SignalProcessor, SpikeConfig,
    SpikeDetector, SpikeResult,
};
pub use gateway::{GatewayConfig, GatewayError, SessionSink, SessionUpload};
pub use source::{
    Mode, RawSample, SampleSource, SampleStream, SensorSource, SimMode, SourceKind,
    StreamArbitrator, SyntheticSource,
};
pub use stats::{PipelineStats, SharedStats};
pub use store::{StoreConfig, StressEvent, StressStore};

// Gateway client (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::GatewayClient;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wellness disclaimer that can be displayed to users.
pub const WELLNESS_DISCLAIMER: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          SYNHEART STRESS AGENT - WELLNESS DISCLAIMER             ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent estimates stress from heart-rate data for general    ║
║  wellness and relaxation practice.                               ║
║                                                                  ║
║  ✓ WHAT IT DOES:                                                 ║
║    • Reads heart rate and beat intervals from a chest strap      ║
║      or generates synthetic data for demos                       ║
║    • Maps heart-rate variability (RMSSD) to a 0-100 score        ║
║    • Suggests a breathing exercise on a sustained spike          ║
║                                                                  ║
║  ✗ WHAT IT IS NOT:                                               ║
║    • A medical device                                            ║
║    • A diagnosis of any condition                                ║
║    • A substitute for professional advice                        ║
║                                                                  ║
║  If you feel unwell, contact a healthcare professional.          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
