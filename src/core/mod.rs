//! Signal processing for the stress pipeline.
//!
//! This module contains:
//! - RMSSD heart-rate variability
//! - Stress scoring from HRV or heart rate
//! - Spike detection with cooldown
//! - Session sample accounting

pub mod hrv;
pub mod session;
pub mod spike;
pub mod stress;

pub use hrv::rmssd;
pub use session::{SessionBuffer, SessionSample, SessionSummary};
pub use spike::{SpikeConfig, SpikeDetector, SpikeResult};
pub use stress::{score, DerivedState, SignalProcessor};
