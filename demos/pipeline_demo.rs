//! Demonstration of the Synheart Stress Agent pipeline.
//!
//! This example shows how to:
//! 1. Build a synthetic source whose scenario changes over time
//! 2. Arbitrate it against a sensor source that never connects
//! 3. Run a session and watch live stress states
//! 4. React to breathing triggers
//! 5. Drain and summarize the session buffer
//!
//! Run with: cargo run --example pipeline_demo

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use synheart_stress_agent::{
    clock::system_clock,
    source::{Mode, NoopAdapter, SensorConfig, SensorSource, SharedSource, SimMode, SyntheticSource},
    stats::create_stats,
    StoreConfig, StreamArbitrator, StressEvent, StressStore, WELLNESS_DISCLAIMER,
};
use tokio::sync::watch;

const SCENARIOS: [SimMode; 4] = [
    SimMode::Calm,
    SimMode::Stressed,
    SimMode::Recovery,
    SimMode::Normal,
];

#[tokio::main]
async fn main() {
    println!("Synheart Stress Agent - Pipeline Demo");
    println!("=====================================");
    println!("{WELLNESS_DISCLAIMER}");

    let clock = system_clock();
    let stats = create_stats();

    // The scenario index is read by the synthetic source on every tick.
    let scenario = Arc::new(AtomicU8::new(0));
    let selector = {
        let scenario = Arc::clone(&scenario);
        Arc::new(move || SCENARIOS[usize::from(scenario.load(Ordering::Relaxed)) % SCENARIOS.len()])
    };

    let synthetic: SharedSource = Arc::new(SyntheticSource::new(selector, 7, clock.clone()));
    let sensor: SharedSource = Arc::new(SensorSource::new(
        Arc::new(NoopAdapter),
        SensorConfig::default(),
        clock.clone(),
    ));

    let (mode_tx, mode_rx) = watch::channel(Mode::AutoPreferSensor);
    let arbitrator = StreamArbitrator::new(Some(sensor), Some(synthetic), mode_rx, 3_000);

    let config = StoreConfig {
        warmup_ms: 2_000,
        ..StoreConfig::default()
    };
    let store = StressStore::new(arbitrator, config, clock, stats.clone());
    let mut events = store.subscribe_events();
    let mut live = store.state();

    store.set_logged_in(true);
    store.set_app_opened(true);
    store.try_start();

    for (step, mode) in SCENARIOS.iter().enumerate() {
        scenario.store(step as u8, Ordering::Relaxed);
        println!();
        println!("--- Scenario: {mode} ---");

        let phase = tokio::time::sleep(Duration::from_secs(15));
        tokio::pin!(phase);
        loop {
            tokio::select! {
                _ = &mut phase => break,
                Ok(()) = live.changed() => {
                    let state = live.borrow_and_update().clone();
                    println!(
                        "  hr={:>3} stress={:>3} conf={:.2}",
                        state.heart_rate_bpm.unwrap_or(0),
                        state.stress_score,
                        state.confidence
                    );
                }
                Ok(StressEvent::TriggerBreathing { diagnostic, .. }) = events.recv() => {
                    println!("  >>> breathing exercise suggested ({diagnostic})");
                }
            }
        }

        let batch = store.drain_pending();
        println!("  drained {} sample(s) since the last phase", batch.len());
    }

    // Mode changes take effect immediately.
    mode_tx.send_replace(Mode::SyntheticOnly);

    store.shutdown().await;

    let summary = store.summary();
    println!();
    println!("Session summary:");
    println!("  avg hr:      {:.1}", summary.avg_hr);
    println!("  avg stress:  {:.1}", summary.avg_stress);
    println!("  avg rmssd:   {:.1}", summary.avg_rmssd);
    println!("  peak stress: {:.0}", summary.max_stress);
    println!();
    println!("{}", stats.summary());
}
