//! Demonstration of the producer/consumer hand-off.
//!
//! This example shows how to:
//! 1. Record sleep segment batches into a file-backed outbox
//! 2. Run the light monitor for a few seconds
//! 3. Drain sleep sessions and environment samples as the app would
//!
//! Run with: cargo run --example drain_demo

use std::sync::Arc;
use std::time::Duration;

use sleep_outbox::{
    bridge::SensorBridge,
    environment::{LightMonitorService, SampleBuffer, ShutdownPolicy, SimulatedSensor},
    outbox::{FileOutbox, OutboxStore},
    sleep::{SegmentStatus, SleepSegment},
    time::Normalizer,
};

fn main() {
    println!("Sleep Outbox - Drain Demo");
    println!("=========================");
    println!();

    let dir = std::env::temp_dir().join("sleep-outbox-demo");
    let store: Arc<dyn OutboxStore> = match FileOutbox::open(&dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Could not open outbox at {}: {e}", dir.display());
            return;
        }
    };
    println!("Outbox directory: {}", dir.display());

    let light = LightMonitorService::new(
        Box::new(SimulatedSensor::new(10, 250.0)),
        SampleBuffer::shared(),
        Duration::from_millis(200),
    )
    .with_store(store.clone())
    .with_policy(ShutdownPolicy::Flush);
    let bridge = SensorBridge::new(store, light);

    // Two deliveries, as the detector would hand them over.
    let normalizer = Normalizer::system();
    let deliveries = [
        vec![SleepSegment::new(1_700_000_000_000, 1_700_028_800_000)],
        vec![
            SleepSegment::new(1_700_086_400_000, 1_700_110_000_000),
            SleepSegment::new(1_700_110_000_000, 1_700_112_000_000)
                .with_status(SegmentStatus::MissingData),
        ],
    ];
    for batch in &deliveries {
        match bridge.record_sleep_segments(batch, &normalizer) {
            Ok(n) => println!("Recorded {n} sleep session(s)"),
            Err(e) => eprintln!("Record failed: {e}"),
        }
    }
    println!();

    if let Err(e) = bridge.start_light_service() {
        eprintln!("Could not start light monitor: {}", e.reply().message);
        return;
    }
    println!("Sampling light and noise for 2 seconds...");
    std::thread::sleep(Duration::from_secs(2));

    match bridge.get_env_samples() {
        Ok(samples) => {
            println!("Drained {} environment sample(s):", samples.len());
            for sample in samples {
                println!(
                    "  {} lux={:.1} noise={:.1}dB",
                    sample.timestamp_millis, sample.lux, sample.noise_db
                );
            }
        }
        Err(e) => eprintln!("Drain failed: {}", e.reply().message),
    }

    if let Err(e) = bridge.stop_light_service() {
        eprintln!("Stop failed: {}", e.reply().message);
    }
    println!();

    match bridge.drain_sleep_sessions() {
        Ok(sessions) => {
            println!("Drained {} sleep session(s):", sessions.len());
            for session in sessions {
                println!("  {} ~ {}", session.sleep_time, session.wake_time);
            }
        }
        Err(e) => eprintln!("Drain failed: {}", e.reply().message),
    }

    // Anything flushed by stop() is picked up by the next drain.
    if let Ok(rest) = bridge.get_env_samples() {
        println!("Samples flushed on stop: {}", rest.len());
    }

    println!();
    println!("{}", bridge.transparency().summary());
}
