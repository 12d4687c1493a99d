//! Sleep Outbox CLI
//!
//! Producer and consumer entry points over the on-disk outbox.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sleep_outbox::{
    bridge::SensorBridge,
    config::Config,
    environment::{EnvironmentSample, LightMonitorService, SampleBuffer, SimulatedSensor},
    logging,
    outbox::{FileOutbox, Outbox, OutboxError, OutboxKey, OutboxStore},
    sleep::{SleepSegment, SleepSession},
    time::{Normalizer, ZoneRule},
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog},
    ProducerError, VERSION,
};

/// Exit status telling the host to redeliver the batch later.
const EXIT_RETRY: i32 = 75;

#[derive(Parser)]
#[command(name = "sleep-outbox")]
#[command(version = VERSION)]
#[command(about = "Durable outbox for background sleep and ambient sensors", long_about = None)]
struct Cli {
    /// Log each saved session and outbox commit
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a delivered batch of sleep segments (producer)
    RecordSleep {
        /// JSON array of {startTimeMillis, endTimeMillis, status?}; `-` reads stdin
        #[arg(long, default_value = "-")]
        segments: String,
    },

    /// Drain pending sleep sessions and print them (consumer)
    DrainSleep {
        /// Output format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Run the light monitor and print samples as they are drained
    Monitor {
        /// Stop after this many seconds (default: run until Ctrl+C)
        #[arg(long)]
        duration: Option<u64>,

        /// Sampling interval in milliseconds (default: from config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// How often to drain and print samples, in seconds
        #[arg(long, default_value = "10")]
        drain_every: u64,
    },

    /// Drain environment samples flushed by earlier monitor runs
    DrainEnv {
        /// Output format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Print offset-qualified timestamps for epoch milliseconds
    Normalize {
        /// Epoch milliseconds
        #[arg(required = true, allow_negative_numbers = true)]
        millis: Vec<i64>,

        /// Zone rule to use instead of the configured one
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Show pending counts and collection statistics
    Status,

    /// Show configuration
    Config {
        /// Write the current configuration to the config file and create the data directory
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}); using defaults");
            Config::default()
        }
    };
    logging::init(cli.verbose || config.verbose_diagnostics);

    let result = match cli.command {
        Commands::RecordSleep { segments } => cmd_record_sleep(&config, &segments),
        Commands::DrainSleep { format } => cmd_drain_sleep(&config, &format),
        Commands::Monitor {
            duration,
            interval_ms,
            drain_every,
        } => cmd_monitor(&config, duration, interval_ms, drain_every),
        Commands::DrainEnv { format } => cmd_drain_env(&config, &format),
        Commands::Normalize { millis, timezone } => cmd_normalize(&config, &millis, timezone),
        Commands::Status => cmd_status(&config),
        Commands::Config { init } => cmd_config(&config, init),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// `EXIT_RETRY` when the failure is transient storage trouble, else 1.
fn exit_code(e: &anyhow::Error) -> i32 {
    let retryable = e
        .downcast_ref::<ProducerError>()
        .is_some_and(ProducerError::is_retryable)
        || e
            .downcast_ref::<OutboxError>()
            .is_some_and(OutboxError::is_retryable);
    if retryable {
        EXIT_RETRY
    } else {
        1
    }
}

fn open_store(config: &Config) -> anyhow::Result<FileOutbox> {
    let dir = config.outbox_dir();
    let store = FileOutbox::open(&dir)
        .with_context(|| format!("opening outbox at {}", dir.display()))?;
    Ok(store.with_lock_retries(config.lock_retries))
}

fn open_transparency(config: &Config) -> SharedTransparencyLog {
    create_shared_log_with_persistence(config.transparency_path())
}

/// Carry corrupt-document resets seen by `store` into the stats and save them.
fn finish_transparency(log: &SharedTransparencyLog, store: &FileOutbox) {
    log.record_corrupt_resets(store.corrupt_resets());
    if let Err(e) = log.save() {
        tracing::warn!(error = %e, "Could not save transparency stats");
    }
}

fn cmd_record_sleep(config: &Config, segments: &str) -> anyhow::Result<()> {
    let raw = if segments == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading segments from stdin")?;
        buf
    } else {
        segments.to_string()
    };

    let batch: Vec<SleepSegment> =
        serde_json::from_str(&raw).context("segments must be a JSON array of sleep segments")?;
    let normalizer = config.normalizer()?;

    // Fresh handles on every invocation; nothing carries over between deliveries.
    let store = open_store(config)?;
    let transparency = open_transparency(config);

    let recorded = sleep_outbox::record_sleep_segments(&batch, &store, &normalizer)?;
    transparency.record_sleep_sessions(recorded as u64);
    finish_transparency(&transparency, &store);

    println!("Recorded {recorded} sleep session(s)");
    Ok(())
}

fn cmd_drain_sleep(config: &Config, format: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let transparency = open_transparency(config);

    let outbox: Outbox<SleepSession> = Outbox::new(&store, OutboxKey::sleep_sessions());
    let sessions = outbox.drain_all()?;
    transparency.record_sleep_sessions_drained(sessions.len() as u64);
    finish_transparency(&transparency, &store);

    print_entries(&sessions, format)
}

fn cmd_drain_env(config: &Config, format: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let transparency = open_transparency(config);

    let outbox: Outbox<EnvironmentSample> = Outbox::new(&store, OutboxKey::env_samples());
    let samples = outbox.drain_all()?;
    transparency.record_env_samples_drained(samples.len() as u64);
    finish_transparency(&transparency, &store);

    print_entries(&samples, format)
}

fn cmd_monitor(
    config: &Config,
    duration: Option<u64>,
    interval_ms: Option<u64>,
    drain_every: u64,
) -> anyhow::Result<()> {
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or(config.sample_interval);

    let store: Arc<dyn OutboxStore> = Arc::new(open_store(config)?);
    let transparency = open_transparency(config);

    let light = LightMonitorService::new(
        Box::new(SimulatedSensor::default()),
        SampleBuffer::shared(),
        interval,
    )
    .with_store(store.clone())
    .with_policy(config.shutdown_policy())
    .with_transparency(transparency.clone());
    let bridge = SensorBridge::new(store, light).with_transparency(transparency.clone());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")?;

    bridge.start_light_service()?;
    eprintln!(
        "Light monitor running (interval {}ms). Press Ctrl+C to stop.",
        interval.as_millis()
    );

    let started = Instant::now();
    let deadline = duration.map(|secs| started + Duration::from_secs(secs));
    let drain_every = Duration::from_secs(drain_every.max(1));
    let mut last_drain = Instant::now();

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if last_drain.elapsed() >= drain_every {
            for sample in bridge.get_env_samples()? {
                println!("{}", serde_json::to_string(&sample)?);
            }
            last_drain = Instant::now();
        }
        thread::sleep(Duration::from_millis(100));
    }

    eprintln!("Stopping light monitor...");
    bridge.stop_light_service()?;
    if let Err(e) = transparency.save() {
        tracing::warn!(error = %e, "Could not save transparency stats");
    }
    eprintln!("{}", transparency.summary());
    Ok(())
}

fn cmd_normalize(config: &Config, millis: &[i64], timezone: Option<String>) -> anyhow::Result<()> {
    let normalizer = match timezone {
        Some(name) => Normalizer::new(name.parse::<ZoneRule>()?),
        None => config.normalizer()?,
    };

    for &ms in millis {
        println!("{}", normalizer.normalize(ms)?);
    }
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;

    println!("Sleep Outbox Status");
    println!("===================");
    println!();
    println!("Outbox directory: {}", store.dir().display());
    println!("Timezone: {}", config.zone_rule()?);
    println!(
        "Pending sleep sessions: {}",
        store.pending(&OutboxKey::sleep_sessions())?
    );
    println!(
        "Pending flushed env samples: {}",
        store.pending(&OutboxKey::env_samples())?
    );
    println!();

    let transparency = open_transparency(config);
    if store.corrupt_resets() > 0 {
        finish_transparency(&transparency, &store);
    }
    println!("{}", transparency.summary());
    Ok(())
}

fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        config.ensure_directories()?;
        config.save()?;
        println!("Wrote {}", Config::config_path().display());
        println!("Data directory: {}", config.data_path.display());
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_entries<T: serde::Serialize>(entries: &[T], format: &str) -> anyhow::Result<()> {
    match format {
        "jsonl" => {
            for entry in entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
        "json" => println!("{}", serde_json::to_string_pretty(entries)?),
        other => bail!("unknown format '{other}' (expected json or jsonl)"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn io_failure() -> OutboxError {
        OutboxError::Io {
            path: PathBuf::from("outbox"),
            source: std::io::Error::other("disk full"),
        }
    }

    #[test]
    fn test_store_open_failure_asks_for_redelivery() {
        let e = anyhow::Error::new(io_failure()).context("opening outbox at /data/outbox");
        assert_eq!(exit_code(&e), EXIT_RETRY);
    }

    #[test]
    fn test_producer_store_failure_asks_for_redelivery() {
        let e = anyhow::Error::new(ProducerError::Store(io_failure()));
        assert_eq!(exit_code(&e), EXIT_RETRY);
    }

    #[test]
    fn test_bad_input_is_not_retried() {
        let e = anyhow::anyhow!("segments must be a JSON array of sleep segments");
        assert_eq!(exit_code(&e), 1);
    }
}
