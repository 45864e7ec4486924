//! `run` command implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{Clock, RaceConfig, SinkConfig, SinkType, TimingPacket};
use dispatcher::{create_sink_handle, Dispatcher, SinkHandle};
use race_engine::{EventScheduler, LapTimeGenerator, SystemClock};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::console::{Console, Input, StopReason};
use crate::error::CliError;
use crate::race::{RaceRunner, RunnerConfig, SessionStats};

const LISTENER_SINK: &str = "listener";

/// Execute the `run` command
pub async fn run_races(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args);
    ConfigLoader::validate(&config).context("Configuration invalid after CLI overrides")?;

    info!(
        laps = config.race.laps,
        skaters = config.skaters.len(),
        listener = %config.race.tcp.address(),
        "Configuration loaded"
    );

    print_race_summary(&config);

    let session_start = Instant::now();
    let mut console = Console::stdin();

    if !args.yes {
        println!("Please ensure the timing listener is running on the configured host and port.");
        if !console.pause("Press Enter to attempt connection...").await? {
            return Ok(());
        }
        println!();
    }

    let (packet_tx, packet_rx) = mpsc::channel::<TimingPacket>(args.queue_capacity);
    let (handles, online) = connect_sinks(&config, args).await?;
    let dispatcher_handle = Dispatcher::with_handles(handles, packet_rx).spawn();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let seed = config.race.seed.unwrap_or_else(rand::random);
    info!(seed, "Lap-time generator seeded");
    let scheduler = EventScheduler::new(LapTimeGenerator::new(seed, clock.clone()), clock.clone());

    let results_dir = config.output.results_dir.clone();
    let runner = RaceRunner::new(
        RunnerConfig {
            race: config,
            poll_interval: Duration::from_millis(args.poll_ms),
            online,
        },
        scheduler,
        clock,
        packet_tx,
    );

    let mut stats = SessionStats::default();
    let mut message = if online {
        "Connection established. Press Enter to start the race..."
    } else {
        "Press Enter to start the race..."
    };

    loop {
        if !args.yes {
            println!();
            if !console.pause(message).await? {
                break;
            }
            println!();
        }

        console.discard_pending();
        println!("(Press Enter to stop the race early)");
        println!();

        let outcome = runner.run(console.wait_for_stop()).await?;
        stats.record_race(&outcome);

        let path = outcome
            .report
            .write_results(&outcome.race, &results_dir)
            .with_context(|| format!("Failed to write results to {}", results_dir.display()))?;
        println!();
        println!("Race results saved to {}", path.display());
        println!();
        info!(
            path = %path.display(),
            lines = outcome.report.lines().len(),
            "Race results written"
        );
        stats.results_files.push(path.display().to_string());

        if args.yes || outcome.stopped == Some(StopReason::Signal) {
            break;
        }

        match choose_next(&mut console).await {
            NextAction::AnotherRace => message = "Press Enter to start the new race...",
            NextAction::Exit => break,
        }
    }

    // Closing the packet channel lets the dispatcher drain and shut sinks down
    drop(runner);
    match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
        Ok(Ok(sinks)) => stats.sinks = sinks,
        Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
        Err(_) => warn!("Timed out waiting for sinks to flush"),
    }

    if online {
        println!("Disconnected from timing listener.");
    }

    stats.duration = session_start.elapsed();
    info!(
        races = stats.races_run,
        laps = stats.laps_released,
        packets = stats.packets_sent(),
        "Lap Synth finished"
    );
    stats.print_summary();
    Ok(())
}

enum NextAction {
    AnotherRace,
    Exit,
}

async fn choose_next(console: &mut Console) -> NextAction {
    loop {
        println!("What would you like to do?");
        println!("1. Run another race (keep connection)");
        println!("2. Disconnect and exit");
        println!("Enter your choice (1 or 2):");

        match console.read().await {
            Input::Line(choice) if choice == "1" => return NextAction::AnotherRace,
            Input::Line(choice) if choice == "2" => return NextAction::Exit,
            Input::Line(_) => {
                println!("Invalid choice. Please enter 1 or 2.");
                println!();
            }
            Input::Closed | Input::Interrupted => return NextAction::Exit,
        }
    }
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut RaceConfig, args: &RunArgs) {
    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding listener host from CLI");
        config.race.tcp.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port, "Overriding listener port from CLI");
        config.race.tcp.port = port;
    }
    if let Some(seed) = args.seed {
        config.race.seed = Some(seed);
    }
    if args.no_dual_transponder {
        config.race.dual_transponder.enabled = false;
    }
    if let Some(ref dir) = args.results_dir {
        config.output.results_dir = dir.clone();
    }
}

/// Sinks besides the listener, from command-line flags
fn extra_sinks(args: &RunArgs) -> Vec<SinkConfig> {
    let mut sinks = Vec::new();

    if let Some(ref path) = args.capture {
        sinks.push(SinkConfig {
            name: "capture".to_string(),
            sink_type: SinkType::File,
            queue_capacity: args.queue_capacity,
            params: HashMap::from([("path".to_string(), path.display().to_string())]),
        });
    }

    if args.log_packets {
        sinks.push(SinkConfig {
            name: "log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: args.queue_capacity,
            params: HashMap::new(),
        });
    }

    sinks
}

/// Connect the listener and create the extra sinks.
///
/// A listener that cannot be reached is reported and the session continues
/// offline; any other sink failure is fatal.
async fn connect_sinks(config: &RaceConfig, args: &RunArgs) -> Result<(Vec<SinkHandle>, bool)> {
    let address = config.race.tcp.address();
    let listener = SinkConfig {
        name: LISTENER_SINK.to_string(),
        sink_type: SinkType::Network,
        queue_capacity: args.queue_capacity,
        params: HashMap::from([("addr".to_string(), address.clone())]),
    };

    let mut handles = Vec::new();
    let online = match create_sink_handle(&listener).await {
        Ok(handle) => {
            println!("Connected to timing listener at {address}");
            handles.push(handle);
            true
        }
        Err(e) => {
            warn!(address = %address, error = %e, "Listener unreachable, running offline");
            println!("Failed to connect to timing listener: {e}");
            println!("Continuing without TCP connection...");
            false
        }
    };

    for sink in extra_sinks(args) {
        let handle = create_sink_handle(&sink)
            .await
            .with_context(|| format!("Failed to create sink '{}'", sink.name))?;
        handles.push(handle);
    }

    Ok((handles, online))
}

/// Print the race configuration before connecting
fn print_race_summary(config: &RaceConfig) {
    println!("=== Lap Time Synthesizer ===");
    println!();
    println!("Race Configuration:");
    println!("  • Distance: {} laps", config.race.laps);
    println!("  • Number of racers: {}", config.skaters.len());
    println!("  • Target host: {}", config.race.tcp.host);
    println!("  • Target port: {}", config.race.tcp.port);
    match config.race.dual_transponder.delay() {
        Some(delay) => println!(
            "  • Dual transponder: {} ms",
            delay.num_microseconds().unwrap_or_default() as f64 / 1000.0
        ),
        None => println!("  • Dual transponder: off"),
    }
    println!("  • Results: {}", config.output.results_dir.display());
    println!();
}
