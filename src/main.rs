//! Ondes GW - console hardware to Pure Data bridge

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ondes_gw::clock::{Clock, MonotonicClock};
use ondes_gw::config::AppConfig;
use ondes_gw::console::Console;
use ondes_gw::osc::{spawn_listener, OscSink};
use ondes_gw::paths;
use ondes_gw::sensing::Peripherals;

/// Ondes GW - drive the Ondes synthesis engine from the console hardware
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// List the performances in the MIDI directory
    #[arg(long)]
    list_files: bool,

    /// Play a performance, then continue with the live console
    #[arg(long, value_name = "FILE")]
    play: Option<PathBuf>,

    /// Start a recording session at start-up
    #[arg(long)]
    record: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = load_config(args.config.as_deref()).await?;
    let _log_guard = init_logging(&args.log_level, config.logging.directory.as_deref())?;

    if args.list_ports {
        list_ports_formatted()?;
        return Ok(());
    }

    if args.list_files {
        list_files_formatted(&config)?;
        return Ok(());
    }

    info!("Starting Ondes GW v{}...", env!("CARGO_PKG_VERSION"));
    run_app(config, args.play, args.record).await?;
    info!("Ondes GW shutdown complete");
    Ok(())
}

async fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match paths::resolve_config(explicit)? {
        Some(path) => AppConfig::load(&path).await,
        None => {
            let config = AppConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn run_app(config: AppConfig, play: Option<PathBuf>, record: bool) -> Result<()> {
    let (request_tx, request_rx) = crossbeam::channel::unbounded();
    let (_, listener) = spawn_listener(config.osc.listen_port, request_tx).await?;

    let sink = Arc::new(OscSink::new(config.osc.engine_addr)?);
    info!("Sending control stream to {}", sink.target());

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut console_task = tokio::task::spawn_blocking({
        let shutdown = shutdown.clone();
        move || -> Result<()> {
            let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
            let hw = Peripherals::open(&config, clock.as_ref())
                .context("Failed to initialise console hardware")?;
            let mut console = Console::new(&config, hw, sink, clock, request_rx, shutdown);

            console.start();
            if record {
                console.start_recording();
            }
            if let Some(file) = play {
                if let Err(e) = console.play_file(&file) {
                    error!("Playback of {} failed: {:#}", file.display(), e);
                }
            }
            console.run();
            Ok(())
        }
    });

    let result = tokio::select! {
        joined = &mut console_task => joined,
        _ = shutdown_signal() => {
            shutdown.store(true, Ordering::Relaxed);
            console_task.await
        }
    };

    listener.abort();
    result.context("Console thread panicked")?
}

fn init_logging(level: &str, directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "ondes-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn list_ports_formatted() -> Result<()> {
    use colored::*;

    let input = midir::MidiInput::new("ondes-gw-ports").context("Failed to open MIDI input")?;

    println!("\n{}", "=== Available MIDI Input Ports ===".bold().cyan());
    let ports = input.ports();
    if ports.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }
    for (index, port) in ports.iter().enumerate() {
        match input.port_name(port) {
            Ok(name) => println!("  {} {}", format!("[{}]", index).green(), name),
            Err(e) => println!("  {} {}", format!("[{}]", index).red(), e),
        }
    }
    println!(
        "\n{}",
        "Set keyboard.port to a substring of a name to use it".dimmed()
    );
    Ok(())
}

fn list_files_formatted(config: &AppConfig) -> Result<()> {
    use colored::*;

    let dir = &config.playback.midi_dir;
    let files = paths::list_performances(dir)?;

    println!(
        "\n{} {}",
        "=== Performances in".bold().cyan(),
        format!("{} ===", dir.display()).bold().cyan()
    );
    if files.is_empty() {
        println!("  {}", "No MIDI files found".dimmed());
    }
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("  {}", name.bright_white());
    }
    Ok(())
}
