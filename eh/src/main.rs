//! escapehub - presence and session hub
//!
//! CLI entry point for running the hub and inspecting its configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use escapehub::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use escapehub::config::Config;
use escapehub::coordinator::{Coordinator, CoordinatorConfig};
use escapehub::dispatch::{Dispatcher, PacedDispatcher};
use escapehub::domain::DeviceId;
use escapehub::events::{EventBus, EventJournal, read_journal};
use escapehub::presence::LivenessTicker;
use escapehub::transport::{Server, TcpPublisher};

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_file: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_file {
        let log_path = get_log_path();
        if let Some(log_dir) = log_path.parent() {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), cli.log_file)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Config { check, format }) => cmd_config(&config, check, format),
        Some(Command::Run { listen }) => run_hub(config, listen).await,
        Some(Command::Events { lines, device, file }) => cmd_events(file, lines, device),
        None => run_hub(config, None).await,
    }
}

/// Validate and print the effective configuration
fn cmd_config(config: &Config, check: bool, format: OutputFormat) -> Result<()> {
    debug!(check, %format, "cmd_config: called");
    config.validate().context("Invalid configuration")?;

    if check {
        println!("Configuration OK");
        return Ok(());
    }

    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(config).context("Failed to render config")?,
        OutputFormat::Json => serde_json::to_string_pretty(config).context("Failed to render config")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

/// Print the tail of the event journal
fn cmd_events(file: Option<PathBuf>, lines: usize, device: Option<DeviceId>) -> Result<()> {
    debug!(?file, lines, ?device, "cmd_events: called");
    let path = file.unwrap_or_else(EventJournal::default_path);

    if !path.exists() {
        println!("No event journal found at: {}", path.display());
        println!("The hub may not have been started yet.");
        return Ok(());
    }

    let entries: Vec<_> = read_journal(&path)
        .with_context(|| format!("Failed to read event journal {}", path.display()))?
        .into_iter()
        .filter(|entry| device.is_none_or(|d| entry.event.device() == Some(d)))
        .collect();

    let start = entries.len().saturating_sub(lines);
    for entry in &entries[start..] {
        let detail = serde_json::to_string(&entry.event).context("Failed to render event")?;
        println!("{} {:<16} {}", entry.timestamp.to_rfc3339(), entry.event.event_type(), detail);
    }
    Ok(())
}

/// Run the hub until SIGINT/SIGTERM
async fn run_hub(mut config: Config, listen: Option<String>) -> Result<()> {
    debug!(?listen, "run_hub: called");
    if let Some(addr) = listen {
        config.transport.listen = addr;
    }

    // Fail fast on bad configuration
    config.validate().context("Invalid configuration")?;
    info!(
        devices = ?config.devices,
        tasks = ?config.tasks,
        timeout_ms = config.liveness.timeout_ms,
        max_missed = config.liveness.max_missed,
        period_ms = config.liveness.period_ms,
        "Hub starting"
    );

    let events = EventBus::with_default_capacity();
    let journal_handle = match EventJournal::open(EventJournal::default_path()) {
        Ok(journal) => Some(tokio::spawn(journal.run(events.subscribe()))),
        Err(e) => {
            warn!(error = %e, "Event journal unavailable, continuing without it");
            None
        }
    };

    let publisher = TcpPublisher::new();
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(PacedDispatcher::new(publisher.clone(), config.dispatch.pacing()));

    let coordinator = Coordinator::new(CoordinatorConfig::from(&config), dispatcher).with_event_bus(events);
    let handle = coordinator.handle();
    let ticker = LivenessTicker::new(config.liveness.period(), coordinator.sender());

    let server = Server::bind(
        &config.transport.listen,
        handle.clone(),
        publisher,
        config.transport.peer_buffer,
    )
    .await?;
    let listen_addr = server.local_addr()?;

    let coord_handle = tokio::spawn(coordinator.run());

    let (ticker_shutdown_tx, ticker_shutdown_rx) = mpsc::channel::<()>(1);
    let ticker_handle = tokio::spawn(async move {
        if let Err(e) = ticker.run(ticker_shutdown_rx).await {
            error!(error = %e, "LivenessTicker error");
        }
    });

    let (server_shutdown_tx, server_shutdown_rx) = mpsc::channel::<()>(1);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown_rx).await {
            error!(error = %e, "Server error");
        }
    });

    info!(%listen_addr, "Hub running. Press Ctrl+C to stop.");

    wait_for_shutdown().await?;
    info!("Hub shutting down...");

    let _ = server_shutdown_tx.send(()).await;
    let _ = ticker_shutdown_tx.send(()).await;
    let _ = server_handle.await;
    let _ = ticker_handle.await;

    if let Err(e) = handle.shutdown().await {
        debug!(error = %e, "run_hub: coordinator already stopped");
    }
    drop(handle);
    let _ = coord_handle.await;

    if let Some(journal) = journal_handle {
        match journal.await {
            Ok(written) => debug!(written, "run_hub: event journal closed"),
            Err(e) => warn!(error = %e, "Event journal task failed"),
        }
    }

    debug!("run_hub: shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    debug!("wait_for_shutdown: setting up signal handlers");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    Ok(())
}

