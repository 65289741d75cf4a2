//! APOGEE FPI actor binary.
//!
//! Reads command lines on stdin and writes replies to stdout as JSON lines.
//! Logs go to stderr.

use anyhow::{Context, Result};
use apogee_fpi::notify::{JsonLinesNotifier, Notifier};
use apogee_fpi::runner::{CommandRunner, ProcessRunner};
use apogee_fpi::surface::{CommandStatus, CommandSurface};
use apogee_fpi::{Settings, ShutterActor, ShutterCoordinator};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// APOGEE FPI CLI.
#[derive(Parser, Debug)]
#[command(name = "apogeefpi", version, about)]
struct Cli {
    /// Debug mode. Use additional v for more details.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to config/apogeefpi.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Runs the actor, reading commands from stdin.
    Actor,
    /// Runs a single actor command and exits.
    Run {
        /// Command and options, e.g. `close --no-calbox`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
}

fn init_tracing(configured: &str, verbose: u8) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("apogee_fpi={level},apogeefpi={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut term), Ok(mut hup)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) else {
        ctrl_c().await;
        return "SIGINT";
    };

    tokio::select! {
        _ = ctrl_c() => "SIGINT",
        _ = term.recv() => "SIGTERM",
        _ = hup.recv() => "SIGHUP",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    ctrl_c().await;
    "Ctrl-C"
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&settings.actor.log_level, cli.verbose);
    info!(actor = %settings.actor.name, "Starting APOGEE FPI actor");

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let coordinator = ShutterCoordinator::from_settings(&settings, runner)
        .context("Failed to configure shutter coordinator")?;
    let notifier: Arc<dyn Notifier> = Arc::new(JsonLinesNotifier::new(
        settings.actor.name.clone(),
        std::io::stdout(),
    ));

    let (handle, actor) = ShutterActor::new(coordinator, Arc::clone(&notifier)).spawn();
    let surface = Arc::new(CommandSurface::new(handle, notifier));

    let code = match cli.mode.unwrap_or(Mode::Actor) {
        Mode::Actor => {
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = Arc::clone(&surface).serve(stdin) => result.context("Failed to read commands")?,
                signal = shutdown_signal() => info!("Received {signal}, shutting down"),
            }
            ExitCode::SUCCESS
        }
        Mode::Run { words } => {
            let line = words.join(" ");
            let status = tokio::select! {
                status = surface.dispatch_line(&line) => status,
                signal = shutdown_signal() => {
                    info!("Received {signal}, shutting down");
                    Some(CommandStatus::Cancelled)
                }
            };
            match status {
                Some(CommandStatus::Finished | CommandStatus::Cancelled) => ExitCode::SUCCESS,
                Some(CommandStatus::Failed) | None => ExitCode::FAILURE,
            }
        }
    };

    actor.shutdown().await;
    info!("APOGEE FPI actor stopped");
    Ok(code)
}
