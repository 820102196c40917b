//! classroom-sim: runs the classroom admission simulation.
//!
//! # Usage
//!
//! ```bash
//! # Default four-room catalog until Ctrl+C
//! classroom-sim
//!
//! # Custom catalog for one minute, JSON status lines
//! classroom-sim --config rooms.toml --duration 60 --report-format json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use classroom::config::EntryPolicyKind;
use classroom::reporter::render_json_lines;
use classroom::{Simulation, SimulationConfig, StatusRecord, render_table};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Classroom admission simulation
#[derive(Parser, Debug)]
#[command(name = "classroom-sim")]
#[command(about = "Simulates occupants, visitors and session holders sharing classrooms")]
#[command(version)]
struct Args {
    /// TOML config file; built-in defaults when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(short, long)]
    duration: Option<u64>,

    /// Override the cap on live occupant and visitor actors
    #[arg(long)]
    max_actors: Option<usize>,

    /// Override how occupants and visitors wait for entry
    #[arg(long, value_enum)]
    entry_policy: Option<CliEntryPolicy>,

    /// Status report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    report_format: ReportFormat,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliEntryPolicy {
    Blocking,
    Polling,
}

impl From<CliEntryPolicy> for EntryPolicyKind {
    fn from(policy: CliEntryPolicy) -> Self {
        match policy {
            CliEntryPolicy::Blocking => EntryPolicyKind::Blocking,
            CliEntryPolicy::Polling => EntryPolicyKind::Polling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Table,
    Json,
}

/// RUST_LOG wins; otherwise `--log-level`, then CLASSROOM_LOG, then info.
/// LOG_FORMAT=json switches to JSON output. Logs go to stderr so the status
/// reports on stdout stay clean.
fn init_tracing(cli_level: Option<&str>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let env_level = std::env::var("CLASSROOM_LOG").ok();
        let base_level = match cli_level.or(env_level.as_deref()) {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") | Some("warning") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!(
            "classroom={level},classroom_sim={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn load_config(args: &Args) -> anyhow::Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(max_actors) = args.max_actors {
        config.max_actors = max_actors;
    }
    if let Some(policy) = args.entry_policy {
        config.entry_policy = policy.into();
    }
    config.validate()?;
    Ok(config)
}

fn print_report(format: ReportFormat, records: &[StatusRecord]) {
    match format {
        ReportFormat::Table => println!("{}", render_table(records)),
        ReportFormat::Json => match render_json_lines(records) {
            Ok(lines) => println!("{lines}"),
            Err(e) => tracing::error!(error = %e, "Failed to serialize status report"),
        },
    }
}

/// Resolves on SIGINT, SIGTERM or after `duration`.
async fn shutdown_signal(duration: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, stopping"),
        _ = terminate => tracing::info!("Received SIGTERM, stopping"),
        _ = deadline => tracing::info!("Run duration elapsed, stopping"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let config = load_config(&args)?;
    let format = args.report_format;

    let handle = Simulation::start(config, move |records: &[StatusRecord]| {
        print_report(format, records)
    })
    .context("starting simulation")?;

    shutdown_signal(args.duration.map(Duration::from_secs)).await;

    let report = handle.shutdown().await;
    match format {
        ReportFormat::Table => {
            println!("{}", render_table(&report.final_state));
            println!(
                "sessions completed: {}, actors spawned: {} (completed {}, abandoned {}, failed {})",
                report.sessions_completed,
                report.actors.spawned,
                report.actors.completed,
                report.actors.abandoned,
                report.actors.failed,
            );
        }
        ReportFormat::Json => println!("{}", serde_json::to_string(&report)?),
    }

    anyhow::ensure!(
        report.is_clean(),
        "simulation did not shut down cleanly: {} holder failure(s), {} actor failure(s)",
        report.holder_failures,
        report.actors.failed
    );
    Ok(())
}
