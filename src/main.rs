//! actionmap-replay
//!
//! Replays a YAML input scenario and prints the resulting action events.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use actionmap::{ActionEvent, InputSettings, Phase, Scenario};

/// Replay an input scenario against the action system
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scenario file
    script: PathBuf,

    /// Settings file overriding the scenario's own settings
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.json)?;

    let scenario = Scenario::load(&args.script)?;
    info!(
        "Loaded scenario {} ({} step(s))",
        args.script.display(),
        scenario.steps.len()
    );

    let report = match &args.settings {
        Some(path) => {
            let settings = InputSettings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            scenario.run_with(settings)?
        }
        None => scenario.run()?,
    };

    if args.json {
        for event in &report.events {
            println!("{}", serde_json::to_string(event)?);
        }
    } else {
        for event in &report.events {
            print_event(event);
        }
        println!(
            "\n{} {} event(s), {} update(s), t={:.3}",
            "Done:".bold(),
            report.events.len().to_string().green(),
            report.updates,
            report.final_time
        );
    }

    Ok(())
}

fn print_event(event: &ActionEvent) {
    let phase = format!("{:9}", event.phase.to_string());
    let phase = match event.phase {
        Phase::Started => phase.bright_yellow(),
        Phase::Performed => phase.bright_green(),
        Phase::Canceled => phase.bright_red(),
        Phase::Waiting => phase.normal(),
    };
    let interaction = event
        .interaction
        .as_deref()
        .map(|name| format!(" [{}]", name.cyan()))
        .unwrap_or_default();

    println!(
        "[{:>8.3}] {:16} {}{} {} = {} ({:.3}s)",
        event.time,
        event.action_name.bright_white(),
        phase,
        interaction,
        event.control_path.dimmed(),
        event.value,
        event.duration()
    );
}

/// Logs are written to stderr
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
