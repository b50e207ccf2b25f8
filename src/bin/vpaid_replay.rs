//! VPAID Scenario Replay
//!
//! Drives a simulated host session against the ad unit and prints what the
//! host would have observed: the event log per step, the tracking beacons
//! that fired, and the final lifecycle state.
//!
//! Usage:
//!   cargo run --features cli --bin vpaid_replay -- \
//!     --scenario scenarios/full_playback.yaml
//!
//! Examples:
//!   # Several scenarios, JSON report
//!   cargo run --features cli --bin vpaid_replay -- \
//!     --scenario scenarios/full_playback.yaml \
//!     --scenario scenarios/overlay_clickthrough.yaml \
//!     --json
//!
//!   # Unit internals at debug level
//!   RUST_LOG=playable_vpaid=debug cargo run --features cli --bin vpaid_replay -- \
//!     --scenario scenarios/skip.yaml --verbose

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playable_vpaid::scenario::{ReplayReport, Scenario};

/// Replay scripted VPAID host sessions
#[derive(Parser, Debug)]
#[command(name = "vpaid_replay")]
#[command(about = "Replay a YAML host session against the playable ad unit")]
struct Args {
    /// Scenario file (can be specified multiple times)
    #[arg(long, short = 's', required = true)]
    scenario: Vec<PathBuf>,

    /// Output reports as JSON
    #[arg(long)]
    json: bool,

    /// Log unit internals (overrides RUST_LOG)
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Don't fail when a scenario's expectations are not met
    #[arg(long)]
    no_verify: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("playable_vpaid=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "playable_vpaid=warn".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Returns whether every scenario met its expectations.
fn run(args: &Args) -> Result<bool> {
    let mut reports = Vec::new();
    let mut all_passed = true;

    for path in &args.scenario {
        let scenario = Scenario::load(path)
            .with_context(|| format!("loading {}", path.display()))?;
        let report = scenario.run();

        let verdict = match (&scenario.expect, args.no_verify) {
            (Some(expect), false) => Some(report.verify(expect)),
            _ => None,
        };
        if let Some(Err(_)) = &verdict {
            all_passed = false;
        }

        if !args.json {
            print_report(&report, verdict.as_ref());
        }
        reports.push(report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(all_passed)
}

fn print_report(
    report: &ReplayReport,
    verdict: Option<&Result<(), playable_vpaid::scenario::ScenarioError>>,
) {
    println!("\n{} {}", "Scenario:".cyan().bold(), report.name);

    for step in &report.steps {
        let events: Vec<String> = step.events.iter().map(ToString::to_string).collect();
        if events.is_empty() {
            println!("  {:>3}  {:<12} {}", step.index, step.op, "-".dimmed());
        } else {
            println!("  {:>3}  {:<12} {}", step.index, step.op, events.join(", ").green());
        }
    }

    let beacons = if report.beacons.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        report.beacons.join(", ").yellow().to_string()
    };
    println!("{} {}", "Beacons:".cyan().bold(), beacons);
    println!(
        "{} {:?}  ({}x{}, volume {})",
        "Final:".cyan().bold(),
        report.final_state,
        report.attributes.width,
        report.attributes.height,
        report.attributes.volume
    );

    match verdict {
        Some(Ok(())) => println!("{}", "PASS".green().bold()),
        Some(Err(err)) => println!("{} {}", "FAIL".red().bold(), err.to_string().red()),
        None => {}
    }
}
