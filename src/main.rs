//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest harvesting engine.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{load_sources, LoadedSources};
use sumi_harvest::output::{print_report, write_report, JsonLinesSink, RunReport};
use sumi_harvest::pipeline::discover;
use sumi_harvest::runtime::{Coordinator, RunOptions};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a configuration-driven web harvester
///
/// Sumi-Harvest reads source definitions, discovers listing pages, follows
/// detail links, and emits validated, deduplicated records together with a
/// run report.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A configuration-driven web harvester", long_about = None)]
struct Cli {
    /// Path to a TOML or JSON source configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only run the sources with these ids (repeatable)
    #[arg(long = "source", value_name = "ID")]
    sources: Vec<String>,

    /// Directory receiving per-source artifacts
    #[arg(long, value_name = "DIR", default_value = "harvest-output")]
    output_dir: PathBuf,

    /// Write the run report here instead of stdout
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Number of sources harvested concurrently
    #[arg(long, value_name = "N", default_value_t = 2)]
    parallel: usize,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Share one dedupe store across all sources
    #[arg(long)]
    share_dedupe: bool,

    /// Validate config and show listing URLs without fetching anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let loaded = load_sources(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()));
    let mut loaded = match loaded {
        Ok(loaded) => loaded,
        Err(e) if cli.dry_run => return Err(e),
        Err(e) => return report_load_failure(&cli, &e),
    };
    tracing::info!(
        "Configuration loaded: {} sources, {} rejected (hash: {})",
        loaded.sources.len(),
        loaded.rejected.len(),
        loaded.config_hash
    );

    if !cli.sources.is_empty() {
        select_sources(&mut loaded, &cli.sources)?;
    }

    if cli.dry_run {
        handle_dry_run(&loaded);
        return Ok(if loaded.rejected.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    handle_harvest(cli, loaded).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Keeps only the requested sources, failing on unknown ids
fn select_sources(loaded: &mut LoadedSources, wanted: &[String]) -> anyhow::Result<()> {
    let known = loaded
        .sources
        .iter()
        .map(|s| s.source_id.as_str())
        .chain(loaded.rejected.iter().map(|r| r.source_id.as_str()));
    let known: Vec<&str> = known.collect();
    if let Some(unknown) = wanted.iter().find(|id| !known.contains(&id.as_str())) {
        anyhow::bail!("unknown source id '{}'", unknown);
    }

    loaded.sources.retain(|s| wanted.contains(&s.source_id));
    loaded.rejected.retain(|r| wanted.contains(&r.source_id));
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(loaded: &LoadedSources) {
    println!("=== Sumi-Harvest Dry Run ===\n");
    println!("Config hash: {}", loaded.config_hash);

    println!("\nSources ({}):", loaded.sources.len());
    for source in &loaded.sources {
        let listing_urls = discover(&source.entrypoints);
        println!(
            "  - {} [{:?}{}]{}",
            source.source_id,
            source.engine.kind,
            if loaded.was_migrated(&source.source_id) {
                ", migrated"
            } else {
                ""
            },
            if source.enabled { "" } else { " (disabled)" }
        );
        println!(
            "    discovery: {:?}, listing concurrency {}, detail concurrency {}",
            source.discovery.method,
            source.pipeline.listing_concurrency,
            source.pipeline.detail_concurrency
        );
        println!("    listing URLs ({}):", listing_urls.len());
        for url in &listing_urls {
            println!("      * {}", url);
        }
    }

    if !loaded.rejected.is_empty() {
        println!("\nRejected ({}):", loaded.rejected.len());
        for rejected in &loaded.rejected {
            println!("  - {}: {}", rejected.source_id, rejected.error);
        }
    }

    println!("\nDry run complete. No pages were fetched.");
}

/// Writes a report for a run whose configuration could not be loaded
fn report_load_failure(cli: &Cli, error: &anyhow::Error) -> anyhow::Result<ExitCode> {
    tracing::error!("{:#}", error);
    let report = RunReport::aborted(format!("{:#}", error));
    write_report(&report, cli.report.as_deref()).context("failed to write run report")?;
    if !cli.quiet {
        print_report(&report);
    }
    Ok(ExitCode::FAILURE)
}

/// Handles a real harvesting run
async fn handle_harvest(cli: Cli, loaded: LoadedSources) -> anyhow::Result<ExitCode> {
    let options = RunOptions {
        max_parallel_sources: cli.parallel.max(1),
        timeout: cli.timeout.map(Duration::from_secs),
        share_dedupe: cli.share_dedupe,
    };
    let coordinator =
        Coordinator::new(options).with_sink(Arc::new(JsonLinesSink::new(&cli.output_dir)));

    // Cancel on Ctrl-C; in-flight fetches drain and the report is still written
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let report = coordinator.run_loaded(loaded).await;

    write_report(&report, cli.report.as_deref()).context("failed to write run report")?;
    if !cli.quiet {
        print_report(&report);
    }

    Ok(if report.all_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
