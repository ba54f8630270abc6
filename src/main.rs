//! toolgate - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolgate::{
    cli::{Args, Commands, Verbosity},
    config::Config,
    tools::{
        events::{EventBus, ToolEvent},
        BatchMode, PathGuard, ToolRuntime, ToolStats,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();
    init_tracing(verbosity);

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let root = args.command.root();
    match args.command {
        Commands::CheckPath { path, .. } => check_path(&root, &path, &config),
        Commands::Schema { .. } => print_schema(&root, &config),
        Commands::Run {
            payload,
            parallel,
            timeout_ms,
            ..
        } => run_payload(&root, &payload, parallel, timeout_ms, &config, verbosity).await,
    }
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn check_path(root: &Path, input: &str, config: &Config) -> Result<()> {
    let guard = PathGuard::new(root, config.guard_options())
        .with_context(|| format!("Invalid project root {}", root.display()))?;

    match guard.validate(input) {
        Ok(resolved) => {
            println!("{} {}", "allowed".green().bold(), resolved.display());
            Ok(())
        }
        Err(e) => {
            println!("{} [{}] {}", "denied".red().bold(), e.kind(), e);
            std::process::exit(1);
        }
    }
}

fn print_schema(root: &Path, config: &Config) -> Result<()> {
    let runtime = ToolRuntime::from_config(root, config)?;
    let schema = serde_json::to_string_pretty(&runtime.llm_functions())?;
    println!("{schema}");
    Ok(())
}

async fn run_payload(
    root: &Path,
    source: &str,
    parallel: bool,
    timeout_ms: Option<u64>,
    config: &Config,
    verbosity: Verbosity,
) -> Result<()> {
    let payload = read_payload(source)?;

    let mut runtime = ToolRuntime::from_config(root, config)?;
    let mut defaults = runtime.defaults().clone();
    if parallel {
        defaults.batch_mode = BatchMode::Parallel;
    }
    if let Some(ms) = timeout_ms {
        defaults.timeout = Duration::from_millis(ms);
    }
    runtime.set_defaults(defaults);

    if matches!(verbosity, Verbosity::Verbose | Verbosity::VeryVerbose) {
        let (bus, mut events) = EventBus::new();
        runtime = runtime.with_broadcaster(Arc::new(bus));
        tokio::spawn(async move {
            while let Some(published) = events.recv().await {
                match published.event {
                    ToolEvent::CallStarted { tool_name, tool_call_id, .. } => {
                        tracing::info!(topic = %published.topic, %tool_name, %tool_call_id, "call started");
                    }
                    ToolEvent::CallFinished { result, .. } => {
                        tracing::info!(
                            topic = %published.topic,
                            tool_name = %result.tool_name,
                            status = result.status.as_str(),
                            duration_ms = result.duration_ms,
                            "call finished"
                        );
                    }
                }
            }
        });
    }

    let results = runtime.execute_payload_str(&payload).await?;
    let messages: Vec<_> = results.iter().map(|r| r.to_message()).collect();
    println!("{}", serde_json::to_string_pretty(&messages)?);

    if verbosity != Verbosity::Quiet {
        let stats = ToolStats::from_results(&results);
        eprintln!(
            "{} {} ok, {} failed, {} timed out ({}ms total)",
            "summary:".bold(),
            stats.successful_executions.to_string().green(),
            stats.failed_executions.to_string().red(),
            stats.timed_out_executions.to_string().yellow(),
            stats.total_duration_ms
        );
    }
    Ok(())
}

fn read_payload(source: &str) -> Result<String> {
    if source == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("Failed to read payload from stdin")?;
        Ok(payload)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read payload file {source}"))
    }
}
