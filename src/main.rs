//! railpost CLI - publish recorded test outcomes to a test management service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use railpost::LOG_TARGET;
use railpost::client::http::HttpClient;
use railpost::config;
use railpost::markers::{CollectedTest, TaggedTest};
use railpost::report::print_summary;
use railpost::session::{Phase, Session, SessionHooks, TestReport};
use railpost::status::FinishState;

#[derive(Parser)]
#[command(name = "railpost")]
#[command(about = "Publish test results to a test management service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "railpost.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish outcomes recorded in a JSON-lines file
    Publish {
        /// Outcome file, one JSON object per finished test
        #[arg(short, long)]
        results: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,
}

/// One line of the outcome file.
#[derive(Debug, Deserialize)]
struct OutcomeLine {
    node_id: String,
    #[serde(default)]
    cases: Vec<String>,
    outcome: String,
    #[serde(default)]
    phase: Phase,
    #[serde(default)]
    trace: String,
    #[serde(default)]
    duration: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Publish { results } => publish(&cli.config, &results).await,
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(&cli.config),
    }
}

async fn publish(config_path: &Path, results_path: &Path) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.validate()?;
    info!(target: LOG_TARGET, "Loaded configuration from {}", config_path.display());

    let lines = read_outcomes(results_path)?;
    let mut items = collect_items(&lines);

    let client = Arc::new(HttpClient::new(&config.service)?);
    let mut session = Session::new(client, &config);
    info!(target: LOG_TARGET, "{}", session.report_header());

    session.on_collection_finalized(&mut items).await;

    let cases_by_node: HashMap<&str, Vec<u64>> = items
        .iter()
        .filter_map(|item| Some((item.node_id(), item.closest_marker()?.to_vec())))
        .collect();

    for line in &lines {
        let Some(case_ids) = cases_by_node.get(line.node_id.as_str()) else {
            continue;
        };
        let outcome = match line.outcome.parse::<FinishState>() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: LOG_TARGET, test = %line.node_id, "{}", e);
                continue;
            }
        };
        session.on_test_finished(&TestReport {
            case_ids: case_ids.clone(),
            outcome,
            phase: line.phase,
            trace: line.trace.clone(),
            duration: Duration::try_from_secs_f64(line.duration.max(0.0)).unwrap_or_default(),
        });
    }

    let report = session.on_session_finished().await;
    session.shutdown().await;
    print_summary(&report);

    Ok(())
}

/// Reads the outcome file; blank lines are ignored.
fn read_outcomes(path: &Path) -> Result<Vec<OutcomeLine>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read outcome file: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("Invalid outcome on line {} of {}", idx + 1, path.display())
            })
        })
        .collect()
}

/// Builds one collected item per distinct test, in first-seen order.
fn collect_items(lines: &[OutcomeLine]) -> Vec<CollectedTest> {
    let mut items: Vec<CollectedTest> = Vec::new();
    for line in lines {
        if items.iter().any(|item| item.id == line.node_id) {
            continue;
        }
        let item = CollectedTest::new(&line.node_id);
        let item = if line.cases.is_empty() {
            item
        } else {
            match item.clone().with_marker(line.cases.as_slice()) {
                Ok(tagged) => tagged,
                Err(e) => {
                    warn!(target: LOG_TARGET, test = %line.node_id, "{}", e);
                    item
                }
            }
        };
        items.push(item);
    }
    items
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Service: {}", config.service.url);
            println!("  User: {}", config.service.user);
            let target = match (config.session.plan_id, config.session.run_id) {
                (Some(plan_id), _) => format!("plan #{}", plan_id),
                (None, Some(run_id)) => format!("run #{}", run_id),
                (None, None) => "new run".to_string(),
            };
            println!("  Target: {}", target);
            println!("  Workers: {}", config.publisher.workers);
            println!("  Publish blocked: {}", config.session.publish_blocked);
            println!("  Close on complete: {}", config.session.close_on_complete);

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(path: &Path) -> Result<()> {
    let config = r#"# railpost configuration file

[service]
url = "https://example.testrail.io"
user = "ci@example.com"
# password = "api-key"   # or set RAILPOST_PASSWORD
verify_tls = true
timeout_secs = 60

[session]
project_id = 1
suite_id = 1
# run_id = 0
# plan_id = 0
# run_name = "Nightly"
# version = "1.0.0"
include_all = false
skip_missing = false
publish_blocked = true
close_on_complete = false

[publisher]
workers = 60
comment_limit = 4000
"#;

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            path.display()
        );
        std::process::exit(1);
    }

    std::fs::write(path, config)?;
    println!("Created {}", path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  railpost publish --results outcomes.jsonl");

    Ok(())
}
