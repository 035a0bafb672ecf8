//! `ralph`: command-line front for the loop core.
//!
//! `ralph serve` runs the line-delimited JSON-RPC dispatcher on stdin/stdout.
//! The other commands are one-shot views over the same vault.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use ralph::core::selector::ClaimFilter;
use ralph::core::types::{HealthStatus, MetricsRange, Priority, parse_label};
use ralph::dispatch::Dispatcher;
use ralph::exit_codes;
use ralph::io::config::{RalphConfig, load_config};
use ralph::io::init::{InitOptions, init_vault};
use ralph::logging;
use ralph::service::Ralph;
use ralph::tools;

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Task-queue and iteration-control core for an automation vault"
)]
struct Cli {
    /// Vault root directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (default: `<root>/.ralph/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the vault folders and `.ralph/config.toml` (from `--config` if given).
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Serve JSON-RPC requests, one per line, on stdin/stdout.
    Serve,
    /// Print the next claimable task (exit 2 if there is none).
    Claim {
        #[arg(long)]
        priority: Option<String>,
        #[arg(long = "type")]
        task_type: Option<String>,
    },
    /// Print health (exit 3 unless healthy).
    Health,
    /// List stuck tasks.
    Stuck,
    /// Print metrics over archived records.
    Metrics {
        /// today | week | month | all
        #[arg(long, default_value = "all")]
        range: String,
    },
    /// Estimate effort for a task file.
    Estimate { path: PathBuf },
    /// Print the tool catalog.
    Tools,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    if let Command::Init { force } = cli.command {
        logging::init(logging::DEFAULT_DIRECTIVE);
        let config = match &cli.config {
            Some(path) => load_config(path)?,
            None => RalphConfig::default(),
        };
        let paths = init_vault(&cli.root, &InitOptions { force, config })?;
        println!("{}", paths.config_path.display());
        return Ok(exit_codes::OK);
    }

    let ralph = Ralph::open(&cli.root, cli.config.as_deref())?;
    logging::init(
        ralph
            .config
            .log_level
            .as_deref()
            .unwrap_or(logging::DEFAULT_DIRECTIVE),
    );

    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Serve => {
            let dispatcher = Dispatcher::new(ralph);
            dispatcher
                .serve(io::stdin().lock(), io::stdout().lock())
                .context("serve stdio")?;
            Ok(exit_codes::OK)
        }
        Command::Claim {
            priority,
            task_type,
        } => {
            let filter = ClaimFilter {
                priority: priority
                    .map(|p| parse_label::<Priority>("priority", &p))
                    .transpose()?,
                task_type,
            };
            match ralph.claim_next(&filter)? {
                Some(task) => {
                    print_json(&task)?;
                    Ok(exit_codes::OK)
                }
                None => {
                    eprintln!("no tasks available");
                    Ok(exit_codes::EMPTY)
                }
            }
        }
        Command::Health => {
            let report = ralph.health.get_health()?;
            print_json(&report)?;
            Ok(if report.status == HealthStatus::Healthy {
                exit_codes::OK
            } else {
                exit_codes::DEGRADED
            })
        }
        Command::Stuck => {
            print_json(&ralph.health.get_stuck_tasks()?)?;
            Ok(exit_codes::OK)
        }
        Command::Metrics { range } => {
            let range: MetricsRange = parse_label("range", &range)?;
            print_json(&ralph.health.get_performance_metrics(range)?)?;
            Ok(exit_codes::OK)
        }
        Command::Estimate { path } => {
            print_json(&ralph.estimator.estimate(&path)?)?;
            Ok(exit_codes::OK)
        }
        Command::Tools => {
            print_json(&tools::catalog())?;
            Ok(exit_codes::OK)
        }
    }
}

/// Pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["ralph", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn global_root_follows_subcommand() {
        let cli = Cli::parse_from(["ralph", "serve", "--root", "/vault"]);
        assert!(matches!(cli.command, Command::Serve));
        assert_eq!(cli.root, PathBuf::from("/vault"));
    }

    #[test]
    fn parse_claim_filters() {
        let cli = Cli::parse_from(["ralph", "claim", "--priority", "high", "--type", "email"]);
        match cli.command {
            Command::Claim {
                priority,
                task_type,
            } => {
                assert_eq!(priority.as_deref(), Some("high"));
                assert_eq!(task_type.as_deref(), Some("email"));
            }
            _ => panic!("expected claim"),
        }
    }

    #[test]
    fn metrics_range_defaults_to_all() {
        let cli = Cli::parse_from(["ralph", "metrics"]);
        assert!(matches!(cli.command, Command::Metrics { range } if range == "all"));
    }
}
