//! calcctl - evaluate arithmetic expressions and manage stored calculations

mod output;

use anyhow::{Context, Result};
use calc_engine::{
    evaluate, legacy_units, CompositeEvaluator, EngineConfig, ResultStore, SqliteResultStore,
    UnitSplit,
};
use clap::{Parser, Subcommand, ValueEnum};
use common::logging::LogConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

const SERVICE_NAME: &str = "calcctl";

#[derive(Parser)]
#[command(name = "calcctl")]
#[command(about = "Arithmetic expression evaluator with per-user result history")]
#[command(long_about = "Arithmetic expression evaluator with per-user result history

Examples:
  calcctl eval '(2+3)*4'                  # Evaluate one expression
  calcctl submit --user 7 '1+1' '2*3'     # Evaluate units concurrently and store the sum
  calcctl submit --user 7 --split whitespace '1+1 2*3'
  calcctl list --user 7                   # Show stored calculations
  calcctl show --user 7 2                 # Show one stored calculation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (yaml, toml or json); default: config/calcctl.*
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Result database URL
    #[arg(long, global = true, env = "CALCCTL_DATABASE_URL")]
    database_url: Option<String>,

    /// Composite deadline in milliseconds
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Also write daily log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one expression without storing it
    Eval {
        /// Expression, e.g. "(2+3)*4"
        expression: String,
    },

    /// Evaluate units concurrently, sum them and store the result
    Submit {
        /// User the calculation belongs to
        #[arg(short, long)]
        user: i64,

        /// Expression units
        #[arg(required = true)]
        units: Vec<String>,

        /// How arguments are turned into units (default from config)
        #[arg(long, value_enum)]
        split: Option<SplitArg>,
    },

    /// Show one stored calculation
    Show {
        #[arg(short, long)]
        user: i64,

        /// Expression id
        expression_id: i64,
    },

    /// List stored calculations for a user
    List {
        #[arg(short, long)]
        user: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SplitArg {
    /// Every argument is one unit
    Explicit,
    /// Every whitespace-separated segment is one unit
    Whitespace,
}

impl From<SplitArg> for UnitSplit {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::Explicit => UnitSplit::Explicit,
            SplitArg::Whitespace => UnitSplit::Whitespace,
        }
    }
}

/// File config, then CLI overrides
fn resolve_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config: EngineConfig = match &cli.config {
        Some(path) => common::config::load_config_from_file(path)?,
        None => common::config::load_config(Path::new("config"), SERVICE_NAME)?,
    };

    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    if let Some(ms) = cli.deadline_ms {
        config.deadline_ms = ms;
    }
    Ok(config)
}

fn split_units(args: Vec<String>, split: UnitSplit) -> Vec<String> {
    match split {
        UnitSplit::Explicit => args,
        UnitSplit::Whitespace => legacy_units(&args.join(" ")),
    }
}

async fn open_store(config: &EngineConfig) -> Result<Arc<SqliteResultStore>> {
    let store = SqliteResultStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open result store {}", config.database_url))?;
    Ok(Arc::new(store))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut log_config = LogConfig::new(SERVICE_NAME).with_level(cli.log_level.clone());
    log_config.ansi = !cli.no_color;
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    common::logging::init(&log_config)?;

    let config = resolve_config(&cli)?;
    debug!("Engine config: {:?}", config);

    match cli.command {
        Commands::Eval { expression } => {
            let outcome = evaluate(&expression);
            if cli.json {
                print_json(&outcome)?;
            } else {
                println!("{}", output::format_outcome(&expression, &outcome));
            }
            if !outcome.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        },

        Commands::Submit { user, units, split } => {
            let split = split.map(UnitSplit::from).unwrap_or(config.unit_split);
            let units = split_units(units, split);

            let store = open_store(&config).await?;
            let evaluator = CompositeEvaluator::new(Arc::clone(&store), config);
            let submission = evaluator.submit(user, units).await?;
            store.close().await;

            if cli.json {
                print_json(&submission)?;
            } else {
                println!("{}", output::format_submission(&submission));
            }
        },

        Commands::Show {
            user,
            expression_id,
        } => {
            let store = open_store(&config).await?;
            let record = store.get(user, expression_id).await?;
            store.close().await;

            match record {
                Some(record) if cli.json => print_json(&record)?,
                Some(record) => println!("{}", output::format_record(&record)),
                None => {
                    eprintln!(
                        "No calculation {} for user {}",
                        expression_id, user
                    );
                    return Ok(ExitCode::FAILURE);
                },
            }
        },

        Commands::List { user } => {
            let store = open_store(&config).await?;
            let records = store.list_for_user(user).await?;
            store.close().await;

            if cli.json {
                print_json(&records)?;
            } else {
                println!("{}", output::format_records(user, &records));
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "calcctl",
            "--json",
            "submit",
            "--user",
            "7",
            "--split",
            "whitespace",
            "1+1 2*3",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Submit { user, units, split } => {
                assert_eq!(user, 7);
                assert_eq!(units, vec!["1+1 2*3".to_string()]);
                assert!(matches!(split, Some(SplitArg::Whitespace)));
            },
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_submit_requires_units() {
        assert!(Cli::try_parse_from(["calcctl", "submit", "--user", "1"]).is_err());
    }

    #[test]
    fn test_split_units() {
        let args = vec!["1+1 2*3".to_string(), "4".to_string()];
        assert_eq!(split_units(args.clone(), UnitSplit::Explicit), args);
        assert_eq!(
            split_units(args, UnitSplit::Whitespace),
            vec!["1+1".to_string(), "2*3".to_string(), "4".to_string()]
        );
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "calcctl",
            "--database-url",
            "sqlite::memory:",
            "--deadline-ms",
            "50",
            "eval",
            "1",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.deadline_ms, 50);
    }
}
