//! essay: draft an essay with a plan, research and critique loop
//!
//! Runs against a local Ollama model with web search for research notes.

mod commands;
mod progress;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use llm_core::SearchProvider;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "essay")]
#[command(about = "Plan, research, draft and revise essays", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to essay.toml (searched in the current directory and parents otherwise)
    #[arg(long, global = true, env = "ESSAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SearchArg {
    Duckduckgo,
    Tavily,
}

impl From<SearchArg> for SearchProvider {
    fn from(arg: SearchArg) -> Self {
        match arg {
            SearchArg::Duckduckgo => SearchProvider::DuckDuckGo,
            SearchArg::Tavily => SearchProvider::Tavily,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Draft an essay for a task
    Run {
        /// The essay task
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,

        /// Ceiling on the revision counter
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        max_revisions: Option<i64>,

        /// Starting value of the revision counter
        #[arg(long)]
        revision_number: Option<i64>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Search provider (overrides config)
        #[arg(long, value_enum)]
        search: Option<SearchArg>,

        /// Do not save checkpoints for this run
        #[arg(long)]
        no_checkpoint: bool,

        /// Output snapshots and the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Continue a saved run from where it stopped
    Resume {
        run_id: String,

        /// Output snapshots and the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage saved runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },

    /// Manage essay.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum RunsAction {
    /// List saved runs
    List,
    /// Show the latest state of a run
    Show {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved run
    Rm { run_id: String },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a commented essay.toml
    Init {
        /// Output path (defaults to ./essay.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config;
    let load_config = || commands::load_config(config_path.as_deref());

    match cli.command {
        Commands::Run {
            task,
            max_revisions,
            revision_number,
            model,
            search,
            no_checkpoint,
            json,
        } => {
            let args = commands::RunArgs {
                task: task.join(" "),
                revision_number,
                max_revisions,
                model,
                search: search.map(SearchProvider::from),
                no_checkpoint,
                json,
            };
            commands::run(load_config()?, args).await
        }
        Commands::Resume { run_id, json } => {
            commands::resume(load_config()?, &run_id, json).await
        }
        Commands::Runs { action } => match action {
            RunsAction::List => commands::runs_list(load_config()?).await,
            RunsAction::Show { run_id, json } => {
                commands::runs_show(load_config()?, &run_id, json).await
            }
            RunsAction::Rm { run_id } => commands::runs_rm(load_config()?, &run_id).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Init { output, force } => commands::config_init(output, force),
            ConfigAction::Show => commands::config_show(&load_config()?),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "essay", "run", "Compare", "two", "frameworks", "-n", "0", "--search", "tavily",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                task,
                max_revisions,
                search,
                ..
            } => {
                assert_eq!(task.join(" "), "Compare two frameworks");
                assert_eq!(max_revisions, Some(0));
                assert!(matches!(search, Some(SearchArg::Tavily)));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_accepts_negative_ceiling() {
        let cli = Cli::try_parse_from(["essay", "run", "task", "--max-revisions", "-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                max_revisions: Some(-1),
                ..
            }
        ));
    }

    #[test]
    fn test_cli_requires_task() {
        assert!(Cli::try_parse_from(["essay", "run"]).is_err());
    }
}
