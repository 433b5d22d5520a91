//! # rsmetrics CLI
//!
//! ## Usage
//!
//! ```bash
//! rsmetrics --config ./config/rsmetrics.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rsmetrics init` | Create the SQLite database and run schema migrations |
//! | `rsmetrics import <table> <file>` | Load a JSON dump into an input table |
//! | `rsmetrics evaluate` | Evaluate a provider and store the report |
//! | `rsmetrics reports` | List stored reports |
//! | `rsmetrics show <name>` | Print a stored report |
//!
//! Diagnostics go to stderr (`RUST_LOG` or `-v` to adjust); stdout carries
//! only command output.

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rsmetrics::evaluate::EvaluateArgs;
use rsmetrics::import::ImportTable;
use rsmetrics::{config, evaluate, import, migrate, reports};

/// rsmetrics: offline metrics evaluation for recommender systems.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rsmetrics.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rsmetrics",
    about = "rsmetrics: offline metrics evaluation for recommender systems",
    version,
    long_about = "rsmetrics reads user actions, recommendations and the item catalog from SQLite, \
    reconciles the legacy and current event schemas, and computes statistics and quality metrics \
    (coverage, diversity, novelty, accuracy, hit rate, click-through rate) into a named report."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rsmetrics.toml")]
    config: PathBuf,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all input and report tables.
    /// Running it multiple times is safe.
    Init,

    /// Load a JSON array of documents into an input table.
    Import {
        /// Target table.
        #[arg(value_enum)]
        table: ImportTable,

        /// JSON file containing an array of documents.
        file: PathBuf,
    },

    /// Evaluate a provider's recommendations and store the report.
    ///
    /// The report is printed to stdout as JSON and upserted under the name
    /// `<provider>` or `<provider> - <tag>`.
    Evaluate {
        /// Provider to evaluate. Defaults to the first configured provider.
        #[arg(long)]
        provider: Option<String>,

        /// Tag appended to the report name.
        #[arg(long)]
        tag: Option<String>,

        /// First day of the window (YYYY-MM-DD, inclusive).
        #[arg(long)]
        start: Option<String>,

        /// Last day of the window (YYYY-MM-DD, inclusive to end of day).
        #[arg(long)]
        end: Option<String>,

        /// Read records with the legacy identity schema.
        #[arg(long)]
        legacy: bool,

        /// Print the report without storing it.
        #[arg(long)]
        no_store: bool,
    },

    /// List stored reports.
    Reports,

    /// Print a stored report as JSON.
    Show {
        /// Report name.
        name: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("rsmetrics={level},rsmetrics_core={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { table, file } => {
            import::run_import(&cfg, table, &file).await?;
        }
        Commands::Evaluate {
            provider,
            tag,
            start,
            end,
            legacy,
            no_store,
        } => {
            let args = EvaluateArgs {
                provider,
                tag,
                start,
                end,
                legacy,
                no_store,
            };
            evaluate::run_evaluate(&cfg, &args).await?;
        }
        Commands::Reports => {
            reports::run_reports(&cfg).await?;
        }
        Commands::Show { name } => {
            reports::run_show(&cfg, &name).await?;
        }
    }

    Ok(())
}
