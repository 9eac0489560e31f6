//! Binary entry point for echoless.
//!
//! Command-line access to the duplicate-content engine, backed by the
//! `SQLite` content store in the data directory.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use echoless::config::EcholessConfig;
use echoless::observability::{self, InitOptions};
use std::path::PathBuf;
use std::process::ExitCode;

/// Echoless - keep users from seeing the same message twice.
#[derive(Parser)]
#[command(name = "echoless")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "ECHOLESS_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print a Prometheus metrics snapshot after the command.
    #[arg(long, global = true)]
    metrics: bool,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Check whether a text duplicates the owner's history.
    Check {
        /// Owner the text would be shown to.
        #[arg(short, long)]
        owner: String,

        /// The candidate text (`-` reads stdin).
        text: String,

        /// Restrict semantic matching to a category.
        #[arg(long)]
        category: Option<String>,

        /// Treat embedding/store failures as "not a duplicate".
        #[arg(long)]
        fail_open: bool,

        /// Exit with status 2 when the text is a duplicate.
        #[arg(long)]
        exit_code: bool,
    },

    /// Record a text as shown to the owner.
    Add {
        /// Owner the text was shown to.
        #[arg(short, long)]
        owner: String,

        /// The accepted text (`-` reads stdin).
        text: String,

        /// Content ID (generated when omitted).
        #[arg(long)]
        id: Option<String>,

        /// Content category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Show statistics.
    Stats {
        /// Scope to one owner.
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Remove embeddings older than the retention window plus grace period.
    Cleanup,

    /// Write the owner's lexical filter as JSON.
    ExportFilter {
        /// Owner whose filter to export.
        #[arg(short, long)]
        owner: String,

        /// Output file (stdout when omitted).
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },

    /// Install a lexical filter exported earlier.
    ImportFilter {
        /// Owner to install the filter for.
        #[arg(short, long)]
        owner: String,

        /// Input file written by `export-filter`.
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show the effective configuration.
    Config {
        /// Print only the default config file path.
        #[arg(long)]
        path: bool,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EcholessConfig::load(cli.config.as_deref()) {
        Ok(config) => match &cli.data_dir {
            Some(dir) => config.with_data_dir(dir),
            None => config,
        },
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics: cli.metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(&cli, &config);

    if cli.metrics
        && let Some(snapshot) = observability.render_metrics()
    {
        println!("{snapshot}");
    }

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: &Cli, config: &EcholessConfig) -> anyhow::Result<ExitCode> {
    let output = commands::Output { json: cli.json };

    match &cli.command {
        Commands::Check {
            owner,
            text,
            category,
            fail_open,
            exit_code,
        } => commands::cmd_check(
            config,
            output,
            &commands::CheckArgs {
                owner,
                text,
                category: category.as_deref(),
                fail_open: *fail_open,
                exit_code: *exit_code,
            },
        ),

        Commands::Add {
            owner,
            text,
            id,
            category,
        } => commands::cmd_add(config, output, owner, text, id.as_deref(), category.as_deref())
            .map(|()| ExitCode::SUCCESS),

        Commands::Stats { owner } => {
            commands::cmd_stats(config, output, owner.as_deref()).map(|()| ExitCode::SUCCESS)
        },

        Commands::Cleanup => commands::cmd_cleanup(config, output).map(|()| ExitCode::SUCCESS),

        Commands::ExportFilter { owner, output: path } => {
            commands::cmd_export_filter(config, owner, path.as_deref()).map(|()| ExitCode::SUCCESS)
        },

        Commands::ImportFilter { owner, input } => {
            commands::cmd_import_filter(config, output, owner, input).map(|()| ExitCode::SUCCESS)
        },

        Commands::Config { path } => {
            commands::cmd_config(config, *path).map(|()| ExitCode::SUCCESS)
        },
    }
}
