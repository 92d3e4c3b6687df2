//! TimeFlow Sync CLI
//!
//! Command-line front end for the TimeFlow online sync engine.
//!
//! # Commands
//!
//! - `settings show|set` - Display or change the sync settings
//! - `state` - Display what this device knows about the server
//! - `run` - Run one sync round against a dataset file
//! - `daemon` - Keep a dataset file in sync until interrupted
//! - `log` - Print the sync log

mod archive_file;
mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TimeFlow online sync tools.
#[derive(Parser)]
#[command(name = "timeflow-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding settings, sync state and the sync log
    #[arg(global = true, short, long, default_value = ".timeflow-sync")]
    data_dir: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display or change the sync settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Display the stored sync state of the configured account
    State {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one sync round
    Run {
        /// Dataset file to export from and import into
        #[arg(short, long, default_value = "timeflow-archive.json")]
        archive: PathBuf,

        /// Behave like the startup trigger and honor the startup toggle
        #[arg(long)]
        startup: bool,

        /// Treat the dataset as demo data that must not be synced
        #[arg(long)]
        demo: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sync a dataset file continuously until Ctrl-C
    Daemon {
        /// Dataset file to export from and import into
        #[arg(short, long, default_value = "timeflow-archive.json")]
        archive: PathBuf,

        /// Treat the dataset as demo data that must not be synced
        #[arg(long)]
        demo: bool,
    },

    /// Print the sync log
    Log {
        /// Only print the last N lines
        #[arg(short, long)]
        tail: Option<usize>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Display the current settings
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Change one or more settings
    Set(commands::settings::SetArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = cli.data_dir;
    match cli.command {
        Commands::Settings { command } => match command {
            SettingsCommand::Show { format } => commands::settings::show(&data_dir, &format)?,
            SettingsCommand::Set(args) => commands::settings::set(&data_dir, args)?,
        },
        Commands::State { format } => commands::state::run(&data_dir, &format)?,
        Commands::Run {
            archive,
            startup,
            demo,
            format,
        } => commands::run::run(&data_dir, &archive, startup, demo, &format).await?,
        Commands::Daemon { archive, demo } => {
            commands::daemon::run(&data_dir, &archive, demo).await?;
        }
        Commands::Log { tail } => commands::log::run(&data_dir, tail)?,
        Commands::Version => {
            println!("TimeFlow Sync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
