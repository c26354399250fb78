// netinv CLI - network inventory schema, import and export

mod exit_codes;
mod export;
mod import;
mod schema;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use netinv_config::Settings;
use netinv_recon::TransactionMode;

use exit_codes::{EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "netinv")]
#[command(about = "Network inventory graph with CSV link import and export")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty inventory database (no-op on an existing one)
    Init {
        /// Path to the SQLite inventory
        db: PathBuf,
    },

    /// Manage the location hierarchy
    #[command(subcommand)]
    LocationType(schema::LocationTypeCommands),

    /// Manage typed property definitions
    #[command(subcommand)]
    Property(schema::PropertyCommands),

    /// Manage equipment types and their port definitions
    #[command(subcommand)]
    EquipmentType(schema::EquipmentTypeCommands),

    /// Write every link as one CSV row, header first
    #[command(after_help = "\
Examples:
  netinv export inventory.db -o links.csv
  netinv export inventory.db --delimiter ';' > links.csv")]
    Export {
        /// Path to the SQLite inventory
        db: PathBuf,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Field delimiter (default from settings, else ',')
        #[arg(long)]
        delimiter: Option<String>,
    },

    /// Reconcile a CSV of links into the inventory
    #[command(after_help = "\
Examples:
  netinv import inventory.db links.csv
  netinv import inventory.db links.csv --mode atomic
  netinv import inventory.db links.csv --config import.toml --json
  netinv import inventory.db links.csv --output report.json")]
    Import {
        /// Path to the SQLite inventory
        db: PathBuf,

        /// CSV file whose first row is the header
        file: PathBuf,

        /// Import config (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Transaction mode: atomic, per-row or auto (overrides the config)
        #[arg(long)]
        mode: Option<TransactionMode>,

        /// Field delimiter (sniffed when neither given nor configured)
        #[arg(long)]
        delimiter: Option<String>,

        /// Print the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import config utilities
    #[command(subcommand)]
    Config(import::ConfigCommands),
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  netinv-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  netinv-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
        )
    }
}

/// Install the log backend. `NETINV_LOG` wins over `RUST_LOG`, which wins over settings.
fn init_logging(settings: &Settings) {
    let filter = std::env::var("NETINV_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| settings.log_level.clone());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::load();
    init_logging(&settings);

    let result = match cli.command {
        Commands::Init { db } => schema::cmd_init(db),
        Commands::LocationType(cmd) => schema::cmd_location_type(cmd),
        Commands::Property(cmd) => schema::cmd_property(cmd),
        Commands::EquipmentType(cmd) => schema::cmd_equipment_type(cmd),
        Commands::Export { db, output, delimiter } => {
            export::cmd_export(db, output, delimiter, &settings)
        }
        Commands::Import { db, file, config, mode, delimiter, json, output } => {
            import::cmd_import(
                import::ImportArgs { db, file, config, mode, delimiter, json, output },
                &settings,
            )
        }
        Commands::Config(cmd) => import::cmd_config(cmd),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn store(err: netinv_graph::StoreError) -> Self {
        Self::new(EXIT_ERROR, err.to_string())
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
