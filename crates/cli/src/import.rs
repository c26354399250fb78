//! `netinv import` and `netinv config validate`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use netinv_config::Settings;
use netinv_recon::{ImportConfig, ImportError, ImportReport, RowFailure, TransactionMode};

use crate::exit_codes::{import_exit_code, EXIT_ERROR, EXIT_IMPORT_ABORTED, EXIT_IMPORT_PARTIAL};
use crate::util::{open_store, parse_delimiter_arg, sha256_hex};
use crate::CliError;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate an import config without running it
    #[command(after_help = "\
Examples:
  netinv config validate import.toml")]
    Validate {
        /// Path to the import .toml config
        config: PathBuf,
    },
}

pub struct ImportArgs {
    pub db: PathBuf,
    pub file: PathBuf,
    pub config: Option<PathBuf>,
    pub mode: Option<TransactionMode>,
    pub delimiter: Option<String>,
    pub json: bool,
    pub output: Option<PathBuf>,
}

fn import_err(err: &ImportError) -> CliError {
    let hint = match err {
        ImportError::SchemaMismatch(_) => {
            Some("run `netinv export` on the inventory to see the expected header".to_string())
        }
        ImportError::Unsupported(_) => Some("retry with --mode per-row".to_string()),
        _ => None,
    };
    CliError { code: import_exit_code(err), message: err.to_string(), hint }
}

fn load_config(path: &Path) -> Result<ImportConfig, CliError> {
    let config_str = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    ImportConfig::from_toml(&config_str).map_err(|e| import_err(&e))
}

pub fn cmd_config(cmd: ConfigCommands) -> Result<(), CliError> {
    match cmd {
        ConfigCommands::Validate { config } => {
            let cfg = load_config(&config)?;
            eprintln!(
                "ok: '{}' (mode {}, header validation {})",
                cfg.name,
                cfg.transaction.mode,
                if cfg.header.validate { "on" } else { "off" },
            );
            Ok(())
        }
    }
}

pub fn cmd_import(args: ImportArgs, settings: &Settings) -> Result<(), CliError> {
    let mut config = match args.config {
        Some(ref path) => load_config(path)?,
        None => {
            let mut config = ImportConfig::default();
            if let Some(ref mode) = settings.transaction_mode {
                match mode.parse() {
                    Ok(mode) => config.transaction.mode = mode,
                    Err(e) => log::warn!("ignoring import.transactionMode setting: {e}"),
                }
            }
            config
        }
    };
    if let Some(mode) = args.mode {
        config.transaction.mode = mode;
    }

    let bytes = std::fs::read(&args.file)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", args.file.display())))?;
    let fingerprint = sha256_hex(&bytes);
    let content = netinv_io::csv::decode_bytes(bytes);

    let delimiter = match args.delimiter.as_deref() {
        Some(d) => parse_delimiter_arg(d)?,
        None => match config.delimiter() {
            Some(d) => d,
            None => match settings.delimiter.as_deref() {
                Some(d) => parse_delimiter_arg(d)?,
                None => netinv_io::csv::sniff_delimiter(&content),
            },
        },
    };
    let rows = netinv_io::csv::parse_rows(&content, delimiter)
        .map_err(|e| CliError::io(format!("{}: {e}", args.file.display())))?;

    let mut store = open_store(&args.db)?;
    let mut report = match netinv_recon::run(&mut store, &config, &rows) {
        Ok(report) => report,
        Err(ImportError::Aborted { failures }) => {
            return Err(aborted(&failures, args.json));
        }
        Err(e) => return Err(import_err(&e)),
    };
    report.meta.input_sha256 = Some(fingerprint);

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if args.json {
        println!("{json_str}");
    }

    print_summary(&report);

    if report.has_failures() {
        return Err(CliError::new(
            EXIT_IMPORT_PARTIAL,
            format!("{} of {} rows failed", report.summary.failed, report.summary.total_rows),
        ));
    }
    Ok(())
}

/// Human summary to stderr
fn print_summary(report: &ImportReport) {
    let s = &report.summary;
    eprintln!(
        "import '{}' ({}): {} rows, {} created, {} updated, {} unchanged, {} failed",
        report.meta.config_name,
        report.meta.transaction_mode,
        s.total_rows,
        s.created,
        s.updated,
        s.unchanged,
        s.failed,
    );
    let e = &s.entities;
    eprintln!(
        "new entities: {} locations, {} equipment, {} ports, {} links; {} property values written",
        e.locations, e.equipment, e.ports, e.links, e.property_values,
    );
    for failure in report.failures() {
        eprintln!("  row {}: [{}] {}", failure.row_index, failure.code, failure.message);
    }
}

fn aborted(failures: &[RowFailure], json: bool) -> CliError {
    if json {
        let body = serde_json::json!({ "status": "aborted", "failures": failures });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    }
    for failure in failures {
        eprintln!("  row {}: [{}] {}", failure.row_index, failure.code, failure.message);
    }
    CliError::new(
        EXIT_IMPORT_ABORTED,
        format!("import aborted: {} rows failed, no changes applied", failures.len()),
    )
    .with_hint("fix the listed rows or retry with --mode per-row")
}
