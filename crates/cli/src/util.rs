// Shared helpers for command implementations

use std::path::Path;

use netinv_graph::SqliteStore;
use sha2::{Digest, Sha256};

use crate::CliError;

/// Open an existing inventory. Missing files are an error; `init` creates them.
pub fn open_store(db: &Path) -> Result<SqliteStore, CliError> {
    if !db.exists() {
        return Err(CliError::io(format!("inventory not found: {}", db.display()))
            .with_hint(format!("create it with: netinv init {}", db.display())));
    }
    SqliteStore::open(db).map_err(CliError::store)
}

/// Parse a `--delimiter` value (`tab` and `\t` name the tab character).
pub fn parse_delimiter_arg(value: &str) -> Result<u8, CliError> {
    netinv_recon::config::parse_delimiter(value).ok_or_else(|| {
        CliError::args(format!("invalid delimiter {value:?}"))
            .with_hint("use a single ASCII character, or 'tab'")
    })
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
