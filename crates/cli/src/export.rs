//! `netinv export`: every link as one row of the import schema.

use std::io;
use std::path::PathBuf;

use netinv_config::Settings;

use crate::util::{open_store, parse_delimiter_arg};
use crate::CliError;

pub fn cmd_export(
    db: PathBuf,
    output: Option<PathBuf>,
    delimiter: Option<String>,
    settings: &Settings,
) -> Result<(), CliError> {
    let delimiter = match delimiter.as_deref().or(settings.delimiter.as_deref()) {
        Some(d) => parse_delimiter_arg(d)?,
        None => b',',
    };

    let store = open_store(&db)?;
    let rows = netinv_recon::export_links(&store).map_err(CliError::store)?;
    let links = rows.len().saturating_sub(1);

    match output {
        Some(path) => {
            netinv_io::csv::write_rows(&path, &rows, delimiter).map_err(CliError::io)?;
            eprintln!("wrote {} links to {}", links, path.display());
        }
        None => {
            let stdout = io::stdout();
            netinv_io::csv::write_rows_to(stdout.lock(), &rows, delimiter).map_err(CliError::io)?;
        }
    }
    log::info!("exported {links} links from {}", db.display());
    Ok(())
}
