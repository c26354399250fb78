// CSV/TSV row reading and writing

use std::io::{Read, Write};
use std::path::Path;

const BOM: char = '\u{feff}';

/// Read a delimited file into rows of string cells, header included.
///
/// The delimiter is sniffed from the content unless given.
pub fn read_rows(path: &Path, delimiter: Option<u8>) -> Result<Vec<Vec<String>>, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    parse_rows(&content, delimiter)
}

/// Split decoded text into rows. A leading BOM is dropped; blank lines are skipped.
pub fn parse_rows(content: &str, delimiter: u8) -> Result<Vec<Vec<String>>, String> {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("line {}: {e}", idx + 1))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

const DELIMITER_CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_RECORDS: usize = 10;

/// Guess the field delimiter from the first few records.
///
/// Each candidate parses the sample as whole records, so quoted cells that
/// span lines count once. A candidate must split the header into more than one
/// field; the best score is records matching the header width times that width.
/// Ties go to the earlier candidate, and comma is the fallback.
pub fn sniff_delimiter(content: &str) -> u8 {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let mut best = (b',', 0usize);
    for delimiter in DELIMITER_CANDIDATES {
        let widths = record_widths(content, delimiter);
        let Some(&header) = widths.first() else {
            continue;
        };
        if header <= 1 {
            continue;
        }
        let score = widths.iter().filter(|&&w| w == header).count() * header;
        if score > best.1 {
            best = (delimiter, score);
        }
    }
    best.0
}

/// Field counts of the leading records; sampling stops at the first parse error.
fn record_widths(content: &str, delimiter: u8) -> Vec<usize> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .records()
        .take(SNIFF_RECORDS)
        .map_while(Result::ok)
        .map(|record| record.len())
        .collect()
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(decode_bytes(bytes))
}

/// UTF-8 when valid, otherwise Windows-1252 (common for Excel-exported CSVs).
pub fn decode_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

/// Write rows to `path`. Every row is written at full width, empty cells included.
pub fn write_rows(path: &Path, rows: &[Vec<String>], delimiter: u8) -> Result<(), String> {
    let file = std::fs::File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
    write_rows_to(file, rows, delimiter)
}

pub fn write_rows_to<W: Write>(out: W, rows: &[Vec<String>], delimiter: u8) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(out);
    for row in rows {
        writer.write_record(row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
