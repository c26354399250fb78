use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImportError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Import run configuration, usually loaded from an `*.import.toml` file.
///
/// ```toml
/// name = "nightly link sync"
///
/// [transaction]
/// mode = "per_row"
///
/// [header]
/// validate = true
///
/// [csv]
/// delimiter = ";"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub transaction: TransactionConfig,
    #[serde(default)]
    pub header: HeaderConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

fn default_name() -> String {
    "import".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            transaction: TransactionConfig::default(),
            header: HeaderConfig::default(),
            csv: CsvConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionConfig {
    #[serde(default)]
    pub mode: TransactionMode,
}

/// How a batch is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// All rows land or none do.
    Atomic,
    /// Each row commits on its own.
    #[serde(alias = "per-row")]
    PerRow,
    /// `Atomic` when the store supports it, otherwise `PerRow`.
    #[default]
    Auto,
}

impl TransactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::PerRow => "per_row",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Self::Atomic),
            "per_row" | "per-row" | "perrow" => Ok(Self::PerRow),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown transaction mode '{other}' (expected atomic, per_row or auto)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Header / CSV / defaults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderConfig {
    /// Check header labels against the row schema. When off, the header row
    /// is skipped and columns are taken positionally.
    #[serde(default = "default_true")]
    pub validate: bool,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self { validate: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvConfig {
    /// Field delimiter. Sniffed from the file when unset.
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    /// Attach declared property defaults to newly created links for columns
    /// the file omits.
    #[serde(default = "default_true")]
    pub apply_on_create: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { apply_on_create: true }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Parsing + validation
// ---------------------------------------------------------------------------

impl ImportConfig {
    pub fn from_toml(input: &str) -> Result<Self, ImportError> {
        let config: ImportConfig =
            toml::from_str(input).map_err(|e| ImportError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.name.trim().is_empty() {
            return Err(ImportError::ConfigValidation("name must not be empty".into()));
        }
        if let Some(ref d) = self.csv.delimiter {
            if parse_delimiter(d).is_none() {
                return Err(ImportError::ConfigValidation(format!(
                    "csv.delimiter must be a single ASCII character, got {d:?}"
                )));
            }
        }
        Ok(())
    }

    /// The configured delimiter as a byte, if any.
    pub fn delimiter(&self) -> Option<u8> {
        self.csv.delimiter.as_deref().and_then(parse_delimiter)
    }
}

/// `"\t"` and `"tab"` both name the tab character.
pub fn parse_delimiter(s: &str) -> Option<u8> {
    if s.eq_ignore_ascii_case("tab") || s == "\\t" {
        return Some(b'\t');
    }
    match s.as_bytes() {
        [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Some(*b),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ImportConfig::from_toml("").unwrap();
        assert_eq!(config.name, "import");
        assert_eq!(config.transaction.mode, TransactionMode::Auto);
        assert!(config.header.validate);
        assert!(config.defaults.apply_on_create);
        assert_eq!(config.delimiter(), None);
    }

    #[test]
    fn full_config() {
        let config = ImportConfig::from_toml(
            r#"
name = "nightly"

[transaction]
mode = "per-row"

[header]
validate = false

[csv]
delimiter = "tab"

[defaults]
apply_on_create = false
"#,
        )
        .unwrap();
        assert_eq!(config.name, "nightly");
        assert_eq!(config.transaction.mode, TransactionMode::PerRow);
        assert!(!config.header.validate);
        assert_eq!(config.delimiter(), Some(b'\t'));
        assert!(!config.defaults.apply_on_create);
    }

    #[test]
    fn unknown_mode_is_parse_error() {
        let err = ImportConfig::from_toml("[transaction]\nmode = \"eventual\"\n").unwrap_err();
        assert!(matches!(err, ImportError::ConfigParse(_)));
    }

    #[test]
    fn bad_delimiter_fails_validation() {
        let err = ImportConfig::from_toml("[csv]\ndelimiter = \";;\"\n").unwrap_err();
        assert!(matches!(err, ImportError::ConfigValidation(_)));
        let err = ImportConfig::from_toml("name = \" \"\n").unwrap_err();
        assert!(matches!(err, ImportError::ConfigValidation(_)));
    }

    #[test]
    fn mode_from_str() {
        assert_eq!("Atomic".parse::<TransactionMode>().unwrap(), TransactionMode::Atomic);
        assert_eq!("per-row".parse::<TransactionMode>().unwrap(), TransactionMode::PerRow);
        assert!("both".parse::<TransactionMode>().is_err());
    }
}
