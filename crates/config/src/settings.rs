// User settings
// Loaded from ~/.config/netinv/settings.json (override with NETINV_SETTINGS)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an alternate settings file.
pub const SETTINGS_ENV: &str = "NETINV_SETTINGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Transaction mode applied when neither the import config nor `--mode` names one
    #[serde(rename = "import.transactionMode", skip_serializing_if = "Option::is_none")]
    pub transaction_mode: Option<String>,

    /// Field delimiter for reading and writing CSV; sniffed when unset
    #[serde(rename = "csv.delimiter", skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,

    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[serde(rename = "log.level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transaction_mode: None,
            delimiter: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return PathBuf::from(path);
        }
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netinv");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("{e}");
                eprintln!("Using default settings");
                Self::default()
            }
        }
    }

    /// Parse a settings file. Lines starting with `//` are treated as comments.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()))
    }

    /// Save current settings to the default path
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
