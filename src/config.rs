//! Application configuration
//!
//! Loaded from config.json next to the working directory or the executable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Global application config
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application config
pub fn get_config() -> &'static AppConfig {
    APP_CONFIG.get_or_init(AppConfig::load)
}

/// Root application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl AppConfig {
    /// Load config.json from the current directory, then from the executable
    /// directory, falling back to defaults
    pub fn load() -> Self {
        if let Ok(config) = Self::load_from_path("config.json") {
            log::info!("Loaded config from ./config.json");
            return config;
        }

        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let config_path = exe_dir.join("config.json");
                if let Ok(config) = Self::load_from_path(&config_path) {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
            }
        }

        log::info!("No config.json found, using defaults");
        Self::default()
    }

    fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Extraction configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExtractConfig {
    /// Destination used when no --output is given
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("extracted")
}

fn default_show_progress() -> bool {
    true
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            show_progress: default_show_progress(),
        }
    }
}
