//src/config.rs
use comfy_table::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;
use tracing::{info, warn};

use crate::history::DEFAULT_HEATMAP_WEEKS;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "strongo";
const CONFIG_ENV_VAR: &str = "STRONGO_CONFIG_DIR"; // Environment variable name

const LBS_PER_KG: f64 = 2.204_622_621_8;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid color name: {0}")]
    InvalidColor(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric, // kg
    Imperial, // lbs, display only; storage is always kg
}

impl Units {
    pub const fn weight_label(self) -> &'static str {
        match self {
            Units::Metric => "kg",
            Units::Imperial => "lbs",
        }
    }

    /// Converts a stored kg value for display.
    pub fn display_weight(self, kg: f64) -> f64 {
        match self {
            Units::Metric => kg,
            Units::Imperial => kg * LBS_PER_KG,
        }
    }

    /// Converts user input in display units back to kg.
    pub fn input_to_kg(self, value: f64) -> f64 {
        match self {
            Units::Metric => value,
            Units::Imperial => value / LBS_PER_KG,
        }
    }
}

// Define standard colors using strum for easy iteration/parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum StandardColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    DarkGrey,
    DarkRed,
    DarkGreen,
    DarkYellow,
    DarkBlue,
    DarkMagenta,
    DarkCyan,
    Grey,
}

impl From<StandardColor> for Color {
    fn from(value: StandardColor) -> Self {
        match value {
            StandardColor::Black => Color::Black,
            StandardColor::Red => Color::Red,
            StandardColor::Green => Color::Green,
            StandardColor::Yellow => Color::Yellow,
            StandardColor::Blue => Color::Blue,
            StandardColor::Magenta => Color::Magenta,
            StandardColor::Cyan => Color::Cyan,
            StandardColor::White => Color::White,
            StandardColor::DarkGrey => Color::DarkGrey,
            StandardColor::DarkRed => Color::DarkRed,
            StandardColor::DarkGreen => Color::DarkGreen,
            StandardColor::DarkYellow => Color::DarkYellow,
            StandardColor::DarkBlue => Color::DarkBlue,
            StandardColor::DarkMagenta => Color::DarkMagenta,
            StandardColor::DarkCyan => Color::DarkCyan,
            StandardColor::Grey => Color::Grey,
        }
    }
}

/// Case-insensitive lookup of a colour name such as `darkcyan`.
pub fn parse_color(color_str: &str) -> Result<StandardColor, ConfigError> {
    StandardColor::iter()
        .find(|c| format!("{c:?}").eq_ignore_ascii_case(color_str.trim()))
        .ok_or_else(|| ConfigError::InvalidColor(color_str.to_string()))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ThemeConfig {
    pub header_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        ThemeConfig {
            header_color: "Green".to_string(),
        }
    }
}

impl ThemeConfig {
    /// Falls back to the default header colour if the configured one is unknown.
    pub fn header_color(&self) -> Color {
        match parse_color(&self.header_color) {
            Ok(c) => c.into(),
            Err(e) => {
                warn!(error = %e, "Using default header color");
                Color::Green
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)] // Ensure defaults are used if fields are missing
pub struct Config {
    /// Anonymous owner id written on every routine and workout.
    /// Generated on first run.
    pub session_id: Option<String>,
    pub units: Units,
    pub heatmap_weeks: u32,
    /// Rest pre-filled for exercises added from the command line.
    pub default_rest_seconds: u32,
    /// Days after which unfinished workouts are deleted on startup.
    /// Unset keeps them (hidden from history) until pruned by hand.
    pub abandoned_retention_days: Option<u32>,
    pub theme: ThemeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            session_id: None,
            units: Units::default(),
            heatmap_weeks: DEFAULT_HEATMAP_WEEKS,
            default_rest_seconds: 90,
            abandoned_retention_days: None,
            theme: ThemeConfig::default(),
        }
    }
}

impl Config {
    /// The anonymous session id, or an error if it was never set up.
    pub fn require_session_id(&self) -> Result<&str, ConfigError> {
        match self.session_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ConfigError::InvalidValue(
                "session_id is missing from the config".to_string(),
            )),
        }
    }

    pub fn set_heatmap_weeks(&mut self, weeks: u32) -> Result<(), ConfigError> {
        if !(1..=52).contains(&weeks) {
            return Err(ConfigError::InvalidValue(format!(
                "heatmap_weeks must be between 1 and 52, got {weeks}"
            )));
        }
        self.heatmap_weeks = weeks;
        Ok(())
    }
}

/// Generates and stores a session id if the config has none. Returns true
/// when the config changed and should be saved.
pub fn ensure_session_id(config: &mut Config) -> bool {
    let missing = config
        .session_id
        .as_deref()
        .map_or(true, |id| id.trim().is_empty());
    if missing {
        let id = uuid::Uuid::new_v4().to_string();
        info!(session_id = %id, "Generated anonymous session id");
        config.session_id = Some(id);
    }
    missing
}

/// Determines the path to the configuration file.
/// `STRONGO_CONFIG_DIR` overrides the directory.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_path = match std::env::var(CONFIG_ENV_VAR).ok() {
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.is_dir() {
                warn!(
                    env = CONFIG_ENV_VAR,
                    path = %path.display(),
                    "Config directory override does not exist, creating it"
                );
                fs::create_dir_all(&path)?;
            }
            path
        }
        None => {
            let base_config_dir =
                dirs::config_dir().ok_or(ConfigError::CannotDetermineConfigDir)?;
            base_config_dir.join(APP_CONFIG_DIR)
        }
    };

    if !config_dir_path.exists() {
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration, writing a default file first if none exists.
/// A missing session id is generated and persisted.
pub fn load_config(config_path: &Path) -> Result<Config, ConfigError> {
    let mut config: Config = if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        toml::from_str(&config_content).map_err(ConfigError::TomlParse)?
    } else {
        Config::default()
    };

    if ensure_session_id(&mut config) || !config_path.exists() {
        save_config(config_path, &config)?;
    }
    Ok(config)
}

/// Saves the configuration to the TOML file.
pub fn save_config(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config).map_err(ConfigError::TomlSerialize)?;
    fs::write(config_path, config_content)?;
    Ok(())
}
