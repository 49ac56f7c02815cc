// Capsesc Settings Module
// Optional TOML settings file and the log verbosity environment variable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;

use crate::input::{DeviceFilter, DEFAULT_MAX_DEVICES};

/// Environment variable holding the log verbosity
pub const LOG_LEVEL_ENV: &str = "CAPSESC_LOG_LEVEL";

/// Default name of the virtual output device
pub const DEFAULT_VIRTUAL_NAME: &str = "capsesc";

/// Daemon settings
///
/// These are loaded from a TOML file (default: ~/.config/capsesc/settings.toml).
/// A missing file means defaults:
///
/// ```toml
/// [devices]
/// max = 32
/// ignore = ["Yubico YubiKey OTP+FIDO+CCID"]
///
/// [output]
/// name = "capsesc"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Registry capacity
    max_devices: usize,

    /// Device names or node paths that are never tracked
    ignore: Vec<String>,

    /// Name of the virtual uinput device
    virtual_name: String,

    /// File the settings were loaded from, if any
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(default)]
    devices: Option<DeviceSettings>,

    #[serde(default)]
    output: Option<OutputSettings>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DeviceSettings {
    #[serde(default)]
    max: Option<usize>,

    #[serde(default)]
    ignore: Option<Vec<String>>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputSettings {
    #[serde(default)]
    name: Option<String>,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            ignore: Vec::new(),
            virtual_name: DEFAULT_VIRTUAL_NAME.to_string(),
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let toml_settings: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(devices) = toml_settings.devices {
            if let Some(max) = devices.max {
                if max == 0 {
                    return Err(SettingsError::InvalidValue(
                        "devices.max must be at least 1".to_string(),
                    ));
                }
                settings.max_devices = max;
            }
            if let Some(ignore) = devices.ignore {
                settings.ignore = ignore;
            }
        }

        if let Some(output) = toml_settings.output {
            if let Some(name) = output.name {
                if name.trim().is_empty() {
                    return Err(SettingsError::InvalidValue(
                        "output.name must not be empty".to_string(),
                    ));
                }
                settings.virtual_name = name;
            }
        }

        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("capsesc").join("settings.toml"))
    }

    /// Load from default location (~/.config/capsesc/settings.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::new())
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    pub fn virtual_name(&self) -> &str {
        &self.virtual_name
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Device filter matching these settings
    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.virtual_name.clone(), self.ignore.clone())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a log verbosity value.
///
/// Accepts the numeric scale 0-6 (off, fatal, error, warning, info,
/// verbose, trace) or a level name. Returns `None` for anything else.
pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    let value = value.trim();
    if let Ok(level) = value.parse::<u8>() {
        return match level {
            0 => Some(LevelFilter::Off),
            1 | 2 => Some(LevelFilter::Error),
            3 => Some(LevelFilter::Warn),
            4 => Some(LevelFilter::Info),
            5 => Some(LevelFilter::Debug),
            6 => Some(LevelFilter::Trace),
            _ => None,
        };
    }

    match value.to_ascii_lowercase().as_str() {
        "fatal" => Some(LevelFilter::Error),
        "warning" => Some(LevelFilter::Warn),
        "verbose" => Some(LevelFilter::Debug),
        other => LevelFilter::from_str(other).ok(),
    }
}
