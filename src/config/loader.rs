//! Configuration File Loading
//!
//! Handles loading and saving configuration files from various locations
//! with support for multiple formats and fallback to defaults.

use super::Config;
use crate::error::{Error, Result};
use crate::security_audit::log_config_event;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "FLEETSHELL_CONFIG";

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths for configuration files (without extension)
    search_paths: Vec<PathBuf>,
    /// Supported configuration file formats
    supported_formats: Vec<ConfigFormat>,
    /// Current configuration file path (if loaded)
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether to fall back to the default config if none exists
    pub create_default: bool,
    /// Whether to validate configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<Config> {
        Self::load_with_options(LoadOptions::default())
    }

    /// Load configuration with custom options
    pub fn load_with_options(options: LoadOptions) -> Result<Config> {
        let mut loader = Self::new();
        loader.load_from_search_paths(&options)
    }

    /// Load from an explicit path, falling back to the search paths when `None`
    pub fn load_from(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => {
                let loader = Self::new();
                let config = loader.load_config_file(path, ConfigFormat::from_path(path))?;
                validate_config(&config)?;
                log_config_event(false, Some(&path.display().to_string()));
                Ok(config)
            }
            None => Self::load(),
        }
    }

    fn load_from_search_paths(&mut self, options: &LoadOptions) -> Result<Config> {
        if let Some((path, config)) = self.find_and_load_config()? {
            if options.validate {
                validate_config(&config)?;
            }
            log_config_event(false, Some(&path.display().to_string()));
            self.current_path = Some(path);
            return Ok(config);
        }

        if options.create_default {
            debug!("No configuration file found, using defaults");
            let config = Config::default();
            if options.validate {
                validate_config(&config)?;
            }
            Ok(config)
        } else {
            Err(Error::ConfigNotFound)
        }
    }

    /// Save configuration to a specific path, format chosen by extension
    pub fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let format = ConfigFormat::from_path(path);
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                }
            })?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        if let Ok(explicit) = env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(explicit);
            let config = self.load_config_file(&path, ConfigFormat::from_path(&path))?;
            return Ok(Some((path, config)));
        }

        for path in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = self.get_config_path_for_format(path, *format);

                if config_path.exists() {
                    match self.load_config_file(&config_path, *format) {
                        Ok(config) => return Ok(Some((config_path, config))),
                        Err(e) => {
                            // Keep searching, a broken file should not block the tool
                            warn!("Failed to load config from {}: {}", config_path.display(), e);
                            log_config_event(true, Some(&config_path.display().to_string()));
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Load a specific configuration file
    fn load_config_file(&self, path: &Path, format: ConfigFormat) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: format.name().to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Get configuration file path for a specific format
    fn get_config_path_for_format(&self, base_path: &Path, format: ConfigFormat) -> PathBuf {
        let extension = match format {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        };

        base_path.with_extension(extension)
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("fleetshell").join("config"));
        }

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("fleetshell").join("config"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".fleetshell").join("config"));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join(".fleetshell").join("config"));
        }

        paths
    }

    /// Where a new configuration file is written by default
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleetshell")
            .join("config.toml")
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.script.delimiter.is_empty() || config.script.delimiter.contains('\n') {
        return Err(Error::ConfigValidationFailed {
            field: "script.delimiter".to_string(),
            reason: "Delimiter must be a single non-empty line".to_string(),
        });
    }

    let aliases = [
        ("columns.device_name", &config.columns.device_name),
        ("columns.address", &config.columns.address),
        ("columns.username", &config.columns.username),
        ("columns.password", &config.columns.password),
    ];
    for (field, names) in aliases {
        if names.iter().all(|n| n.trim().is_empty()) {
            return Err(Error::ConfigValidationFailed {
                field: field.to_string(),
                reason: "At least one column name is required".to_string(),
            });
        }
    }

    if config.session.connect_timeout_secs == 0 {
        return Err(Error::ConfigValidationFailed {
            field: "session.connect_timeout_secs".to_string(),
            reason: "Connect timeout must be greater than 0".to_string(),
        });
    }

    if config.session.read_buffer_limit == 0 {
        return Err(Error::ConfigValidationFailed {
            field: "session.read_buffer_limit".to_string(),
            reason: "Read buffer limit must be greater than 0".to_string(),
        });
    }

    if config.session.read_buffer_limit > 16 * 1024 * 1024 {
        return Err(Error::ConfigValidationFailed {
            field: "session.read_buffer_limit".to_string(),
            reason: "Read buffer limit cannot exceed 16MB".to_string(),
        });
    }

    if let super::CaptureConfig::PromptMatch { pattern, .. } = &config.session.capture {
        Regex::new(pattern).map_err(|e| Error::ConfigValidationFailed {
            field: "session.capture.pattern".to_string(),
            reason: e.to_string(),
        })?;
    }

    if config.execution.concurrency == 0 {
        return Err(Error::ConfigValidationFailed {
            field: "execution.concurrency".to_string(),
            reason: "Concurrency must be at least 1".to_string(),
        });
    }

    if config.execution.result_suffix == config.script.file_suffix {
        return Err(Error::ConfigValidationFailed {
            field: "execution.result_suffix".to_string(),
            reason: "Result and script files need distinct suffixes".to_string(),
        });
    }

    Ok(())
}
