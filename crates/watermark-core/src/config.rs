//! Configuration management for the watermark tool

use crate::error::{Result, WatermarkError};
use crate::models::ExportSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub fonts: FontConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where fonts are looked up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub directories: Vec<PathBuf>,
}

impl Default for FontConfig {
    fn default() -> Self {
        let mut directories = vec![
            PathBuf::from("/usr/share/fonts"),
            PathBuf::from("/usr/local/share/fonts"),
            PathBuf::from("/Library/Fonts"),
            PathBuf::from("/System/Library/Fonts"),
            PathBuf::from("C:\\Windows\\Fonts"),
        ];
        if let Some(home) = dirs::home_dir() {
            directories.push(home.join(".fonts"));
            directories.push(home.join(".local").join("share").join("fonts"));
        }
        if let Some(font_dir) = dirs::font_dir() {
            if !directories.contains(&font_dir) {
                directories.push(font_dir);
            }
        }
        Self { directories }
    }
}

/// Batch export configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads for parallel export; `None` uses one per CPU
    pub worker_threads: Option<usize>,
}

impl BatchConfig {
    pub fn workers(&self) -> usize {
        self.worker_threads
            .filter(|threads| *threads > 0)
            .unwrap_or_else(num_cpus::get)
    }
}

/// Preview surface bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 600,
        }
    }
}

/// Template storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub directory: PathBuf,
    pub auto_load_last: bool,
    pub last_template: Option<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            directory: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".watermark_templates"),
            auto_load_last: true,
            last_template: None,
        }
    }
}

impl TemplateConfig {
    /// Template to load at startup, if any
    pub fn startup_template(&self) -> Option<&str> {
        if self.auto_load_last {
            self.last_template.as_deref()
        } else {
            None
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `console` or `file`
    pub output_type: String,
    pub output_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output_type: "console".to_string(),
            output_path: None,
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a configuration manager with a custom path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = Self::load_or_create_config(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Update the configuration
    pub fn update_config(&mut self, config: AppConfig) -> Result<()> {
        self.config = config;
        self.save()
    }

    /// Remember the template that was applied last
    pub fn remember_template(&mut self, name: &str) -> Result<()> {
        self.config.templates.last_template = Some(name.to_string());
        self.save()
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WatermarkError::ConfigError {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let config_str =
            toml::to_string_pretty(&self.config).map_err(|e| WatermarkError::ConfigError {
                message: format!("Failed to serialize config: {}", e),
            })?;

        std::fs::write(&self.config_path, config_str).map_err(|e| {
            WatermarkError::ConfigError {
                message: format!("Failed to write config file: {}", e),
            }
        })?;

        tracing::info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WatermarkError::ConfigError {
                message: "Could not determine config directory".to_string(),
            })?
            .join("watermark");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file or fall back to defaults if it doesn't exist
    fn load_or_create_config(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            tracing::info!("Using default configuration");
            return Ok(AppConfig::default());
        }

        let config_str =
            std::fs::read_to_string(path).map_err(|e| WatermarkError::ConfigError {
                message: format!("Failed to read config file: {}", e),
            })?;

        let config: AppConfig =
            toml::from_str(&config_str).map_err(|e| WatermarkError::ConfigError {
                message: format!("Failed to parse config file: {}", e),
            })?;

        tracing::info!("Configuration loaded from {:?}", path);
        Ok(config)
    }
}
