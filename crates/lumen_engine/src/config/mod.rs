//! Configuration system
//!
//! Static engine configuration is loaded once at startup through the [`Config`] trait.
//! Values that change at runtime live in the settings store instead.

use std::path::{Path, PathBuf};

pub use serde::{Deserialize, Serialize};

/// On-disk formats understood by [`Config`] and the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML document
    Toml,
    /// Rusty Object Notation document
    Ron,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parse a document in this format
    pub fn parse<T: for<'de> Deserialize<'de>>(self, contents: &str) -> Result<T, ConfigError> {
        match self {
            Self::Toml => toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Self::Ron => ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Serialize a value in this format
    pub fn serialize<T: Serialize>(self, value: &T) -> Result<String, ConfigError> {
        match self {
            Self::Toml => {
                toml::to_string_pretty(value).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            Self::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }
}

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        format.parse(&contents)
    }

    /// Load configuration from file, falling back to defaults when the file is missing
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = ConfigFormat::from_path(path)?.serialize(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Graphics API used by the render backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Immediate, implicit-state API through `glow`
    #[default]
    OpenGl,
    /// Explicit device API through `ash`
    Vulkan,
    /// No GPU; records calls. Used for tests and dedicated servers.
    Headless,
}

/// Startup configuration for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Title of the primary window
    pub title: String,
    /// Render backend to construct
    pub backend: BackendKind,
    /// Path of the persistent settings file (`.toml` or `.ron`)
    pub settings_path: PathBuf,
    /// Root directory of the `file://` resource provider
    pub resource_root: PathBuf,
    /// Whether engine defaults are merged into the settings file on startup
    pub apply_setting_defaults: bool,
    /// Resource identifier of the splash image shown during startup
    pub splash_image: Option<String>,
    /// Number of log lines the console keeps
    pub console_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Lumen".to_string(),
            backend: BackendKind::default(),
            settings_path: PathBuf::from("settings.toml"),
            resource_root: PathBuf::from("resources"),
            apply_setting_defaults: true,
            splash_image: Some("file://textures/ui/splash.png".to_string()),
            console_capacity: crate::foundation::logging::DEFAULT_CONSOLE_CAPACITY,
        }
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/b.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("b.ron")).unwrap(), ConfigFormat::Ron);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("settings.json")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_engine_config_round_trips_through_toml() {
        let path = std::env::temp_dir().join(format!("lumen_config_{}.toml", std::process::id()));
        let config = EngineConfig {
            title: "Round Trip".to_string(),
            backend: BackendKind::Vulkan,
            ..EngineConfig::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: EngineConfig = ConfigFormat::Toml.parse("backend = \"headless\"").unwrap();
        assert_eq!(config.backend, BackendKind::Headless);
        assert_eq!(config.title, "Lumen");
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = EngineConfig::load_or_default("definitely/not/here.ron").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
