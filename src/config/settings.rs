//! Settings structures for fedsearch configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Name of the provider shown first unless configured otherwise
pub const DEFAULT_PRIMARY_PROVIDER: &str = "Gallery";

/// Result limit hint for providers that do not pick one
pub const DEFAULT_RESULT_LIMIT: usize = 5;

/// Environment variable pointing at a settings file
pub const SETTINGS_PATH_ENV: &str = "FEDSEARCH_SETTINGS_PATH";

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dispatcher: DispatcherSettings,
    pub providers: Vec<ProviderConfig>,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load settings from the first file found, or defaults, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut settings = match Self::locate() {
            Some(path) => {
                info!("Loading settings from: {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                info!("No settings file found, using defaults");
                Self::default()
            }
        };
        settings.merge_env();
        Ok(settings)
    }

    /// Find a settings file: the environment variable first, then the
    /// usual locations
    fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let mut candidates = vec![
            PathBuf::from("settings.yml"),
            PathBuf::from("config/settings.yml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("fedsearch/settings.yml"));
        }

        candidates.into_iter().find(|path| path.exists())
    }

    /// Merge with environment variables (FEDSEARCH_* prefix)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("FEDSEARCH_PRIMARY_PROVIDER") {
            self.dispatcher.primary_provider = val;
        }
        if let Ok(val) = std::env::var("FEDSEARCH_RESULT_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.dispatcher.default_result_limit = limit;
            }
        }
        if let Ok(val) = std::env::var("FEDSEARCH_LOG") {
            self.logging.level = val;
        }
    }

    /// Get provider config by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Dispatcher behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Provider listed first by the aggregator
    pub primary_provider: String,
    /// Result limit for providers without their own
    pub default_result_limit: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            primary_provider: DEFAULT_PRIMARY_PROVIDER.to_string(),
            default_result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

/// Individual provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name, matched against `SearchProvider::name`
    pub name: String,
    /// Refuse registration
    pub disabled: bool,
    /// Result limit override
    pub result_limit: Option<usize>,
    /// Deadline in seconds, applied by the `Timeout` adapter only
    pub timeout: Option<f64>,
}

impl ProviderConfig {
    /// Timeout as a duration, ignoring non-positive or unrepresentable values
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.dispatcher.primary_provider, "Gallery");
        assert_eq!(settings.dispatcher.default_result_limit, 5);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.providers.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let settings = Settings::from_yaml(
            r#"
dispatcher:
  primary_provider: Catalog
providers:
  - name: Geocoder
    timeout: 2.5
  - name: Files
    disabled: true
    result_limit: 20
"#,
        )
        .unwrap();

        assert_eq!(settings.dispatcher.primary_provider, "Catalog");
        assert_eq!(settings.dispatcher.default_result_limit, 5);

        let geocoder = settings.get_provider("Geocoder").unwrap();
        assert_eq!(geocoder.timeout(), Some(Duration::from_millis(2500)));
        assert!(!geocoder.disabled);

        let files = settings.get_provider("Files").unwrap();
        assert!(files.disabled);
        assert_eq!(files.result_limit, Some(20));
        assert!(settings.get_provider("Gallery").is_none());
    }

    #[test]
    fn test_invalid_timeout_ignored() {
        let config = ProviderConfig {
            name: "slow".to_string(),
            timeout: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_unrepresentable_timeout_ignored() {
        let settings = Settings::from_yaml(
            r#"
providers:
  - name: Geocoder
    timeout: 1e20
  - name: Files
    timeout: .nan
"#,
        )
        .unwrap();

        assert_eq!(settings.get_provider("Geocoder").unwrap().timeout(), None);
        assert_eq!(settings.get_provider("Files").unwrap().timeout(), None);
    }
}
