//! Configuration system for strata.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{StrataError, StrataResult};

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Page size used when neither the caller nor the schema supplies one.
    pub default_page_size: u32,
    /// Upper bound on any page, whatever the caller asks for.
    pub max_page_size: u32,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let strata_dir = dirs::home_dir()
            .map(|h| h.join(".strata"))
            .unwrap_or_else(|| PathBuf::from(".strata"));

        Self {
            db_path: strata_dir.join("strata.db"),
            default_page_size: 100,
            max_page_size: 1000,
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| StrataError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| StrataError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| StrataError::Configuration(e.to_string()))?,
            _ => {
                return Err(StrataError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> StrataResult<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("STRATA_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(size) = parse_env("STRATA_PAGE_SIZE")? {
            config.default_page_size = size;
        }
        if let Some(size) = parse_env("STRATA_MAX_PAGE_SIZE")? {
            config.max_page_size = size;
        }
        if let Some(timeout) = parse_env("STRATA_BUSY_TIMEOUT_MS")? {
            config.busy_timeout_ms = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Check page size bounds.
    pub fn validate(&self) -> StrataResult<()> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(StrataError::Configuration(
                "page sizes must be positive".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(StrataError::Configuration(format!(
                "default_page_size {} exceeds max_page_size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> StrataResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StrataError::Configuration(format!("{} is not a valid number: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for StoreConfig.
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set database path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set default page size.
    pub fn default_page_size(mut self, size: u32) -> Self {
        self.config.default_page_size = size;
        self
    }

    /// Set maximum page size.
    pub fn max_page_size(mut self, size: u32) -> Self {
        self.config.max_page_size = size;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.busy_timeout_ms = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> StrataResult<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_page_size, 100);
        assert!(config.db_path.ends_with("strata.db"));
    }

    #[test]
    fn test_builder_rejects_inverted_page_sizes() {
        let result = StoreConfig::builder()
            .default_page_size(500)
            .max_page_size(50)
            .build();
        assert!(matches!(result, Err(StrataError::Configuration(_))));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "db_path = \"/tmp/facts.db\"\ndefault_page_size = 25").unwrap();

        let config = StoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/facts.db"));
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.max_page_size, 1000);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "max_page_size: 200\nbusy_timeout_ms: 10").unwrap();

        let config = StoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_page_size, 200);
        assert_eq!(config.busy_timeout_ms, 10);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            StoreConfig::from_file(file.path()),
            Err(StrataError::Configuration(_))
        ));
    }
}
