//! Configuration types for httpcap

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{DEFAULT_CAPACITY, DEFAULT_MAX_BODY_SIZE};
use crate::{CaptureError, Result};

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of retained transactions (0 = unbounded)
    pub capacity: usize,
    /// Maximum bytes kept per body snapshot (0 = unlimited)
    pub max_body_size: usize,
    /// URL fragments that are never captured
    pub ignored_urls: Vec<String>,
    /// If non-empty, only URLs containing one of these fragments are captured
    pub only_urls: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            ignored_urls: Vec::new(),
            only_urls: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Configuration with no capacity bound, body limit, or URL filter
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            capacity: 0,
            max_body_size: 0,
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("Failed to read config file: {e}")))?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded store config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be parsed or is invalid
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CaptureError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if a URL fragment is blank
    pub fn validate(&self) -> Result<()> {
        for (i, fragment) in self.ignored_urls.iter().enumerate() {
            if fragment.trim().is_empty() {
                return Err(CaptureError::Config(format!(
                    "ignored_urls[{i}] cannot be empty"
                )));
            }
        }

        for (i, fragment) in self.only_urls.iter().enumerate() {
            if fragment.trim().is_empty() {
                return Err(CaptureError::Config(format!(
                    "only_urls[{i}] cannot be empty"
                )));
            }

            if self
                .ignored_urls
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(fragment))
            {
                warn!(
                    "URL fragment '{}' is both ignored and required; matching URLs are never captured",
                    fragment
                );
            }
        }

        Ok(())
    }
}
