//! URL admission filter

use crate::config::StoreConfig;

/// Decides which URLs are captured
///
/// Matching is a case-insensitive substring test. Ignored fragments win over
/// required ones.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    ignored: Vec<String>,
    only: Vec<String>,
}

impl UrlFilter {
    /// Build a filter from the store configuration
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            ignored: normalize(&config.ignored_urls),
            only: normalize(&config.only_urls),
        }
    }

    /// Whether this filter accepts every URL
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.ignored.is_empty() && self.only.is_empty()
    }

    /// Whether a request to `url` may be captured
    #[must_use]
    pub fn allows(&self, url: &str) -> bool {
        if self.is_pass_through() {
            return true;
        }

        let url = url.to_lowercase();

        if self.ignored.iter().any(|fragment| url.contains(fragment)) {
            return false;
        }

        self.only.is_empty() || self.only.iter().any(|fragment| url.contains(fragment))
    }
}

fn normalize(fragments: &[String]) -> Vec<String> {
    fragments
        .iter()
        .map(|fragment| fragment.trim().to_lowercase())
        .filter(|fragment| !fragment.is_empty())
        .collect()
}
