//! Configuration schema for trailcheck
//!
//! Config lives at `.config/trailcheck/config.yaml` relative to the working
//! directory. Every field is optional:
//!
//! ```yaml
//! tracker_url: https://core.trac.wordpress.org
//! profiles_url: https://profiles.wordpress.org
//! fetch_timeout_ms: 10000
//! min_interval_ms: 100
//! debounce_ms: 100
//! cache_ceiling: 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, WrapErr};
use facet::Facet;
use tracing::info;

pub const DEFAULT_TRACKER_URL: &str = "https://core.trac.wordpress.org";
pub const DEFAULT_PROFILES_URL: &str = "https://profiles.wordpress.org";

/// Root configuration for trailcheck
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Base URL of the ticket / changeset tracker
    #[facet(default)]
    pub tracker_url: Option<String>,

    /// Base URL of the contributor profile site
    #[facet(default)]
    pub profiles_url: Option<String>,

    /// Upper bound for a single lookup
    #[facet(default)]
    pub fetch_timeout_ms: Option<u64>,

    /// Minimum spacing between outbound lookups
    #[facet(default)]
    pub min_interval_ms: Option<u64>,

    /// Quiet period after an edit before a buffer is re-validated
    #[facet(default)]
    pub debounce_ms: Option<u64>,

    /// Cache size above which expired entries are swept before inserting
    #[facet(default)]
    pub cache_ceiling: Option<usize>,
}

impl Config {
    pub fn tracker_url(&self) -> &str {
        base_url(self.tracker_url.as_deref(), DEFAULT_TRACKER_URL)
    }

    pub fn profiles_url(&self) -> &str {
        base_url(self.profiles_url.as_deref(), DEFAULT_PROFILES_URL)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.unwrap_or(10_000))
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.unwrap_or(100))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(100))
    }

    pub fn cache_ceiling(&self) -> usize {
        self.cache_ceiling.unwrap_or(1000)
    }
}

/// Trailing slashes are dropped so URLs can be joined with `/`.
fn base_url<'a>(configured: Option<&'a str>, default: &'a str) -> &'a str {
    configured
        .map(|url| url.trim_end_matches('/'))
        .filter(|url| !url.is_empty())
        .unwrap_or(default)
}

/// Default config location under a working directory.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(".config/trailcheck/config.yaml")
}

/// Load config from `path`, falling back to defaults when the file does not
/// exist. A file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e)
                .wrap_err_with(|| format!("Failed to read config file: {}", path.display()));
        }
    };

    let config: Config = facet_yaml::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}
