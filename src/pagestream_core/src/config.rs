//! Streaming configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PageError, PageResult};

/// Upper bound for the window radius a viewer may ask for.
pub const MAX_RADIUS: usize = 50;

/// Tunables for the prefetch engine.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides:
///
/// ```
/// use pagestream_core::StreamConfig;
///
/// let config = StreamConfig::from_json_str(r#"{ "radius": 5 }"#).unwrap();
/// assert_eq!(config.radius, 5);
/// assert_eq!(config.max_concurrent, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum number of fetches outstanding at once.
    pub max_concurrent: usize,
    /// Failed attempts after which a page stops being requested.
    pub max_retry: u32,
    /// Pages kept on each side of the current page.
    pub radius: usize,
    /// How long `load_page` waits for a fetch before giving up.
    pub wait_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retry: 3,
            radius: 3,
            wait_timeout_ms: 10_000,
        }
    }
}

impl StreamConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> PageResult<Self> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> PageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> PageResult<()> {
        if self.max_concurrent == 0 {
            return Err(PageError::InvalidConfig(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.max_retry == 0 {
            return Err(PageError::InvalidConfig("max_retry must be at least 1".into()));
        }
        if self.radius > MAX_RADIUS {
            return Err(PageError::InvalidConfig(format!(
                "radius {} exceeds maximum of {MAX_RADIUS}",
                self.radius
            )));
        }
        if self.wait_timeout_ms == 0 {
            return Err(PageError::InvalidConfig(
                "wait_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Bounded wait used by `load_page`.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Clamp a viewer-supplied radius into `[0, MAX_RADIUS]`.
    pub fn clamped_radius(radius: usize) -> usize {
        radius.min(MAX_RADIUS)
    }
}

/// Check if per-fetch timing instrumentation is enabled via env var.
pub(crate) fn fetch_timing_enabled() -> bool {
    std::env::var("PAGESTREAM_FETCH_TIMING").is_ok_and(|v| v == "1" || v == "true")
}
