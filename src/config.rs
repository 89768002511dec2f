//! VFS configuration
//!
//! Options can be built in code through [`crate::HttpVfs::builder`] or
//! loaded from JSON, e.g. an embedding application's config file:
//!
//! ```json
//! { "url": "https://example.com/data.db", "windowSize": 1048576, "userAgent": "reader/1.0" }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::cache::DEFAULT_WINDOW_SIZE;
use crate::errors::{Error, Result};

/// Default HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Smallest usable window: the largest SQLite page size, so a fresh window
/// always covers the page that missed
pub const MIN_WINDOW_SIZE: usize = 65536;

/// Configuration for an [`crate::HttpVfs`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VfsOptions {
    /// URL of the remote database file (`http`, `https` or `file`)
    pub url: String,
    /// Cache window size in bytes (power of two, at least `MIN_WINDOW_SIZE`)
    pub window_size: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request
    pub user_agent: Option<String>,
    /// `Referer` header sent with every request
    pub referer: Option<String>,
    /// Extra request headers
    pub headers: HashMap<String, String>,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            window_size: DEFAULT_WINDOW_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
            referer: None,
            headers: HashMap::new(),
        }
    }
}

impl VfsOptions {
    /// Options for `url` with every other field at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parse the configured URL
    pub fn parsed_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|_| Error::InvalidUrl(self.url.clone()))
    }

    /// Check the options for values the VFS cannot work with
    pub fn validate(&self) -> Result<()> {
        self.parsed_url()?;

        if self.window_size < MIN_WINDOW_SIZE || !self.window_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "window size must be a power of two of at least {} bytes, got {}",
                MIN_WINDOW_SIZE, self.window_size
            )));
        }

        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout must be at least one second".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VfsOptions::new("https://example.com/test.db");
        assert_eq!(options.window_size, 4 * 1024 * 1024);
        assert_eq!(options.timeout(), Duration::from_secs(30));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "url": "https://example.com/test.db",
            "windowSize": 65536,
            "userAgent": "reader/1.0",
            "referer": "https://example.com/",
            "headers": {"X-Token": "abc"}
        }"#;
        let options = VfsOptions::from_json(json).unwrap();
        assert_eq!(options.url, "https://example.com/test.db");
        assert_eq!(options.window_size, 65536);
        assert_eq!(options.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(options.user_agent.as_deref(), Some("reader/1.0"));
        assert_eq!(options.headers.get("X-Token").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            VfsOptions::from_json(r#"{"windowSize": "big"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut options = VfsOptions::new("not a url");
        assert!(matches!(options.validate(), Err(Error::InvalidUrl(_))));

        options.url = "http://localhost/test.db".into();
        options.window_size = 100_000;
        assert!(matches!(options.validate(), Err(Error::Config(_))));

        options.window_size = 4096;
        assert!(matches!(options.validate(), Err(Error::Config(_))));

        options.window_size = MIN_WINDOW_SIZE;
        assert!(options.validate().is_ok());

        options.timeout_secs = 0;
        assert!(matches!(options.validate(), Err(Error::Config(_))));
    }
}
