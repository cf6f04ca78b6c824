//! Run configuration for web-query
//!
//! [`QueryConfig`] is built once from the command line and only read afterwards.
//! [`SessionSettings`] carries the knobs for reaching the browser, each with a
//! default that matches a plain `chrome --remote-debugging-port=9222`.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::{Result, WebQueryError};

/// Debugging endpoint of a locally running browser
pub const DEFAULT_BROWSER_URL: &str = "http://localhost:9222";

/// How long a selector may take to match before it counts as failed
pub const DEFAULT_SELECTOR_TIMEOUT_SECS: u64 = 30;

/// How long an attached browser may go without browser-level events
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// What to query and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    debug: bool,
    selectors: Vec<String>,
    target_url: String,
}

impl QueryConfig {
    /// Build the configuration from parsed command-line values
    ///
    /// # Arguments
    /// * `debug` - Open developer tools / raise log verbosity
    /// * `selectors` - CSS selectors in command-line order
    /// * `url` - First positional argument, if any
    ///
    /// Returns [`WebQueryError::Usage`] when no usable URL was given.
    pub fn new(debug: bool, selectors: Vec<String>, url: Option<&str>) -> Result<Self> {
        let raw = url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| WebQueryError::Usage("no url given".to_string()))?;

        Ok(Self {
            debug,
            selectors,
            target_url: normalize_url(raw),
        })
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }
}

/// Force an `https://` scheme onto a user-supplied URL
///
/// Everything up to the last `://` is dropped, so `http://example.com`
/// and `example.com` both become `https://example.com`.
pub fn normalize_url(raw: &str) -> String {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    let scheme = SCHEME.get_or_init(|| Regex::new(r"^.*://").expect("scheme pattern is valid"));
    format!("https://{}", scheme.replace(raw, ""))
}

/// Which browser realization drives the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Attach to a running browser over the remote-debugging protocol
    #[default]
    Remote,
    /// Host a webview window inside this process
    Embedded,
}

/// Settings for acquiring the browser
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// HTTP (or ws) debugging endpoint for remote mode
    pub browser_url: String,
    /// Selected realization
    pub mode: SessionMode,
    /// Wait limit for a selector to match
    pub selector_timeout: Duration,
    /// How often the remote connection is checked
    pub heartbeat_interval: Duration,
    /// Silence allowed on the browser-level DevTools connection
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            browser_url: DEFAULT_BROWSER_URL.to_string(),
            mode: SessionMode::default(),
            selector_timeout: Duration::from_secs(DEFAULT_SELECTOR_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}
