//! Command-line grammar
//!
//! `web-query [-d|--debug] [-q|--query "selector"]... "url"`

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::debug;
use web_query_core::{
    QueryConfig, Result, SessionMode, SessionSettings, DEFAULT_BROWSER_URL,
    DEFAULT_SELECTOR_TIMEOUT_SECS, EXIT_FAILURE,
};

const AFTER_HELP: &str = r#"Queries are printed on separate lines in the order given. web-query exits
after the last query has run.

Exit status:
  0    all queries were run
  1    no url given, bad arguments, or the browser could not be reached
  2    the browser connection was lost
  N    the page answered with HTTP status N (remote mode)

Remote mode attaches to a running browser, e.g. `chrome --remote-debugging-port=9222`."#;

#[derive(Parser, Debug)]
#[command(name = "web-query")]
#[command(version, about = "Print the text of elements on a live web page")]
#[command(override_usage = r#"web-query [-d|--debug] [-q|--query "selector"]... "url""#)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    /// Open the dev tools and log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Query the document with a CSS selector and print the element's text
    ///
    /// Repeat to run several queries; matches are printed on new lines.
    #[arg(short = 'q', long = "query", value_name = "SELECTOR")]
    pub queries: Vec<String>,

    /// Browser to drive
    #[arg(long, value_enum, default_value = "remote", env = "WEB_QUERY_MODE")]
    pub mode: CliMode,

    /// Debugging endpoint of the running browser (remote mode)
    #[arg(long, value_name = "URL", default_value = DEFAULT_BROWSER_URL, env = "WEB_QUERY_BROWSER_URL")]
    pub browser_url: String,

    /// Seconds to wait for each selector to match (remote mode)
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_SELECTOR_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        env = "WEB_QUERY_TIMEOUT"
    )]
    pub timeout: u64,

    /// The url to open; "https://" is prepended when missing
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
}

/// CLI-friendly session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliMode {
    Remote,
    Embedded,
}

impl From<CliMode> for SessionMode {
    fn from(m: CliMode) -> Self {
        match m {
            CliMode::Remote => SessionMode::Remote,
            CliMode::Embedded => SessionMode::Embedded,
        }
    }
}

impl Cli {
    /// Split the parsed arguments into query configuration and session settings
    pub fn into_config(self) -> Result<(QueryConfig, SessionSettings)> {
        let mut urls = self.urls.into_iter();
        let url = urls.next();
        let extra: Vec<String> = urls.collect();
        if !extra.is_empty() {
            debug!("Ignoring extra arguments: {:?}", extra);
        }

        let config = QueryConfig::new(self.debug, self.queries, url.as_deref())?;
        let settings = SessionSettings {
            browser_url: self.browser_url,
            mode: self.mode.into(),
            selector_timeout: Duration::from_secs(self.timeout),
            ..SessionSettings::default()
        };

        Ok((config, settings))
    }
}

/// Exit status for a failed parse; help and version requests succeed
pub fn parse_error_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_FAILURE,
    }
}
