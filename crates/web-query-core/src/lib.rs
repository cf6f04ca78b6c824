//! # web-query-core
//!
//! Core types for web-query, a tool that opens a page in a controlled browser,
//! runs CSS selectors against it and prints what they match.
//!
//! - [`QueryConfig`]: what to query, built once from the command line
//! - [`SessionSettings`]: how to reach the browser
//! - [`WebQueryError`]: every failure, with the exit status it maps to
//! - [`QueryValue`] / [`QueryReport`] / [`Termination`]: what a run produces

mod config;
mod error;
mod types;

pub use config::{
    normalize_url, QueryConfig, SessionMode, SessionSettings, DEFAULT_BROWSER_URL,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_SELECTOR_TIMEOUT_SECS,
};
pub use error::{Result, WebQueryError, EXIT_DISCONNECTED, EXIT_FAILURE};
pub use types::*;
