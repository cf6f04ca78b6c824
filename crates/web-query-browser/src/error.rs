//! Browser error types - re-exports the unified WebQueryError from web-query-core
//!
//! Browser-side failures map onto these variants:
//! - Browser(String) - connect, tab, navigation and evaluation failures
//! - Disconnected - the remote endpoint stopped answering
//! - Navigation { status, url } - the main document came back non-2xx
//! - Selector { selector, message } - one selector failed; the runner keeps going

pub use web_query_core::{Result, WebQueryError};

/// Wrap a headless_chrome / wry failure with the operation that produced it
pub(crate) fn browser_error(operation: &str, err: impl std::fmt::Display) -> WebQueryError {
    WebQueryError::Browser(format!("{}: {}", operation, err))
}
