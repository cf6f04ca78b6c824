//! The page capability shared by every browser realization
//!
//! This trait lets the selector runner drive a remote DevTools tab and an
//! embedded webview the same way, and lets tests drive a mock.

use async_trait::async_trait;
use web_query_core::{QueryReport, QueryValue, Termination};

use crate::error::Result;

/// A page that can be navigated and queried for element text
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to the target and wait until the page is usable
    ///
    /// # Arguments
    /// * `url` - Normalized target URL
    ///
    /// # Returns
    /// `Ok(())` once the navigation is accepted. A fatal navigation surfaces as
    /// [`WebQueryError::Navigation`](crate::WebQueryError::Navigation) and a lost
    /// browser as [`WebQueryError::Disconnected`](crate::WebQueryError::Disconnected).
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Read the text of the first element matching `selector`
    ///
    /// # Arguments
    /// * `selector` - CSS selector, passed through without escaping or validation
    async fn text_content(&mut self, selector: &str) -> Result<QueryValue>;

    /// Decide how the run ends after every selector has been tried
    fn termination(&self, report: &QueryReport) -> Termination;
}
