//! Browser sessions and selector evaluation for web-query
//!
//! This crate acquires a page, navigates it to the target URL and reads the
//! text of each configured CSS selector, one at a time.
//!
//! # Features
//!
//! - **Remote attach**: drive an already-running Chrome/Chromium over the
//!   DevTools protocol ([`RemoteSession`])
//! - **Embedded shell**: host a webview window in-process (`embedded` feature)
//! - **Fault isolation**: one failing selector never stops the others
//!
//! # Example
//!
//! ```no_run
//! use web_query_browser::{runner, RemoteSession};
//! use web_query_core::{QueryConfig, SessionSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QueryConfig::new(false, vec!["h1".into()], Some("example.com"))?;
//!     let (mut session, _disconnected) = RemoteSession::connect(&SessionSettings::default()).await?;
//!
//!     let termination = runner::execute(
//!         &mut session,
//!         &config,
//!         &mut std::io::stdout(),
//!         &mut std::io::stderr(),
//!     )
//!     .await?;
//!
//!     println!("{:?}", termination);
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Remote mode: `chrome --remote-debugging-port=9222`
//! - Embedded mode: a system webview (WebKitGTK on Linux, WebView2 on Windows)
//!
//! # Architecture
//!
//! - [`session`]: the [`PageSession`] capability both realizations implement
//! - [`remote`]: DevTools-protocol realization and disconnect watchdog
//! - `embedded`: webview realization (feature `embedded`)
//! - [`runner`]: sequential, fault-isolated selector loop
//! - [`scripts`]: JavaScript evaluated in the page
//! - [`error`]: error types for browser operations

#[cfg(feature = "embedded")]
pub mod embedded;
pub mod error;
pub mod remote;
pub mod runner;
pub mod scripts;
pub mod session;

// Re-export commonly used types
pub use error::{Result, WebQueryError};
pub use remote::{discover_debugger_url, Disconnected, RemoteSession};
pub use session::PageSession;
