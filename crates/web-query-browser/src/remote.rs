//! Remote-attach sessions over the Chrome DevTools Protocol
//!
//! The browser is never launched here: a Chrome/Chromium must already be
//! listening, e.g. `chrome --remote-debugging-port=9222`. All headless_chrome
//! calls block, so they run on tokio's blocking pool and the caller can race
//! the session against its [`Disconnected`] signal.

use crate::error::{browser_error, Result, WebQueryError};
use crate::scripts;
use crate::session::PageSession;
use async_trait::async_trait;
use headless_chrome::browser::tab::ResponseHandler;
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use headless_chrome::protocol::cdp::Network::{GetResponseBodyReturnObject, ResourceType};
use headless_chrome::{Browser, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use web_query_core::{QueryReport, QueryValue, SessionSettings, Termination};

/// Answer of the browser's `/json/version` endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Product string, e.g. `Chrome/120.0.6099.109`
    #[serde(rename = "Browser", default)]
    pub browser: String,
    /// Browser-level DevTools WebSocket
    pub web_socket_debugger_url: String,
}

/// Resolve the DevTools WebSocket URL behind an HTTP debugging endpoint
///
/// # Arguments
/// * `browser_url` - `http://host:port` of the debugging endpoint, or a `ws://` URL
///   which is returned unchanged
pub async fn discover_debugger_url(browser_url: &str) -> Result<String> {
    if browser_url.starts_with("ws://") || browser_url.starts_with("wss://") {
        return Ok(browser_url.to_string());
    }

    let endpoint = version_endpoint(browser_url);
    debug!("Fetching {}", endpoint);

    let info: VersionInfo = reqwest::get(&endpoint)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| browser_error(&format!("Failed to reach {}", endpoint), e))?
        .json()
        .await
        .map_err(|e| browser_error(&format!("Unexpected answer from {}", endpoint), e))?;

    info!("Found {} at {}", info.browser, info.web_socket_debugger_url);
    Ok(info.web_socket_debugger_url)
}

fn version_endpoint(browser_url: &str) -> String {
    format!("{}/json/version", browser_url.trim_end_matches('/'))
}

/// Resolves once the remote browser stops answering
pub struct Disconnected {
    rx: oneshot::Receiver<()>,
}

impl Disconnected {
    /// Wait for the connection to drop; never resolves while it is healthy
    pub async fn wait(self) {
        if self.rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run `check` every `interval` until it fails or nobody listens anymore
fn spawn_watchdog<C>(check: C, interval: Duration) -> Disconnected
where
    C: Fn() -> anyhow::Result<()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    thread::spawn(move || {
        while !tx.is_closed() {
            thread::sleep(interval);
            if let Err(e) = check() {
                warn!("Browser stopped answering: {}", e);
                let _ = tx.send(());
                return;
            }
        }
    });

    Disconnected { rx }
}

/// How long the browser-level event loop may stay silent before headless_chrome
/// drops the connection
///
/// Tab traffic does not count as browser activity, so the limit has to outlast
/// any run; it never drops below two selector waits.
fn idle_timeout(settings: &SessionSettings) -> Duration {
    settings
        .idle_timeout
        .max(settings.selector_timeout.saturating_mul(2))
}

const DOCUMENT_STATUS_HANDLER: &str = "web-query-document-status";

/// How long to wait for the document response event after Chrome refused to
/// render an error response
const DOCUMENT_STATUS_GRACE: Duration = Duration::from_secs(2);

/// Keep the status of the first document response the tab receives
fn record_document_status(slot: Arc<Mutex<Option<u32>>>) -> ResponseHandler {
    Box::new(
        move |params: ResponseReceivedEventParams,
              _body: &dyn Fn() -> anyhow::Result<GetResponseBodyReturnObject>| {
            if !matches!(params.Type, ResourceType::Document) {
                return;
            }
            if let Ok(mut status) = slot.lock() {
                status.get_or_insert(params.response.status);
            }
        },
    )
}

fn recorded_status(slot: &Mutex<Option<u32>>) -> Option<u64> {
    slot.lock().ok().and_then(|status| *status).map(u64::from)
}

/// Poll `slot` until a document status shows up or `grace` runs out
fn await_document_status(slot: &Mutex<Option<u32>>, grace: Duration) -> Option<u64> {
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = recorded_status(slot) {
            return Some(status);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Chrome reports an error response with an empty body as a failed navigation
fn is_error_response(message: &str) -> bool {
    message.contains("ERR_HTTP_RESPONSE_CODE_FAILURE")
}

/// Prefer the status of the document response; fall back to Navigation Timing
fn document_status(document: Option<u64>, timing: u64) -> u64 {
    document.unwrap_or(timing)
}

/// Map the main document's status onto the navigation policy
///
/// 0 means the engine did not report a status (`about:`, `file:`, cached
/// documents) and counts as success.
fn check_status(status: u64, url: &str) -> Result<()> {
    match status {
        0 | 200..=299 => Ok(()),
        other => Err(WebQueryError::Navigation {
            status: u16::try_from(other).unwrap_or(u16::MAX),
            url: url.to_string(),
        }),
    }
}

/// A fresh tab inside an already-running browser
pub struct RemoteSession {
    /// Client-side handle; dropping it does not stop the remote browser
    browser: Browser,
    /// Tab opened for this run
    tab: Arc<Tab>,
    settings: SessionSettings,
}

impl RemoteSession {
    /// Attach to the browser at `settings.browser_url` and open a new tab
    ///
    /// # Returns
    /// The session plus the signal that fires if the browser goes away
    pub async fn connect(settings: &SessionSettings) -> Result<(Self, Disconnected)> {
        info!("Connecting to existing browser at {}", settings.browser_url);

        let ws_url = discover_debugger_url(&settings.browser_url).await?;
        let idle = idle_timeout(settings);
        debug!("Browser idle timeout: {:?}", idle);

        let (browser, tab) = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let browser = Browser::connect_with_timeout(ws_url, idle)
                .map_err(|e| browser_error("Failed to connect to browser", e))?;
            let tab = browser
                .new_tab()
                .map_err(|e| browser_error("Failed to create tab", e))?;
            Ok((browser, tab))
        })
        .await
        .map_err(|e| browser_error("Connect task failed", e))??;

        let watched = browser.clone();
        let disconnected = spawn_watchdog(
            move || watched.get_version().map(|_| ()),
            settings.heartbeat_interval,
        );

        info!("Connected to browser successfully");

        Ok((
            Self {
                browser,
                tab,
                settings: settings.clone(),
            },
            disconnected,
        ))
    }

    /// Run a blocking tab operation, telling a dead browser apart from a failed call
    async fn on_tab<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        let outcome = tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(|e| browser_error(operation, e))?;

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if self.is_connected().await {
            Err(browser_error(operation, err))
        } else {
            debug!("{} after connection loss: {}", operation, err);
            Err(WebQueryError::Disconnected)
        }
    }

    async fn is_connected(&self) -> bool {
        let browser = self.browser.clone();
        tokio::task::spawn_blocking(move || browser.get_version().is_ok())
            .await
            .unwrap_or(false)
    }

    /// Close the tab, then release the client-side browser handle
    pub async fn close(self) -> Result<()> {
        info!("Closing browser tab");
        self.on_tab("Failed to close tab", |tab| {
            tab.close(true)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PageSession for RemoteSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);

        let target = url.to_string();
        let status = self
            .on_tab("Navigation failed", move |tab| {
                let slot = Arc::new(Mutex::new(None));
                tab.register_response_handling(
                    DOCUMENT_STATUS_HANDLER,
                    record_document_status(Arc::clone(&slot)),
                )?;

                let navigated = tab
                    .navigate_to(&target)
                    .and_then(|tab| tab.wait_until_navigated())
                    .map(|_| ());
                let status = match navigated {
                    Ok(()) => {
                        let timing = tab.evaluate(scripts::NAVIGATION_STATUS, false)?;
                        let timing = timing.value.and_then(|v| v.as_u64()).unwrap_or(0);
                        Ok(document_status(recorded_status(&slot), timing))
                    }
                    Err(e) if is_error_response(&e.to_string()) => {
                        debug!("Error response without a page: {}", e);
                        await_document_status(&slot, DOCUMENT_STATUS_GRACE).ok_or(e)
                    }
                    Err(e) => Err(e),
                };

                tab.deregister_response_handling(DOCUMENT_STATUS_HANDLER)?;
                status
            })
            .await?;

        check_status(status, url)?;

        info!("Successfully navigated to {} (status {})", url, status);
        Ok(())
    }

    async fn text_content(&mut self, selector: &str) -> Result<QueryValue> {
        let timeout = self.settings.selector_timeout;
        let owned = selector.to_string();

        debug!("Waiting for element: {} (timeout: {:?})", selector, timeout);

        self.on_tab("Query failed", move |tab| {
            let element = tab
                .wait_for_element_with_custom_timeout(&owned, timeout)
                .map_err(|_| anyhow::anyhow!("no element matched within {:?}", timeout))?;
            let text = element.call_js_fn(scripts::TEXT_CONTENT_FN, vec![], false)?;

            Ok(match text.value {
                Some(Value::String(text)) => QueryValue::Text(text),
                _ => QueryValue::Null,
            })
        })
        .await
        .map_err(|e| match e {
            WebQueryError::Browser(message) => WebQueryError::selector(selector, message),
            other => other,
        })
    }

    fn termination(&self, _report: &QueryReport) -> Termination {
        Termination::Exit(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_version_endpoint() {
        assert_eq!(
            version_endpoint("http://localhost:9222"),
            "http://localhost:9222/json/version"
        );
        assert_eq!(
            version_endpoint("http://127.0.0.1:9222/"),
            "http://127.0.0.1:9222/json/version"
        );
    }

    #[test]
    fn test_version_info_parse() {
        let body = r#"{
            "Browser": "Chrome/120.0.6099.109",
            "Protocol-Version": "1.3",
            "User-Agent": "Mozilla/5.0",
            "V8-Version": "12.0.267.8",
            "WebKit-Version": "537.36",
            "webSocketDebuggerUrl": "ws://localhost:9222/devtools/browser/0d3c4a"
        }"#;

        let info: VersionInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.browser, "Chrome/120.0.6099.109");
        assert_eq!(
            info.web_socket_debugger_url,
            "ws://localhost:9222/devtools/browser/0d3c4a"
        );
    }

    #[tokio::test]
    async fn test_ws_url_used_directly() {
        let url = "ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(discover_debugger_url(url).await.unwrap(), url);
    }

    #[test]
    fn test_status_policy() {
        assert!(check_status(200, "https://example.com").is_ok());
        assert!(check_status(204, "https://example.com").is_ok());
        assert!(check_status(0, "about:blank").is_ok());

        let err = check_status(404, "https://example.com/missing").unwrap_err();
        assert_eq!(err.exit_code(), 404);
        assert!(matches!(err, WebQueryError::Navigation { status: 404, .. }));

        assert_eq!(check_status(503, "https://example.com").unwrap_err().exit_code(), 503);
        assert!(check_status(301, "https://example.com").is_err());
    }

    #[test]
    fn test_error_response_classification() {
        assert!(is_error_response("Navigate failed: net::ERR_HTTP_RESPONSE_CODE_FAILURE"));
        assert!(!is_error_response("Navigate failed: net::ERR_NAME_NOT_RESOLVED"));
        assert!(!is_error_response("Navigate failed: net::ERR_CONNECTION_REFUSED"));
    }

    #[test]
    fn test_document_status_preferred_over_timing() {
        assert_eq!(document_status(Some(404), 0), 404);
        assert_eq!(document_status(Some(200), 200), 200);
        assert_eq!(document_status(None, 500), 500);
        assert_eq!(document_status(None, 0), 0);
    }

    #[test]
    fn test_error_response_exits_with_recorded_status() {
        let slot = Mutex::new(Some(404));
        let status = await_document_status(&slot, Duration::ZERO).unwrap();
        let err = check_status(status, "https://httpbin.org/status/404").unwrap_err();
        assert_eq!(err.exit_code(), 404);
    }

    #[test]
    fn test_document_status_arrives_late() {
        let slot = Arc::new(Mutex::new(None));
        let writer = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            *writer.lock().unwrap() = Some(500);
        });

        assert_eq!(await_document_status(&slot, Duration::from_secs(2)), Some(500));
        handle.join().unwrap();
    }

    #[test]
    fn test_no_document_status_gives_up() {
        let slot = Mutex::new(None);
        assert_eq!(await_document_status(&slot, Duration::from_millis(50)), None);
    }

    #[test]
    fn test_idle_timeout_outlasts_selector_waits() {
        let settings = SessionSettings::default();
        assert!(idle_timeout(&settings) > Duration::from_secs(30));
        assert_eq!(idle_timeout(&settings), settings.idle_timeout);

        let slow = SessionSettings {
            selector_timeout: Duration::from_secs(48 * 60 * 60),
            ..SessionSettings::default()
        };
        assert_eq!(idle_timeout(&slow), Duration::from_secs(96 * 60 * 60));
    }

    #[tokio::test]
    async fn test_watchdog_fires_when_check_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let disconnected = spawn_watchdog(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) >= 2 {
                    anyhow::bail!("connection closed");
                }
                Ok(())
            },
            Duration::from_millis(5),
        );

        tokio::time::timeout(Duration::from_secs(2), disconnected.wait())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_watchdog_quiet_while_healthy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let disconnected = spawn_watchdog(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(5),
        );

        let waited = tokio::time::timeout(Duration::from_millis(50), disconnected.wait()).await;
        assert!(waited.is_err());
        assert!(calls.load(Ordering::SeqCst) > 0);

        // The signal was dropped with the timed-out future, so the thread stops
        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(calls.load(Ordering::SeqCst) <= settled + 1);
    }

    #[tokio::test]
    async fn test_disconnected_fires_on_signal() {
        let (tx, rx) = oneshot::channel();
        let signal = Disconnected { rx };
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disconnected_pending_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        let signal = Disconnected { rx };
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(waited.is_err());
    }
}
