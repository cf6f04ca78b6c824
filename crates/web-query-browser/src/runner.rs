//! Sequential selector evaluation
//!
//! Selectors run strictly one after another against a single [`PageSession`].
//! A failing selector is reported and skipped; only a lost browser stops the loop.

use std::future::Future;
use std::io::Write;

use tracing::{debug, info, warn};
use web_query_core::{QueryConfig, QueryFailure, QueryReport, Termination};

use crate::error::{Result, WebQueryError};
use crate::session::PageSession;

/// Navigate to the configured target, run every selector and pick the termination
///
/// # Arguments
/// * `session` - Page to drive
/// * `config` - Target URL and selectors
/// * `out` - Receives one line per evaluated selector
/// * `err` - Receives one diagnostic line per failed selector
pub async fn execute<S, O, E>(
    session: &mut S,
    config: &QueryConfig,
    out: &mut O,
    err: &mut E,
) -> Result<Termination>
where
    S: PageSession + ?Sized,
    O: Write + Send,
    E: Write + Send,
{
    info!("Navigating to {}", config.target_url());
    session.navigate(config.target_url()).await?;

    let report = run_queries(session, config.selectors(), out, err).await?;
    info!(
        "Evaluated {} selectors ({} failed)",
        config.selectors().len(),
        report.failures.len()
    );

    Ok(session.termination(&report))
}

/// [`execute`], abandoned as soon as `disconnected` resolves
///
/// A session call stuck on a dead connection never returns by itself, so the
/// disconnect signal has to win the race for the run to end with
/// [`WebQueryError::Disconnected`].
pub async fn execute_until_disconnected<S, O, E, D>(
    session: &mut S,
    config: &QueryConfig,
    out: &mut O,
    err: &mut E,
    disconnected: D,
) -> Result<Termination>
where
    S: PageSession + ?Sized,
    O: Write + Send,
    E: Write + Send,
    D: Future<Output = ()>,
{
    tokio::select! {
        outcome = execute(session, config, out, err) => outcome,
        () = disconnected => {
            warn!("Browser connection lost");
            Err(WebQueryError::Disconnected)
        }
    }
}

/// Evaluate `selectors` in order, writing values to `out` and failures to `err`
///
/// Returns early only with [`WebQueryError::Disconnected`] or an I/O error on
/// the output streams.
pub async fn run_queries<S, O, E>(
    session: &mut S,
    selectors: &[String],
    out: &mut O,
    err: &mut E,
) -> Result<QueryReport>
where
    S: PageSession + ?Sized,
    O: Write + Send,
    E: Write + Send,
{
    let mut report = QueryReport::default();

    for selector in selectors {
        debug!("Querying {}", selector);

        match session.text_content(selector).await {
            Ok(value) => {
                writeln!(out, "{}", value)?;
                out.flush()?;
                report.printed += 1;
            }
            Err(WebQueryError::Disconnected) => return Err(WebQueryError::Disconnected),
            Err(e) => {
                let message = match e {
                    WebQueryError::Selector { message, .. } => message,
                    other => other.to_string(),
                };
                debug!("Selector {} failed: {}", selector, message);
                writeln!(err, "error: {}: {}", selector, message)?;
                report.failures.push(QueryFailure {
                    selector: selector.clone(),
                    message,
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use web_query_core::QueryValue;

    /// Mock page for testing.
    struct MockSession {
        navigation: Option<u16>,
        responses: HashMap<String, Result<QueryValue>>,
        disconnect_on: Option<String>,
        hang_on: Option<String>,
        keep_open_on_failure: bool,
        navigated_to: Option<String>,
        queried: Vec<String>,
    }

    impl MockSession {
        fn new() -> Self {
            Self {
                navigation: None,
                responses: HashMap::new(),
                disconnect_on: None,
                hang_on: None,
                keep_open_on_failure: false,
                navigated_to: None,
                queried: Vec::new(),
            }
        }

        fn add_text(&mut self, selector: &str, text: &str) {
            self.responses
                .insert(selector.to_string(), Ok(QueryValue::Text(text.to_string())));
        }

        fn add_timeout(&mut self, selector: &str) {
            self.responses.insert(
                selector.to_string(),
                Err(WebQueryError::selector(selector, "Element not found")),
            );
        }
    }

    #[async_trait]
    impl PageSession for MockSession {
        async fn navigate(&mut self, url: &str) -> Result<()> {
            self.navigated_to = Some(url.to_string());
            match self.navigation {
                Some(status) => Err(WebQueryError::Navigation {
                    status,
                    url: url.to_string(),
                }),
                None => Ok(()),
            }
        }

        async fn text_content(&mut self, selector: &str) -> Result<QueryValue> {
            self.queried.push(selector.to_string());
            if self.disconnect_on.as_deref() == Some(selector) {
                return Err(WebQueryError::Disconnected);
            }
            if self.hang_on.as_deref() == Some(selector) {
                std::future::pending::<()>().await;
            }
            match self.responses.remove(selector) {
                Some(response) => response,
                None => Ok(QueryValue::Null),
            }
        }

        fn termination(&self, report: &QueryReport) -> Termination {
            if self.keep_open_on_failure && report.has_failures() {
                Termination::StayOpen
            } else {
                Termination::Exit(0)
            }
        }
    }

    fn config(selectors: &[&str], url: &str) -> QueryConfig {
        QueryConfig::new(
            false,
            selectors.iter().map(|s| s.to_string()).collect(),
            Some(url),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_two_selectors_two_lines() {
        let mut session = MockSession::new();
        session.add_text("h1", "Example Domain");
        session.add_text(".sub", "More information...");

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let termination = execute(
            &mut session,
            &config(&["h1", ".sub"], "example.com"),
            &mut out,
            &mut err,
        )
        .await
        .unwrap();

        assert_eq!(termination, Termination::Exit(0));
        assert_eq!(session.navigated_to.as_deref(), Some("https://example.com"));
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Example Domain\nMore information...\n"
        );
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let mut session = MockSession::new();
        session.add_text("h1", "Title");
        session.add_timeout("h2");
        session.add_text("p", "Body");

        let selectors: Vec<String> = vec!["h1".into(), "h2".into(), "p".into()];
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let report = run_queries(&mut session, &selectors, &mut out, &mut err)
            .await
            .unwrap();

        assert_eq!(report.printed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].selector, "h2");
        assert_eq!(String::from_utf8(out).unwrap(), "Title\nBody\n");
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "error: h2: Element not found\n"
        );
        assert_eq!(session.termination(&report), Termination::Exit(0));
    }

    #[tokio::test]
    async fn test_failure_keeps_window_open() {
        let mut session = MockSession::new();
        session.keep_open_on_failure = true;
        session.add_timeout("#missing");

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let termination = execute(
            &mut session,
            &config(&["#missing"], "example.com"),
            &mut out,
            &mut err,
        )
        .await
        .unwrap();

        assert_eq!(termination, Termination::StayOpen);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_navigation_failure_skips_selectors() {
        let mut session = MockSession::new();
        session.navigation = Some(404);
        session.add_text("h1", "Not Found");

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result = execute(
            &mut session,
            &config(&["h1"], "example.com/missing"),
            &mut out,
            &mut err,
        )
        .await;

        let err_value = result.unwrap_err();
        assert_eq!(err_value.exit_code(), 404);
        assert!(session.queried.is_empty());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_aborts_loop() {
        let mut session = MockSession::new();
        session.add_text("h1", "Title");
        session.disconnect_on = Some("h2".into());
        session.add_text("p", "Body");

        let selectors: Vec<String> = vec!["h1".into(), "h2".into(), "p".into()];
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result = run_queries(&mut session, &selectors, &mut out, &mut err).await;

        assert!(matches!(result, Err(WebQueryError::Disconnected)));
        assert_eq!(session.queried, ["h1", "h2"]);
        assert_eq!(String::from_utf8(out).unwrap(), "Title\n");
    }

    #[tokio::test]
    async fn test_absence_markers_printed() {
        let mut session = MockSession::new();
        session
            .responses
            .insert("#empty".into(), Ok(QueryValue::Null));
        session
            .responses
            .insert("#gone".into(), Ok(QueryValue::Undefined));

        let selectors: Vec<String> = vec!["#empty".into(), "#gone".into()];
        let (mut out, mut err) = (Vec::new(), Vec::new());
        run_queries(&mut session, &selectors, &mut out, &mut err)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "null\nundefined\n");
    }

    #[tokio::test]
    async fn test_no_selectors() {
        let mut session = MockSession::new();
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let termination = execute(&mut session, &config(&[], "example.com"), &mut out, &mut err)
            .await
            .unwrap();

        assert_eq!(termination, Termination::Exit(0));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_wins_over_stuck_query() {
        let mut session = MockSession::new();
        session.add_text("h1", "Title");
        session.hang_on = Some("h2".into());
        session.add_text("p", "Body");

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            execute_until_disconnected(
                &mut session,
                &config(&["h1", "h2", "p"], "example.com"),
                &mut out,
                &mut err,
                async move {
                    let _ = rx.await;
                },
            ),
        )
        .await
        .unwrap();

        let err_value = result.unwrap_err();
        assert!(matches!(err_value, WebQueryError::Disconnected));
        assert_eq!(err_value.exit_code(), 2);
        assert_eq!(session.queried, ["h1", "h2"]);
        assert_eq!(String::from_utf8(out).unwrap(), "Title\n");
    }

    #[tokio::test]
    async fn test_healthy_run_ignores_pending_disconnect() {
        let mut session = MockSession::new();
        session.add_text("h1", "Title");

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let termination = execute_until_disconnected(
            &mut session,
            &config(&["h1"], "example.com"),
            &mut out,
            &mut err,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(termination, Termination::Exit(0));
        assert_eq!(String::from_utf8(out).unwrap(), "Title\n");
    }
}
