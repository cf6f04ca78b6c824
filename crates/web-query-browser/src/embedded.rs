//! Embedded sessions: a webview window hosted in this process
//!
//! The GUI event loop owns the window and has to run on the main thread, so the
//! selector runner lives on a worker thread. It sends [`Command`]s through an
//! event-loop proxy; page scripts answer over IPC and the loop forwards those
//! answers back to the runner.

use std::convert::Infallible;
use std::io;
use std::thread;

use crate::error::{browser_error, Result, WebQueryError};
use crate::session::PageSession;
use crate::{runner, scripts};
use async_trait::async_trait;
use serde::Deserialize;
use tao::event::{Event, StartCause, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use tao::window::{Window, WindowBuilder};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use web_query_core::{QueryConfig, QueryReport, QueryValue, Termination};
use wry::http::Request;
use wry::{PageLoadEvent, WebView, WebViewBuilder};

const WINDOW_TITLE: &str = "Web Query";

/// Requests from the runner thread to the window
#[derive(Debug)]
pub enum Command {
    Navigate(String),
    Query { id: u64, selector: String },
}

/// Messages posted by page scripts through `window.ipc.postMessage`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IpcMessage {
    Navigation {
        status: u16,
        url: String,
    },
    Query {
        id: u64,
        #[serde(default)]
        found: bool,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Everything the event loop reacts to besides window events
#[derive(Debug)]
pub enum UserEvent {
    Command(Command),
    PageLoaded(String),
    Ipc(IpcMessage),
    RunFinished(Result<Termination>),
}

/// Answers from the window to the runner thread
#[derive(Debug)]
enum Reply {
    Navigated,
    Query {
        id: u64,
        result: std::result::Result<QueryValue, String>,
    },
}

fn query_reply(id: u64, found: bool, text: Option<String>, error: Option<String>) -> Reply {
    let result = match error {
        Some(message) => Err(message),
        None if !found => Ok(QueryValue::Undefined),
        None => Ok(QueryValue::from_text(text)),
    };
    Reply::Query { id, result }
}

/// Selector evaluation starts only for a 200 (or unreported) status on the target
fn accepts_navigation(status: u16, url: &str, target: &str) -> bool {
    (status == 200 || status == 0) && url.starts_with(target)
}

/// Runner-side handle on the embedded window
pub struct EmbeddedSession {
    proxy: EventLoopProxy<UserEvent>,
    replies: mpsc::UnboundedReceiver<Reply>,
    next_id: u64,
}

impl EmbeddedSession {
    fn send(&self, command: Command) -> Result<()> {
        self.proxy
            .send_event(UserEvent::Command(command))
            .map_err(|_| WebQueryError::Browser("window event loop has shut down".to_string()))
    }

    async fn next_reply(&mut self) -> Result<Reply> {
        self.replies
            .recv()
            .await
            .ok_or_else(|| WebQueryError::Browser("window was closed".to_string()))
    }
}

#[async_trait]
impl PageSession for EmbeddedSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.send(Command::Navigate(url.to_string()))?;

        loop {
            match self.next_reply().await? {
                Reply::Navigated => return Ok(()),
                other => debug!("Ignoring {:?} while navigating", other),
            }
        }
    }

    async fn text_content(&mut self, selector: &str) -> Result<QueryValue> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(Command::Query {
            id,
            selector: selector.to_string(),
        })?;

        loop {
            match self.next_reply().await? {
                Reply::Query { id: answered, result } if answered == id => {
                    return result.map_err(|message| WebQueryError::selector(selector, message));
                }
                other => debug!("Ignoring stale {:?}", other),
            }
        }
    }

    fn termination(&self, report: &QueryReport) -> Termination {
        if report.has_failures() {
            Termination::StayOpen
        } else {
            Termination::Exit(0)
        }
    }
}

/// One window with its webview; the webview is dropped first
struct Page {
    webview: WebView,
    window: Window,
    shown: bool,
}

fn open_page(
    target: &EventLoopWindowTarget<UserEvent>,
    proxy: &EventLoopProxy<UserEvent>,
    debug: bool,
) -> Result<Page> {
    // Hidden until the first load finishes, so no blank window flashes up
    let window = WindowBuilder::new()
        .with_title(WINDOW_TITLE)
        .with_visible(false)
        .build(target)
        .map_err(|e| browser_error("Failed to create window", e))?;

    let ipc_proxy = proxy.clone();
    let load_proxy = proxy.clone();

    let builder = WebViewBuilder::new()
        .with_devtools(debug)
        .with_ipc_handler(move |request: Request<String>| {
            match serde_json::from_str::<IpcMessage>(request.body()) {
                Ok(message) => {
                    let _ = ipc_proxy.send_event(UserEvent::Ipc(message));
                }
                Err(e) => warn!("Ignoring malformed IPC message: {}", e),
            }
        })
        .with_on_page_load_handler(move |event, url| {
            if let PageLoadEvent::Finished = event {
                let _ = load_proxy.send_event(UserEvent::PageLoaded(url));
            }
        });

    #[cfg(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "ios",
        target_os = "android"
    ))]
    let webview = builder.build(&window);

    #[cfg(not(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "ios",
        target_os = "android"
    )))]
    let webview = {
        use tao::platform::unix::WindowExtUnix;
        use wry::WebViewBuilderExtUnix;
        let vbox = window
            .default_vbox()
            .ok_or_else(|| WebQueryError::Browser("window has no GTK container".to_string()))?;
        builder.build_gtk(vbox)
    };

    let webview = webview.map_err(|e| browser_error("Failed to create webview", e))?;

    if debug {
        webview.open_devtools();
    }

    Ok(Page {
        webview,
        window,
        shown: false,
    })
}

/// Event-loop-side state
struct Shell {
    target: String,
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    debug: bool,
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    proxy: EventLoopProxy<UserEvent>,
    replies: mpsc::UnboundedSender<Reply>,
    page: Option<Page>,
    awaiting_navigation: bool,
}

impl Shell {
    /// Returns the exit status once the process should end
    #[cfg_attr(not(target_os = "macos"), allow(unused_variables))]
    fn handle(
        &mut self,
        event: Event<'_, UserEvent>,
        target: &EventLoopWindowTarget<UserEvent>,
    ) -> Option<i32> {
        match event {
            Event::NewEvents(StartCause::Init) => {
                info!("Window shell started for {}", self.target);
                None
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                self.page = None;
                self.all_windows_closed()
            }
            #[cfg(target_os = "macos")]
            Event::Reopen { .. } => {
                if self.page.is_none() {
                    self.reopen(target);
                }
                None
            }
            Event::UserEvent(event) => self.on_user_event(event),
            _ => None,
        }
    }

    fn all_windows_closed(&self) -> Option<i32> {
        if cfg!(target_os = "macos") {
            info!("Last window closed; staying alive until reactivated");
            None
        } else {
            Some(0)
        }
    }

    #[cfg(target_os = "macos")]
    fn reopen(&mut self, target: &EventLoopWindowTarget<UserEvent>) {
        match open_page(target, &self.proxy, self.debug) {
            Ok(page) => {
                if let Err(e) = page.webview.load_url(&self.target) {
                    warn!("Failed to load {}: {}", self.target, e);
                }
                self.page = Some(page);
            }
            Err(e) => error!("Failed to reopen window: {}", e),
        }
    }

    fn on_user_event(&mut self, event: UserEvent) -> Option<i32> {
        match event {
            UserEvent::Command(Command::Navigate(url)) => {
                self.awaiting_navigation = true;
                match &self.page {
                    Some(page) => {
                        if let Err(e) = page.webview.load_url(&url) {
                            warn!("Failed to load {}: {}", url, e);
                        }
                    }
                    None => warn!("No window to load {} into", url),
                }
                None
            }
            UserEvent::Command(Command::Query { id, selector }) => {
                if let Err(e) = self.evaluate_query(id, &selector) {
                    let _ = self.replies.send(Reply::Query {
                        id,
                        result: Err(e.to_string()),
                    });
                }
                None
            }
            UserEvent::PageLoaded(url) => {
                debug!("Finished loading {}", url);
                if let Some(page) = self.page.as_mut() {
                    if !page.shown {
                        page.window.set_visible(true);
                        page.shown = true;
                    }
                    if self.awaiting_navigation {
                        if let Err(e) = page.webview.evaluate_script(scripts::REPORT_NAVIGATION) {
                            warn!("Failed to read navigation status: {}", e);
                        }
                    }
                }
                None
            }
            UserEvent::Ipc(IpcMessage::Navigation { status, url }) => {
                if self.awaiting_navigation && accepts_navigation(status, &url, &self.target) {
                    info!("Navigated to {} (status {})", url, status);
                    self.awaiting_navigation = false;
                    let _ = self.replies.send(Reply::Navigated);
                } else {
                    debug!("Ignoring navigation to {} (status {})", url, status);
                }
                None
            }
            UserEvent::Ipc(IpcMessage::Query {
                id,
                found,
                text,
                error,
            }) => {
                let _ = self.replies.send(query_reply(id, found, text, error));
                None
            }
            UserEvent::RunFinished(Ok(Termination::Exit(code))) => Some(code),
            UserEvent::RunFinished(Ok(Termination::StayOpen)) => {
                info!("Selectors failed; leaving the window open");
                None
            }
            UserEvent::RunFinished(Err(e)) => {
                error!("{}", e);
                Some(e.exit_code())
            }
        }
    }

    fn evaluate_query(&self, id: u64, selector: &str) -> Result<()> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| WebQueryError::Browser("window was closed".to_string()))?;
        let script = scripts::query_script(id, selector)?;
        page.webview
            .evaluate_script(&script)
            .map_err(|e| browser_error("Script evaluation failed", e))
    }
}

fn spawn_runner(
    config: QueryConfig,
    mut session: EmbeddedSession,
    proxy: EventLoopProxy<UserEvent>,
) -> Result<()> {
    thread::Builder::new()
        .name("web-query-runner".to_string())
        .spawn(move || {
            let outcome = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(WebQueryError::from)
                .and_then(|runtime| {
                    runtime.block_on(async {
                        let (mut out, mut err) = (io::stdout(), io::stderr());
                        runner::execute(&mut session, &config, &mut out, &mut err).await
                    })
                });
            let _ = proxy.send_event(UserEvent::RunFinished(outcome));
        })?;
    Ok(())
}

/// Open the window, run the selectors against it and hand the main thread to the event loop
///
/// Only returns on a startup failure; otherwise the event loop ends the process.
pub fn launch(config: QueryConfig) -> Result<Infallible> {
    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    let proxy = event_loop.create_proxy();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let page = open_page(&event_loop, &proxy, config.debug())?;

    let session = EmbeddedSession {
        proxy: proxy.clone(),
        replies: reply_rx,
        next_id: 0,
    };

    let mut shell = Shell {
        target: config.target_url().to_string(),
        debug: config.debug(),
        proxy: proxy.clone(),
        replies: reply_tx,
        page: Some(page),
        awaiting_navigation: false,
    };

    spawn_runner(config, session, proxy)?;

    event_loop.run(move |event, target, control_flow| {
        *control_flow = ControlFlow::Wait;
        if let Some(code) = shell.handle(event, target) {
            *control_flow = ControlFlow::ExitWithCode(code);
        }
    })
}
