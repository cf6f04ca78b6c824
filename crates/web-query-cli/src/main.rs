//! web-query CLI - print the text of elements on a live web page
//!
//! Usage:
//!   web-query -q "h1" example.com                Attach to Chrome on :9222 and print the heading
//!   web-query -q "h1" -q ".sub" example.com      Several queries, one line each
//!   web-query --mode embedded -d -q "h1" url     Use an in-process window with dev tools

mod cli;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use cli::{parse_error_code, Cli};
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use web_query_browser::{runner, RemoteSession};
use web_query_core::{QueryConfig, SessionMode, SessionSettings, Termination, WebQueryError};

fn main() {
    std::process::exit(run());
}

/// Parse, dispatch and map the outcome to the process exit status
fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return parse_error_code(&e);
        }
    };

    if let Err(e) = init_logging(cli.debug) {
        eprintln!("warning: {:#}", e);
    }

    let (config, settings) = match cli.into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", Cli::command().render_help());
            return e.exit_code();
        }
    };

    exit_status(dispatch(config, settings))
}

/// Map the outcome of a run to the process exit status
fn exit_status(outcome: web_query_core::Result<Termination>) -> i32 {
    match outcome {
        Ok(Termination::Exit(code)) => code,
        Ok(Termination::StayOpen) => 0,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    Ok(())
}

fn dispatch(
    config: QueryConfig,
    settings: SessionSettings,
) -> web_query_core::Result<Termination> {
    match settings.mode {
        SessionMode::Remote => {
            let runtime = tokio::runtime::Runtime::new()?;
            let outcome = runtime.block_on(run_remote(&config, &settings));
            // A call stuck on a dead connection must not hold up the exit
            runtime.shutdown_background();
            outcome
        }
        SessionMode::Embedded => run_embedded(config),
    }
}

async fn run_remote(
    config: &QueryConfig,
    settings: &SessionSettings,
) -> web_query_core::Result<Termination> {
    let (mut session, disconnected) = RemoteSession::connect(settings).await?;
    let (mut out, mut err) = (io::stdout(), io::stderr());

    let outcome = runner::execute_until_disconnected(
        &mut session,
        config,
        &mut out,
        &mut err,
        disconnected.wait(),
    )
    .await;

    if !matches!(outcome, Err(WebQueryError::Disconnected)) {
        if let Err(e) = session.close().await {
            warn!("{}", e);
        }
    }

    info!("Remote run finished");
    outcome
}

#[cfg(feature = "embedded")]
fn run_embedded(config: QueryConfig) -> web_query_core::Result<Termination> {
    match web_query_browser::embedded::launch(config)? {}
}

#[cfg(not(feature = "embedded"))]
fn run_embedded(_config: QueryConfig) -> web_query_core::Result<Termination> {
    Err(WebQueryError::Usage(
        "embedded mode needs a build with the `embedded` feature".to_string(),
    ))
}
