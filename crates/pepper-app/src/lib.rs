#![warn(missing_docs)]
//! # pepper-app
//!
//! ## Purpose
//! Command-line harness around [`pepper_auth::Pepper`] for talking to a
//! CoovaChilli gateway from a terminal or a service script.
//!
//! ## Responsibilities
//! - Read configuration from flags and `PEPPER_*` environment variables.
//! - Install the `tracing` subscriber.
//! - Run `status`, `logon`, `logoff`, and the auto-refresh watch loop.
//! - Render gateway answers as one log-safe line.
//!
//! ## Data flow
//! [`Args`] -> [`PepperOptions`] -> [`build_driver`] -> command ->
//! [`render_status`] on stdout.
//!
//! ## Error model
//! Driver, transport, and logging setup failures are wrapped in [`AppError`].
//!
//! ## Security and privacy notes
//! - Passwords are only read from flags or the environment and never printed.
//! - [`redact_sensitive`] strips credential values from free-form text.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use pepper_auth::{
    DEFAULT_TIMEOUT_MS, GatewayStatus, LogonOptions, Pepper, PepperError, PepperOptions,
    TransportError,
};
use pepper_core::{SENSITIVE_QUERY_KEYS, redact_uri};
use pepper_transport::HttpTransport;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("PEPPER_VERSION");

/// Default sleep between watch-loop ticks.
pub const DEFAULT_POLL_MS: u64 = 250;

/// CoovaChilli JSON API client.
#[derive(Parser, Debug, Clone)]
#[command(name = "pepper", version = APP_VERSION)]
#[command(about = "Log on to and off a CoovaChilli captive portal gateway")]
pub struct Args {
    /// Gateway host; defaults to `uamip` from the redirect query
    #[arg(long, env = "PEPPER_HOST")]
    pub host: Option<String>,

    /// Gateway port; defaults to `uamport` from the redirect query
    #[arg(long, env = "PEPPER_PORT")]
    pub port: Option<u16>,

    /// Talk to the gateway over HTTPS (port is omitted)
    #[arg(long, env = "PEPPER_SSL")]
    pub ssl: bool,

    /// CHAP identifier byte as a hex pair
    #[arg(long, env = "PEPPER_IDENT", default_value = "00")]
    pub ident: String,

    /// Service that computes CHAP responses on our behalf
    #[arg(long, env = "PEPPER_UAMSERVICE")]
    pub uamservice: Option<String>,

    /// Auto-refresh interval after a successful logon (0 disables)
    #[arg(long, env = "PEPPER_INTERVAL_MS")]
    pub interval_ms: Option<u64>,

    /// Per-request timeout
    #[arg(long, env = "PEPPER_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Redirect query string the gateway sent the browser to the portal with
    #[arg(long, env = "PEPPER_QUERY_STRING")]
    pub query_string: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PEPPER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed on the command line.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch and print the current client status
    Status,
    /// Authenticate with username and password
    Logon {
        /// Account name
        #[arg(long, env = "PEPPER_USERNAME")]
        username: String,
        /// Account password
        #[arg(long, env = "PEPPER_PASSWORD", hide_env_values = true)]
        password: String,
        /// Authentication protocol (chap or pap)
        #[arg(long)]
        protocol: Option<String>,
        /// Keep refreshing the status after a successful logon
        #[arg(long)]
        watch: bool,
        /// Watch-loop tuning
        #[command(flatten)]
        plan: WatchArgs,
    },
    /// End the session
    Logoff,
    /// Refresh the status periodically
    Watch {
        /// Refresh interval; defaults to --interval-ms
        #[arg(long)]
        every_ms: Option<u64>,
        /// Watch-loop tuning
        #[command(flatten)]
        plan: WatchArgs,
    },
}

/// Watch-loop tuning shared by `logon --watch` and `watch`.
#[derive(ClapArgs, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchArgs {
    /// Sleep between timer checks
    #[arg(long, default_value_t = DEFAULT_POLL_MS)]
    pub poll_ms: u64,

    /// Stop after this many refreshes
    #[arg(long)]
    pub max_refreshes: Option<u32>,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self {
            poll_ms: DEFAULT_POLL_MS,
            max_refreshes: None,
        }
    }
}

impl Args {
    /// Converts command-line configuration into driver options.
    pub fn to_options(&self) -> PepperOptions {
        PepperOptions {
            host: self.host.clone(),
            port: self.port,
            ssl: self.ssl,
            ident: self.ident.clone(),
            uamservice: self.uamservice.clone(),
            interval_ms: self.interval_ms,
            timeout_ms: self.timeout_ms,
            query_string: self.query_string.clone(),
        }
    }
}

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `pepper*` targets log at `level`.
///
/// # Errors
/// Returns [`AppError::Logging`] for an invalid level or when a subscriber is
/// already installed.
pub fn init_tracing(level: &str) -> Result<(), AppError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("warn,pepper={level}"))
            .map_err(|error| AppError::Logging(error.to_string()))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|error| AppError::Logging(error.to_string()))
}

/// Builds a driver backed by the HTTP transport.
///
/// # Errors
/// Returns [`AppError::Transport`] when the HTTP client cannot start and
/// [`AppError::Pepper`] for configuration errors.
pub fn build_driver(options: PepperOptions) -> Result<Pepper, AppError> {
    let transport = HttpTransport::new()?;
    Ok(Pepper::new(options, Arc::new(transport))?)
}

/// Runs the auto-refresh loop until `max_refreshes` refreshes have fired.
///
/// `pause` is called between timer checks and `report` receives every
/// refresh outcome; failed refreshes do not stop the loop.
///
/// # Errors
/// Returns [`AppError::NoRefreshInterval`] when no interval is configured.
pub fn run_watch(
    pepper: &mut Pepper,
    every: Option<Duration>,
    plan: WatchArgs,
    mut pause: impl FnMut(Duration),
    mut report: impl FnMut(&Result<GatewayStatus, PepperError>),
) -> Result<u32, AppError> {
    if !pepper.start_auto_refresh(every) {
        return Err(AppError::NoRefreshInterval);
    }

    let poll = Duration::from_millis(plan.poll_ms.max(1));
    let mut fired = 0_u32;
    while plan.max_refreshes.is_none_or(|max| fired < max) {
        pause(poll);
        if let Some(outcome) = pepper.on_tick() {
            fired += 1;
            report(&outcome);
        }
    }

    pepper.stop_auto_refresh();
    Ok(fired)
}

/// Runs one parsed command, handing every output line to `emit`.
///
/// # Errors
/// Returns the first driver or watch-loop failure. Individual refresh
/// failures inside a watch loop are emitted and the loop keeps going.
pub fn run(
    pepper: &mut Pepper,
    command: &Command,
    mut emit: impl FnMut(String),
) -> Result<(), AppError> {
    match command {
        Command::Status => {
            let status = pepper.refresh()?;
            emit(render_status(&status));
        }
        Command::Logon {
            username,
            password,
            protocol,
            watch,
            plan,
        } => {
            let options = LogonOptions {
                protocol: protocol.clone(),
            };
            let status = pepper.logon(username, password, &options)?;
            emit(render_status(&status));
            if *watch && status.is_authenticated() {
                watch_and_emit(pepper, None, *plan, emit)?;
            }
        }
        Command::Logoff => {
            let status = pepper.logoff()?;
            emit(render_status(&status));
        }
        Command::Watch { every_ms, plan } => {
            let every = every_ms.map(Duration::from_millis);
            watch_and_emit(pepper, every, *plan, emit)?;
        }
    }
    Ok(())
}

fn watch_and_emit(
    pepper: &mut Pepper,
    every: Option<Duration>,
    plan: WatchArgs,
    mut emit: impl FnMut(String),
) -> Result<(), AppError> {
    let fired = run_watch(pepper, every, plan, std::thread::sleep, |outcome| match outcome {
        Ok(status) => emit(render_status(status)),
        Err(error) => emit(format!("refresh failed: {error}")),
    })?;
    info!(fired, "watch loop finished");
    Ok(())
}

/// Renders a gateway answer as one line.
///
/// Shows the client state, the challenge when unauthenticated, and the
/// session id, user and accounting counters when present.
pub fn render_status(status: &GatewayStatus) -> String {
    let mut parts = vec![format!("clientState={}", status.client_state)];

    if !status.is_authenticated()
        && let Some(challenge) = status.usable_challenge()
    {
        parts.push(format!("challenge={challenge}"));
    }

    if let Some(session) = status.session.as_ref() {
        for (label, key) in [("session", "sessionid"), ("user", "userName")] {
            if let Some(value) = session.get(key).and_then(Value::as_str) {
                parts.push(format!("{label}={value}"));
            }
        }
    }

    if let Some(accounting) = status.accounting.as_ref() {
        for (label, key) in [
            ("time", "sessionTime"),
            ("in", "inputOctets"),
            ("out", "outputOctets"),
        ] {
            if let Some(value) = accounting.get(key).and_then(Value::as_u64) {
                parts.push(format!("{label}={value}"));
            }
        }
    }

    parts.join(" ")
}

/// Redacts credential values in log-safe output.
///
/// URIs go through [`redact_uri`]; bare `key=value` fragments for
/// `password`, `response`, and `chap` lose their value up to the next `&` or
/// whitespace.
pub fn redact_sensitive(input: &str) -> String {
    input
        .split(' ')
        .map(|token| {
            if token.contains("://") && token.contains('?') {
                redact_uri(token)
            } else {
                redact_fragment(token)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn redact_fragment(token: &str) -> String {
    token
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _))
                if SENSITIVE_QUERY_KEYS
                    .iter()
                    .any(|candidate| key.eq_ignore_ascii_case(candidate)) =>
            {
                format!("{key}=<redacted>")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Logs a driver failure with its category.
pub fn log_failure(error: &AppError) {
    match error {
        AppError::Pepper(inner) => warn!(kind = ?inner.kind(), error = %inner, "command failed"),
        other => warn!(error = %other, "command failed"),
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Driver error.
    #[error("{0}")]
    Pepper(#[from] PepperError),
    /// HTTP client could not be created.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Logging could not be initialized.
    #[error("logging error: {0}")]
    Logging(String),
    /// Watch requested without any interval.
    #[error("no refresh interval: pass --every-ms or --interval-ms")]
    NoRefreshInterval,
}
