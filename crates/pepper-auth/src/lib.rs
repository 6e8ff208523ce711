#![warn(missing_docs)]
//! # pepper-auth
//!
//! ## Purpose
//! Drives the captive-portal login sequence against a CoovaChilli-style JSON
//! interface and keeps the session fresh afterwards.
//!
//! ## Responsibilities
//! - Resolve gateway configuration once, at construction.
//! - Run `status` refreshes, the three-step `logon`, and `logoff` through an
//!   injectable [`GatewayTransport`].
//! - Derive the logon credential locally (CHAP), through a delegation service,
//!   or not at all (PAP).
//! - Own the auto-refresh timer.
//!
//! ## Data flow
//! [`Pepper::logon`] -> `status` call (fresh challenge) -> CHAP / uamservice /
//! PAP credential -> `logon` call -> cached [`GatewayStatus`] replaced ->
//! auto-refresh armed when the gateway reports `AUTH`.
//!
//! ## Ownership and lifetimes
//! The driver exclusively owns the cached session and replaces it wholesale on
//! every successful response. Every I/O method takes `&mut self`, so a single
//! driver never runs two operations at once. Two drivers pointed at the same
//! gateway are not coordinated: both can pass the "already AUTH" guard before
//! either logon lands, and both will submit.
//!
//! ## Error model
//! Configuration problems fail construction. Validation errors are returned
//! before any transport call. Protocol and transport failures leave the cached
//! session untouched. See [`ErrorKind`] for the classification. Nothing is
//! retried automatically.
//!
//! ## Security and privacy notes
//! Passwords are never logged; logged URIs pass through
//! [`pepper_core::redact_uri`]. A non-HTTPS delegation service triggers a
//! warning through the configured [`SecurityWarningSink`] but is allowed.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use pepper_auth::{GatewayTransport, Pepper, PepperOptions, TransportError, TransportRequest};
//! use serde_json::{Value, json};
//!
//! struct Offline;
//!
//! impl GatewayTransport for Offline {
//!     fn call(&self, _request: &TransportRequest<'_>) -> Result<Value, TransportError> {
//!         Ok(json!({"clientState": 0, "challenge": "00ff"}))
//!     }
//! }
//!
//! let options = PepperOptions {
//!     host: Some("10.1.0.1".to_string()),
//!     port: Some(3990),
//!     ..PepperOptions::default()
//! };
//! let mut pepper = Pepper::new(options, Arc::new(Offline)).expect("config should resolve");
//! assert_eq!(pepper.base_url(), "http://10.1.0.1:3990/json/");
//! assert!(pepper.refresh().is_ok());
//! ```

mod schedule;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use pepper_chap::{ChapError, DEFAULT_IDENT, chap, parse_ident};
use pepper_core::{
    GatewayEndpoint, QueryParams, RedirectParams, append_query, extract_redirect_params,
    merge_query, redact_uri, resolve_base_url,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub use pepper_core::{ClientState, GatewayStatus};
pub use schedule::{Clock, ManualClock, RefreshSchedule, SystemClock};

/// Per-call timeout used when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Field carrying the computed response in a delegation-service reply.
pub const UAMSERVICE_CHAP_FIELD: &str = "chap";

/// Construction input for [`Pepper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PepperOptions {
    /// Gateway host; falls back to `uamip` from the redirect query.
    pub host: Option<String>,
    /// Gateway port; falls back to `uamport` from the redirect query.
    pub port: Option<u16>,
    /// Use HTTPS (and drop the port).
    pub ssl: bool,
    /// CHAP identifier byte as a hex pair.
    pub ident: String,
    /// Optional delegation service that computes CHAP responses.
    pub uamservice: Option<String>,
    /// Auto-refresh interval in milliseconds; `None` or `0` disables it.
    pub interval_ms: Option<u64>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Redirect query string the portal page was loaded with.
    pub query_string: Option<String>,
}

impl Default for PepperOptions {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            ssl: false,
            ident: DEFAULT_IDENT.to_string(),
            uamservice: None,
            interval_ms: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            query_string: None,
        }
    }
}

/// One outgoing call handed to a [`GatewayTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest<'a> {
    /// Target URI without the parameters in `query`.
    pub uri: &'a str,
    /// Query parameters to append.
    pub query: &'a QueryParams,
    /// Time budget for the whole call.
    pub timeout: Duration,
}

impl TransportRequest<'_> {
    /// Full request target: `uri` plus serialized `query`.
    pub fn target(&self) -> String {
        append_query(self.uri, self.query)
    }
}

/// GET-style JSON transport used for gateway and delegation-service calls.
///
/// Implementations must return the parsed JSON body on success, and an error
/// for network failures, timeouts, non-2xx statuses, and malformed bodies.
pub trait GatewayTransport: Send + Sync {
    /// Performs one call.
    fn call(&self, request: &TransportRequest<'_>) -> Result<Value, TransportError>;
}

/// Transport-level failures, forwarded verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection or I/O failure.
    #[error("network failure: {0}")]
    Network(String),
    /// The call exceeded its time budget.
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    /// Remote answered with a non-success HTTP status.
    #[error("unexpected http status {0}")]
    Status(u16),
    /// Body could not be parsed as a JSON object.
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// Receives security warnings raised by the driver.
pub trait SecurityWarningSink: Send + Sync {
    /// Reports one warning.
    fn warn(&self, message: &str);
}

/// Default sink that emits warnings through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWarningSink;

impl SecurityWarningSink for TracingWarningSink {
    fn warn(&self, message: &str) {
        warn!(target: "pepper::security", "{message}");
    }
}

/// Supported credential protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthProtocol {
    /// Clear password sent in the `password` field.
    Pap,
    /// MD5 challenge response sent in the `response` field.
    #[default]
    Chap,
}

impl AuthProtocol {
    /// Lower-case protocol name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pap => "pap",
            Self::Chap => "chap",
        }
    }
}

impl fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProtocol {
    type Err = PepperError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pap" => Ok(Self::Pap),
            "chap" => Ok(Self::Chap),
            _ => Err(PepperError::UnsupportedProtocol(raw.to_string())),
        }
    }
}

/// Per-call options for [`Pepper::logon`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogonOptions {
    /// Protocol name; `None` means `chap`.
    pub protocol: Option<String>,
}

impl LogonOptions {
    /// Options selecting a protocol by name.
    pub fn with_protocol(protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
        }
    }

    /// Resolves the requested protocol.
    ///
    /// # Errors
    /// Returns [`PepperError::UnsupportedProtocol`] for unknown names.
    pub fn resolve_protocol(&self) -> Result<AuthProtocol, PepperError> {
        match &self.protocol {
            Some(name) => name.parse(),
            None => Ok(AuthProtocol::default()),
        }
    }
}

/// Credential field named by a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    /// The username argument.
    Username,
    /// The password argument.
    Password,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username => f.write_str("username"),
            Self::Password => f.write_str("password"),
        }
    }
}

/// Coarse classification of [`PepperError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Construction-time configuration problem: no resolvable gateway host,
    /// a malformed `ident`, or a `uamservice` that is not an absolute
    /// `http`/`https` URL.
    Configuration,
    /// Caller input rejected before any network call.
    Validation,
    /// Gateway or delegation service answered with something unusable.
    Protocol,
    /// Transport failure passed through unchanged.
    Transport,
}

/// Captive-portal session driver.
pub struct Pepper {
    base_url: String,
    ident: String,
    uamservice: Option<String>,
    interval: Option<Duration>,
    timeout: Duration,
    redirect_params: RedirectParams,
    status: GatewayStatus,
    transport: Arc<dyn GatewayTransport>,
    clock: Arc<dyn Clock>,
    schedule: Option<RefreshSchedule>,
}

impl Pepper {
    /// Creates a driver using the wall clock and `tracing` for warnings.
    ///
    /// # Errors
    /// See [`Pepper::with_collaborators`].
    pub fn new(
        options: PepperOptions,
        transport: Arc<dyn GatewayTransport>,
    ) -> Result<Self, PepperError> {
        Self::with_collaborators(
            options,
            transport,
            Arc::new(SystemClock),
            Arc::new(TracingWarningSink),
        )
    }

    /// Creates a driver with explicit clock and warning sink.
    ///
    /// # Errors
    /// Returns [`PepperError::UnresolvableBaseUrl`] when neither options nor
    /// the redirect query name a host.
    /// Returns [`PepperError::InvalidIdent`] when `ident` is not one hex byte.
    /// Returns [`PepperError::InvalidUamService`] when `uamservice` is not an
    /// absolute http(s) URL.
    pub fn with_collaborators(
        options: PepperOptions,
        transport: Arc<dyn GatewayTransport>,
        clock: Arc<dyn Clock>,
        warnings: Arc<dyn SecurityWarningSink>,
    ) -> Result<Self, PepperError> {
        let redirect_params = extract_redirect_params(options.query_string.as_deref());

        let host = options
            .host
            .filter(|host| !host.trim().is_empty())
            .or_else(|| redirect_params.get("uamip").cloned());
        let port = options.port.filter(|port| *port != 0).or_else(|| {
            redirect_params
                .get("uamport")
                .and_then(|raw| raw.trim().parse::<u16>().ok())
        });

        let base_url = resolve_base_url(host.as_deref(), port, options.ssl)
            .ok_or(PepperError::UnresolvableBaseUrl)?;

        parse_ident(&options.ident).map_err(|_| PepperError::InvalidIdent(options.ident.clone()))?;

        let uamservice = match options.uamservice {
            Some(raw) => Some(validate_uamservice(raw, warnings.as_ref())?),
            None => None,
        };

        debug!(base_url = %base_url, "computed gateway JSON API base url");

        Ok(Self {
            base_url,
            ident: options.ident,
            uamservice,
            interval: options
                .interval_ms
                .filter(|interval| *interval > 0)
                .map(Duration::from_millis),
            timeout: Duration::from_millis(options.timeout_ms),
            redirect_params,
            status: GatewayStatus::default(),
            transport,
            clock,
            schedule: None,
        })
    }

    /// Gateway JSON API root, e.g. `http://10.1.0.1:3990/json/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured CHAP identifier.
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Configured delegation service, if any.
    pub fn uamservice(&self) -> Option<&str> {
        self.uamservice.as_deref()
    }

    /// Configured auto-refresh interval.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Parameters extracted from the redirect query string.
    pub fn redirect_params(&self) -> &RedirectParams {
        &self.redirect_params
    }

    /// Session as last reported by the gateway.
    pub fn status(&self) -> &GatewayStatus {
        &self.status
    }

    /// Client state as last reported by the gateway.
    pub fn client_state(&self) -> ClientState {
        self.status.client_state
    }

    /// Returns `true` while an auto-refresh timer is armed.
    pub fn is_auto_refresh_armed(&self) -> bool {
        self.schedule.is_some()
    }

    /// Armed auto-refresh schedule, if any.
    pub fn refresh_schedule(&self) -> Option<&RefreshSchedule> {
        self.schedule.as_ref()
    }

    /// Fetches `status` and replaces the cached session with it.
    ///
    /// # Errors
    /// Transport and decoding failures are returned and leave the cache as is.
    pub fn refresh(&mut self) -> Result<GatewayStatus, PepperError> {
        let status = self.call_gateway(GatewayEndpoint::Status, QueryParams::None)?;
        self.status = status.clone();
        Ok(status)
    }

    /// Authenticates `username` with the gateway.
    ///
    /// # Steps
    /// 1. `status` call for a fresh challenge.
    /// 2. Credential derivation: local CHAP, delegated CHAP, or PAP.
    /// 3. `logon` call; an `AUTH` answer arms auto-refresh.
    ///
    /// # Errors
    /// - Validation: [`PepperError::EmptyCredential`],
    ///   [`PepperError::UnsupportedProtocol`], [`PepperError::AlreadyAuthenticated`],
    ///   all returned without touching the transport.
    /// - Protocol: [`PepperError::NoChallenge`],
    ///   [`PepperError::GatewayReportsAuthenticated`],
    ///   [`PepperError::InvalidUamServiceResponse`], [`PepperError::Chap`],
    ///   [`PepperError::InvalidGatewayResponse`].
    /// - Transport errors from any of the calls.
    pub fn logon(
        &mut self,
        username: &str,
        password: &str,
        options: &LogonOptions,
    ) -> Result<GatewayStatus, PepperError> {
        if username.is_empty() {
            return Err(PepperError::EmptyCredential(CredentialField::Username));
        }
        if password.is_empty() {
            return Err(PepperError::EmptyCredential(CredentialField::Password));
        }
        let protocol = options.resolve_protocol()?;

        if self.status.is_authenticated() {
            return Err(PepperError::AlreadyAuthenticated(self.status.client_state));
        }

        debug!(%protocol, delegated = self.uamservice.is_some(), "starting logon");

        let status = self.call_gateway(GatewayEndpoint::Status, QueryParams::None)?;
        let challenge = status
            .usable_challenge()
            .map(str::to_string)
            .ok_or(PepperError::NoChallenge)?;
        if status.is_authenticated() {
            return Err(PepperError::GatewayReportsAuthenticated(status.client_state));
        }
        self.status = status;

        let (field, credential) = match (protocol, self.uamservice.as_deref()) {
            (AuthProtocol::Chap, Some(service)) => (
                "response",
                self.delegate_chap(service, username, password, &challenge)?,
            ),
            (AuthProtocol::Chap, None) => {
                let response = chap(&self.ident, password, &challenge)?;
                debug!("computed chap response locally");
                ("response", response)
            }
            (AuthProtocol::Pap, _) => ("password", password.to_string()),
        };

        let query = QueryParams::pairs([("username", username), (field, credential.as_str())]);
        let status = self.call_gateway(GatewayEndpoint::Logon, query)?;
        self.status = status.clone();

        if status.is_authenticated() {
            info!(state = %status.client_state, "logon accepted");
            self.start_auto_refresh(None);
        } else {
            info!(state = %status.client_state, "logon not accepted by gateway");
        }

        Ok(status)
    }

    /// Stops auto-refresh, then ends the session on the gateway.
    ///
    /// # Errors
    /// Transport and decoding failures are returned; auto-refresh stays off.
    pub fn logoff(&mut self) -> Result<GatewayStatus, PepperError> {
        self.stop_auto_refresh();

        let status = self.call_gateway(GatewayEndpoint::Logoff, QueryParams::None)?;
        self.status = status.clone();
        info!(state = %status.client_state, "logoff completed");
        Ok(status)
    }

    /// Arms the auto-refresh timer, replacing any armed one.
    ///
    /// # Returns
    /// `false` (and no change) when neither `interval_override` nor a
    /// configured interval is available.
    pub fn start_auto_refresh(&mut self, interval_override: Option<Duration>) -> bool {
        let Some(interval) = interval_override
            .filter(|interval| !interval.is_zero())
            .or(self.interval)
        else {
            return false;
        };

        let schedule = RefreshSchedule::arm(self.clock.now_ms(), interval);
        debug!(
            interval_ms = schedule.interval_ms(),
            next_due_ms = schedule.next_due_ms(),
            "auto-refresh armed"
        );
        self.schedule = Some(schedule);
        true
    }

    /// Disarms the auto-refresh timer. Safe to call when nothing is armed.
    pub fn stop_auto_refresh(&mut self) {
        if self.schedule.take().is_some() {
            debug!("auto-refresh stopped");
        }
    }

    /// Fires a due auto-refresh.
    ///
    /// # Returns
    /// `None` when no timer is armed or the deadline has not passed; otherwise
    /// the refresh outcome. Failures are also logged at `warn` level and do
    /// not disarm the timer.
    pub fn on_tick(&mut self) -> Option<Result<GatewayStatus, PepperError>> {
        let now_ms = self.clock.now_ms();
        let schedule = self.schedule.as_mut()?;
        if !schedule.fire_if_due(now_ms) {
            return None;
        }

        let outcome = self.refresh();
        if let Err(error) = &outcome {
            warn!(%error, "auto-refresh failed");
        }
        Some(outcome)
    }

    fn call_gateway(
        &self,
        endpoint: GatewayEndpoint,
        query: QueryParams,
    ) -> Result<GatewayStatus, PepperError> {
        let uri = endpoint.uri(&self.base_url);
        let request = TransportRequest {
            uri: &uri,
            query: &query,
            timeout: self.timeout,
        };
        debug!(target_uri = %redact_uri(&request.target()), "calling gateway");

        let body = self.transport.call(&request)?;
        GatewayStatus::from_value(body)
            .map_err(|error| PepperError::InvalidGatewayResponse(error.to_string()))
    }

    fn delegate_chap(
        &self,
        service: &str,
        username: &str,
        password: &str,
        challenge: &str,
    ) -> Result<String, PepperError> {
        let userurl = self
            .redirect_params
            .get("userurl")
            .map(String::as_str)
            .unwrap_or_default();
        let uri = merge_query(
            service,
            [
                ("username", username),
                ("password", password),
                ("challenge", challenge),
                ("userurl", userurl),
            ],
        )
        .map_err(|error| PepperError::InvalidUamService(error.to_string()))?;

        let request = TransportRequest {
            uri: &uri,
            query: &QueryParams::None,
            timeout: self.timeout,
        };
        debug!(target_uri = %redact_uri(&uri), "delegating chap to uamservice");

        let body = self.transport.call(&request)?;
        let response = body
            .get(UAMSERVICE_CHAP_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|response| !response.is_empty())
            .ok_or_else(|| {
                PepperError::InvalidUamServiceResponse(format!(
                    "missing '{UAMSERVICE_CHAP_FIELD}' string field"
                ))
            })?;

        if !response.chars().all(|character| character.is_ascii_hexdigit()) {
            return Err(PepperError::InvalidUamServiceResponse(format!(
                "'{UAMSERVICE_CHAP_FIELD}' field is not hex"
            )));
        }

        Ok(response.to_string())
    }
}

impl fmt::Debug for Pepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pepper")
            .field("base_url", &self.base_url)
            .field("ident", &self.ident)
            .field("uamservice", &self.uamservice)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("client_state", &self.status.client_state)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

fn validate_uamservice(
    raw: String,
    warnings: &dyn SecurityWarningSink,
) -> Result<String, PepperError> {
    let parsed = Url::parse(&raw)
        .map_err(|error| PepperError::InvalidUamService(format!("{raw}: {error}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" => warnings.warn(&format!(
            "uamservice {} is not https; passwords will be sent in cleartext",
            redact_uri(&raw)
        )),
        other => {
            return Err(PepperError::InvalidUamService(format!(
                "unsupported scheme '{other}'"
            )));
        }
    }

    Ok(raw)
}

/// Errors produced by the session driver.
#[derive(Debug, Error)]
pub enum PepperError {
    /// No host could be resolved for the gateway JSON API.
    #[error("cannot determine gateway JSON API base url")]
    UnresolvableBaseUrl,
    /// CHAP identifier is not one hex byte.
    #[error("invalid ident '{0}': expected one hex byte")]
    InvalidIdent(String),
    /// Delegation service reference is unusable.
    #[error("invalid uamservice: {0}")]
    InvalidUamService(String),
    /// Username or password is empty.
    #[error("{0} must be a non-empty string")]
    EmptyCredential(CredentialField),
    /// Requested protocol is not `pap` or `chap`.
    #[error("unsupported authentication protocol '{0}'")]
    UnsupportedProtocol(String),
    /// Cached state already reports an authenticated client.
    #[error("current clientState is already {0}")]
    AlreadyAuthenticated(ClientState),
    /// Gateway reported an authenticated client in the middle of a logon.
    #[error("gateway clientState is already {0}")]
    GatewayReportsAuthenticated(ClientState),
    /// `status` response carried no challenge.
    #[error("cannot find a challenge in gateway status")]
    NoChallenge,
    /// Delegation service reply lacks a usable `chap` field.
    #[error("invalid uamservice response: {0}")]
    InvalidUamServiceResponse(String),
    /// Gateway reply could not be decoded.
    #[error("invalid gateway response: {0}")]
    InvalidGatewayResponse(String),
    /// CHAP computation rejected the gateway challenge.
    #[error("chap computation failed: {0}")]
    Chap(#[from] ChapError),
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PepperError {
    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnresolvableBaseUrl | Self::InvalidIdent(_) | Self::InvalidUamService(_) => {
                ErrorKind::Configuration
            }
            Self::EmptyCredential(_)
            | Self::UnsupportedProtocol(_)
            | Self::AlreadyAuthenticated(_) => ErrorKind::Validation,
            Self::GatewayReportsAuthenticated(_)
            | Self::NoChallenge
            | Self::InvalidUamServiceResponse(_)
            | Self::InvalidGatewayResponse(_)
            | Self::Chap(_) => ErrorKind::Protocol,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}
