#![warn(missing_docs)]
//! # pepper-core
//!
//! ## Purpose
//! Defines the pure data model and URL helpers shared across the `pepper`
//! workspace.
//!
//! ## Responsibilities
//! - Model the gateway-reported [`ClientState`] and session record
//!   ([`GatewayStatus`]).
//! - Extract gateway parameters from the captive-portal redirect query string.
//! - Resolve the gateway JSON API root from host/port/ssl settings.
//! - Serialize query parameters for transports and redact secrets from URIs
//!   before they reach logs.
//!
//! ## Data flow
//! Redirect query string -> [`extract_redirect_params`] -> host/port hints ->
//! [`resolve_base_url`] -> session driver issues [`GatewayEndpoint`] calls and
//! stores each decoded [`GatewayStatus`] wholesale.
//!
//! ## Ownership and lifetimes
//! Every decoded value owns its strings and JSON sub-trees so a session record
//! can be replaced in one assignment without borrowing transport buffers.
//!
//! ## Error model
//! Malformed gateway payloads and unparsable URLs return [`CoreError`]. Query
//! extraction never fails; bad input yields an empty map.
//!
//! ## Security and privacy notes
//! Session and accounting sub-records are opaque pass-through data. Use
//! [`redact_uri`] before logging any URI that may carry credentials.
//!
//! ## Example
//! ```rust
//! use pepper_core::{ClientState, resolve_base_url};
//!
//! let base = resolve_base_url(Some("10.1.0.1"), Some(3990), false);
//! assert_eq!(base.as_deref(), Some("http://10.1.0.1:3990/json/"));
//! assert_eq!(ClientState::from(1), ClientState::Auth);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;
use url::form_urlencoded;

/// Path segment appended to the gateway origin to reach the JSON interface.
pub const JSON_API_PATH: &str = "/json/";

/// Redirect query key that wraps the gateway's own parameters.
pub const LOGIN_URL_KEY: &str = "loginurl";

/// Query keys whose values are replaced by [`redact_uri`].
pub const SENSITIVE_QUERY_KEYS: [&str; 3] = ["password", "response", "chap"];

/// Flat gateway parameter map extracted from the redirect query string.
pub type RedirectParams = BTreeMap<String, String>;

/// Authentication phase reported by the gateway for the current client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ClientState {
    /// State has not been reported yet, or the code is not recognized.
    #[default]
    Unknown,
    /// Client is not authenticated.
    NotAuth,
    /// Client is authenticated and has network access.
    Auth,
    /// Authentication was submitted and awaits a verdict.
    AuthPending,
    /// Client is authenticated but must see a splash page first.
    AuthSplash,
}

impl ClientState {
    /// Returns the integer code used on the wire.
    pub fn code(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::NotAuth => 0,
            Self::Auth => 1,
            Self::AuthPending => 2,
            Self::AuthSplash => 3,
        }
    }

    /// Returns the canonical upper-case name (`AUTH`, `NOT_AUTH`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotAuth => "NOT_AUTH",
            Self::Auth => "AUTH",
            Self::AuthPending => "AUTH_PENDING",
            Self::AuthSplash => "AUTH_SPLASH",
        }
    }
}

impl From<i64> for ClientState {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::NotAuth,
            1 => Self::Auth,
            2 => Self::AuthPending,
            3 => Self::AuthSplash,
            _ => Self::Unknown,
        }
    }
}

impl From<ClientState> for i64 {
    fn from(state: ClientState) -> Self {
        state.code()
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Session record as last reported by the gateway.
///
/// Only `clientState` and `challenge` are interpreted; everything else is kept
/// verbatim so callers see exactly what the gateway sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatus {
    /// Gateway JSON interface version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Current authentication phase.
    #[serde(rename = "clientState", default)]
    pub client_state: ClientState,
    /// Hex challenge, present while the client is not authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    /// Opaque session sub-record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
    /// Opaque accounting sub-record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounting: Option<Value>,
    /// Any other fields (`location`, `redir`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GatewayStatus {
    /// Decodes a gateway JSON response.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidStatus`] when the value is not an object or
    /// a known field has the wrong type.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        if !value.is_object() {
            return Err(CoreError::InvalidStatus(
                "gateway response is not a JSON object".to_string(),
            ));
        }

        serde_json::from_value(value).map_err(|error| CoreError::InvalidStatus(error.to_string()))
    }

    /// Returns the challenge when it is present and non-empty.
    pub fn usable_challenge(&self) -> Option<&str> {
        self.challenge
            .as_deref()
            .map(str::trim)
            .filter(|challenge| !challenge.is_empty())
    }

    /// Returns `true` when the gateway reports an authenticated client.
    pub fn is_authenticated(&self) -> bool {
        self.client_state == ClientState::Auth
    }
}

/// Endpoints exposed by the gateway JSON interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEndpoint {
    /// Current session state and challenge.
    Status,
    /// Credential submission.
    Logon,
    /// Session termination.
    Logoff,
}

impl GatewayEndpoint {
    /// Path segment relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Logon => "logon",
            Self::Logoff => "logoff",
        }
    }

    /// Joins the endpoint onto a base URL produced by [`resolve_base_url`].
    pub fn uri(self, base_url: &str) -> String {
        format!("{base_url}{}", self.path())
    }
}

/// Query parameters attached to one transport call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryParams {
    /// No query string at all.
    #[default]
    None,
    /// Pre-serialized query string, used verbatim.
    Raw(String),
    /// Key/value pairs serialized with form encoding, in order.
    Pairs(Vec<(String, String)>),
}

impl QueryParams {
    /// Builds ordered pairs from borrowed keys and values.
    pub fn pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::Pairs(
            pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    /// Serializes into a query string, or `None` when there is nothing to send.
    pub fn serialize(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Raw(raw) => Some(raw.clone()),
            Self::Pairs(pairs) => {
                let mut serializer = form_urlencoded::Serializer::new(String::new());
                for (key, value) in pairs {
                    serializer.append_pair(key, value);
                }
                Some(serializer.finish())
            }
        }
    }

    /// Looks up the first value stored under `key` in a `Pairs` query.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Self::Pairs(pairs) => pairs
                .iter()
                .find(|(candidate, _)| candidate == key)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }
}

/// Appends serialized query parameters to `uri`.
///
/// # Semantics
/// - `QueryParams::None` leaves the URI untouched.
/// - Otherwise the query is joined with `?`, or with `&` when the URI already
///   carries a query string.
pub fn append_query(uri: &str, query: &QueryParams) -> String {
    let Some(serialized) = query.serialize() else {
        return uri.to_string();
    };

    let separator = match uri.find('?') {
        None => "?",
        Some(_) if uri.ends_with('?') || uri.ends_with('&') => "",
        Some(_) => "&",
    };

    format!("{uri}{separator}{serialized}")
}

/// Merges `pairs` into the query of an absolute URL, keeping existing pairs.
///
/// # Errors
/// Returns [`CoreError::InvalidUrl`] when `base` is not an absolute URL.
pub fn merge_query<'a>(
    base: &str,
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<String, CoreError> {
    let mut url = Url::parse(base).map_err(|error| CoreError::InvalidUrl(format!("{base}: {error}")))?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.into())
}

/// Extracts gateway parameters from a captive-portal redirect query string.
///
/// The gateway nests its parameters inside a URL-encoded `loginurl` value.
/// A leading `?` is ignored. When the decoded `loginurl` is a full URL, only
/// the part after its first `?` is parsed.
///
/// # Returns
/// An empty map when the input is absent, empty, or has no `loginurl` key.
pub fn extract_redirect_params(query: Option<&str>) -> RedirectParams {
    let Some(query) = query else {
        return RedirectParams::new();
    };
    let query = query.strip_prefix('?').unwrap_or(query);
    if query.is_empty() {
        return RedirectParams::new();
    }

    let Some(login_url) = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == LOGIN_URL_KEY)
        .map(|(_, value)| value.into_owned())
    else {
        return RedirectParams::new();
    };

    let nested = match login_url.split_once('?') {
        Some((_, nested)) => nested,
        None => login_url.as_str(),
    };

    let mut params = RedirectParams::new();
    for (key, value) in form_urlencoded::parse(nested.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Resolves the gateway JSON API root.
///
/// # Semantics
/// - Produces `{scheme}://{host}[:{port}]/json/`.
/// - With `ssl == true` the port is always omitted.
/// - A port of `0` is treated as absent.
///
/// # Returns
/// `None` when `host` is absent or blank; callers must treat that as a fatal
/// configuration error.
pub fn resolve_base_url(host: Option<&str>, port: Option<u16>, ssl: bool) -> Option<String> {
    let host = host.map(str::trim).filter(|host| !host.is_empty())?;
    let scheme = if ssl { "https" } else { "http" };

    match port.filter(|port| !ssl && *port != 0) {
        Some(port) => Some(format!("{scheme}://{host}:{port}{JSON_API_PATH}")),
        None => Some(format!("{scheme}://{host}{JSON_API_PATH}")),
    }
}

/// Replaces credential-bearing query values with `<redacted>`.
///
/// Works on any string; the part before the first `?` is kept as-is.
pub fn redact_uri(uri: &str) -> String {
    let Some((prefix, query)) = uri.split_once('?') else {
        return uri.to_string();
    };

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let sensitive = SENSITIVE_QUERY_KEYS
            .iter()
            .any(|candidate| key.eq_ignore_ascii_case(candidate));
        if sensitive {
            serializer.append_pair(&key, "<redacted>");
        } else {
            serializer.append_pair(&key, &value);
        }
    }

    format!("{prefix}?{}", serializer.finish())
}

/// Error type for core model decoding and URL handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Gateway payload could not be decoded into [`GatewayStatus`].
    #[error("invalid gateway status: {0}")]
    InvalidStatus(String),
    /// A URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
