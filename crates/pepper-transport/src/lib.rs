#![warn(missing_docs)]
//! # pepper-transport
//!
//! ## Purpose
//! Server-side HTTP implementation of [`pepper_auth::GatewayTransport`].
//!
//! ## Responsibilities
//! - Issue GET requests with a per-call timeout.
//! - Map timeouts, connection failures, and non-2xx answers onto
//!   [`TransportError`].
//! - Decode bodies by content type, including JSONP envelopes produced by
//!   gateways that only speak the browser callback protocol.
//!
//! ## Data flow
//! [`pepper_auth::Pepper`] builds a [`TransportRequest`] -> [`HttpTransport`]
//! sends it -> [`parse_body`] -> JSON object handed back to the driver.
//!
//! ## Error model
//! Every failure is a [`TransportError`]; nothing is retried here.
//!
//! ## Security and privacy notes
//! Request targets are logged only after [`pepper_core::redact_uri`].

use std::time::Duration;

use pepper_auth::{GatewayTransport, TransportError, TransportRequest};
use pepper_core::redact_uri;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

/// `Accept` header sent with every call.
pub const ACCEPT_JSON: &str = "application/json, text/javascript;q=0.9";

/// User agent sent with every call.
pub const USER_AGENT: &str = concat!("pepper/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    ///
    /// # Errors
    /// Returns [`TransportError::Network`] when the TLS backend cannot start.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| TransportError::Network(format!("http client init failed: {error}")))?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl GatewayTransport for HttpTransport {
    fn call(&self, request: &TransportRequest<'_>) -> Result<Value, TransportError> {
        let target = request.target();
        debug!(
            target_uri = %redact_uri(&target),
            timeout_ms = duration_to_ms(request.timeout),
            "GET"
        );

        let response = self
            .client
            .get(&target)
            .header(ACCEPT, ACCEPT_JSON)
            .timeout(request.timeout)
            .send()
            .map_err(|error| classify(&error, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .map_err(|error| classify(&error, request.timeout))?;

        parse_body(content_type.as_deref(), &body)
    }
}

/// Decodes a response body according to its `Content-Type`.
///
/// # Semantics
/// - `application/json` and `*+json`: JSON.
/// - `*javascript`: JSONP envelope unwrapped, then JSON.
/// - absent: JSON.
/// - anything else: rejected.
///
/// # Errors
/// Returns [`TransportError::MalformedBody`] for other content types,
/// unparsable JSON, or JSON that is not an object.
pub fn parse_body(content_type: Option<&str>, body: &str) -> Result<Value, TransportError> {
    let media_type = content_type
        .and_then(|raw| raw.split(';').next())
        .map(|media| media.trim().to_ascii_lowercase())
        .filter(|media| !media.is_empty());

    let json = match media_type.as_deref() {
        None => body.trim(),
        Some(media) if media.ends_with("/json") || media.ends_with("+json") => body.trim(),
        Some(media) if media.ends_with("javascript") => strip_jsonp(body).unwrap_or(body.trim()),
        Some(media) => {
            return Err(TransportError::MalformedBody(format!(
                "unexpected content type '{media}'"
            )));
        }
    };

    let value: Value = serde_json::from_str(json)
        .map_err(|error| TransportError::MalformedBody(format!("invalid json: {error}")))?;
    if !value.is_object() {
        return Err(TransportError::MalformedBody(
            "json body is not an object".to_string(),
        ));
    }
    Ok(value)
}

/// Returns the argument of a JSONP `callback(...)` envelope.
///
/// Accepts the guarded form `/**/ typeof cb === 'function' && cb({...});`.
pub fn strip_jsonp(body: &str) -> Option<&str> {
    let start = body.find('(')?;
    let end = body.rfind(')')?;
    if end <= start {
        return None;
    }

    let inner = body[start + 1..end].trim();
    inner.starts_with('{').then_some(inner)
}

fn classify(error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(duration_to_ms(timeout))
    } else {
        TransportError::Network(error.to_string())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    //! Unit tests for body decoding.

    use super::*;

    #[test]
    fn parses_json_with_charset_parameter() {
        let value = parse_body(Some("application/json; charset=utf-8"), r#"{"clientState":0}"#)
            .expect("json should parse");
        assert_eq!(value["clientState"], 0);
    }

    #[test]
    fn unwraps_express_style_jsonp() {
        let body = r#"/**/ typeof cb === 'function' && cb({"clientState":1,"version":"1.0"});"#;
        let value = parse_body(Some("text/javascript; charset=utf-8"), body)
            .expect("jsonp should parse");
        assert_eq!(value["clientState"], 1);

        assert_eq!(strip_jsonp("cb({\"a\":1})"), Some("{\"a\":1}"));
        assert_eq!(strip_jsonp("no envelope"), None);
    }

    #[test]
    fn absent_content_type_is_tried_as_json() {
        let value = parse_body(None, r#" {"clientState":0} "#).expect("json should parse");
        assert_eq!(value["clientState"], 0);
        assert!(matches!(parse_body(Some(""), "{}"), Ok(Value::Object(_))));
    }

    #[test]
    fn timeout_millis_saturate() {
        assert_eq!(duration_to_ms(Duration::from_millis(200)), 200);
        assert_eq!(duration_to_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn rejects_html_and_non_objects() {
        assert!(matches!(
            parse_body(Some("text/html"), "<html></html>"),
            Err(TransportError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_body(None, "[1,2,3]"),
            Err(TransportError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_body(Some("application/json"), "{broken"),
            Err(TransportError::MalformedBody(_))
        ));
    }
}
