//! Shared fixtures for session driver integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pepper_auth::{
    GatewayTransport, ManualClock, Pepper, PepperOptions, SecurityWarningSink, TransportError,
    TransportRequest,
};
use pepper_core::QueryParams;
use serde_json::{Value, json};

/// Challenge served by the fake gateway's first `status` answer.
pub const CHALLENGE: &str = "f3a2c156428029ae0f18da67cff02bbc";

/// Challenge served after a logoff.
pub const NEXT_CHALLENGE: &str = "8561b644a9c14dbcdea738991cd4a0c9";

/// One call observed by [`ScriptedGateway`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Last path segment of the URI (`status`, `logon`, ...).
    pub route: String,
    /// URI as handed to the transport.
    pub uri: String,
    /// Query parameters as handed to the transport.
    pub query: QueryParams,
    /// Full request target.
    pub target: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl RecordedCall {
    /// Looks up a query value, checking both `query` pairs and the URI query.
    pub fn param(&self, key: &str) -> Option<String> {
        if let Some(value) = self.query.get(key) {
            return Some(value.to_string());
        }
        let (_, raw) = self.uri.split_once('?')?;
        url::form_urlencoded::parse(raw.as_bytes())
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.into_owned())
    }
}

/// In-memory gateway that answers per route from scripted queues.
///
/// The last scripted answer for a route is sticky and repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    routes: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues one answer for `route`.
    pub fn respond(&self, route: &str, answer: Result<Value, TransportError>) -> &Self {
        self.routes
            .lock()
            .expect("routes lock should work")
            .entry(route.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    /// Drops any queued answers for `route` and scripts `answer` instead.
    pub fn reset(&self, route: &str, answer: Result<Value, TransportError>) -> &Self {
        self.routes
            .lock()
            .expect("routes lock should work")
            .insert(route.to_string(), VecDeque::from([answer]));
        self
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock should work").clone()
    }

    /// Calls seen for one route.
    pub fn calls_to(&self, route: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.route == route)
            .collect()
    }

    /// Route sequence, e.g. `["status", "logon"]`.
    pub fn routes_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.route).collect()
    }
}

impl GatewayTransport for ScriptedGateway {
    fn call(&self, request: &TransportRequest<'_>) -> Result<Value, TransportError> {
        let path = request.uri.split('?').next().unwrap_or_default();
        let route = path.rsplit('/').next().unwrap_or_default().to_string();

        self.calls
            .lock()
            .expect("calls lock should work")
            .push(RecordedCall {
                route: route.clone(),
                uri: request.uri.to_string(),
                query: request.query.clone(),
                target: request.target(),
                timeout: request.timeout,
            });

        let mut routes = self.routes.lock().expect("routes lock should work");
        let Some(queue) = routes.get_mut(&route) else {
            return Err(TransportError::Network(format!("no route scripted for {route}")));
        };
        if queue.len() > 1 {
            return queue.pop_front().expect("queue is non-empty");
        }
        queue
            .front()
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Network(format!("{route} exhausted"))))
    }
}

/// Warning sink that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingWarnings {
    messages: Mutex<Vec<String>>,
}

impl RecordingWarnings {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("warnings lock should work").clone()
    }
}

impl SecurityWarningSink for RecordingWarnings {
    fn warn(&self, message: &str) {
        self.messages
            .lock()
            .expect("warnings lock should work")
            .push(message.to_string());
    }
}

/// `status` answer for an unauthenticated client.
pub fn status_not_auth(challenge: &str) -> Value {
    json!({
        "version": "1.0",
        "clientState": 0,
        "challenge": challenge,
        "location": { "name": "My HotSpot" },
        "redir": {
            "originalURL": "http:///",
            "redirectionURL": "",
            "logoutURL": "http://10.137.220.129:3990/logoff",
            "ipAddress": "10.137.220.131",
            "macAddress": "C8-E0-EB-16-89-87"
        }
    })
}

/// `logon` / `status` answer for an authenticated client.
pub fn status_auth() -> Value {
    json!({
        "version": "1.0",
        "clientState": 1,
        "session": {
            "sessionid": "54b7c4b200000004",
            "userName": "test",
            "startTime": 1421940977,
            "terminateTime": 0,
            "idleTimeout": 300
        },
        "accounting": {
            "sessionTime": 1,
            "idleTime": 0,
            "inputOctets": 1234,
            "outputOctets": 234,
            "inputGigawords": 0,
            "outputGigawords": 0,
            "viewPoint": "client"
        }
    })
}

/// `logoff` answer.
pub fn status_logged_off() -> Value {
    json!({
        "version": "1.0",
        "clientState": 0,
        "challenge": NEXT_CHALLENGE,
        "session": {
            "sessionid": "54b7c4b200000004",
            "userName": "test",
            "startTime": 1421940977,
            "terminateTime": 0,
            "idleTimeout": 0
        }
    })
}

/// Options pointing at the local fake gateway.
pub fn local_options() -> PepperOptions {
    PepperOptions {
        host: Some("localhost".to_string()),
        port: Some(5000),
        ..PepperOptions::default()
    }
}

/// Local options with an auto-refresh interval.
pub fn local_options_with_interval(interval_ms: u64) -> PepperOptions {
    PepperOptions {
        interval_ms: Some(interval_ms),
        ..local_options()
    }
}

/// Gateway scripted for one successful CHAP logon.
pub fn gateway_accepting_logon() -> Arc<ScriptedGateway> {
    let gateway = ScriptedGateway::new();
    gateway
        .respond("status", Ok(status_not_auth(CHALLENGE)))
        .respond("logon", Ok(status_auth()))
        .respond("logoff", Ok(status_logged_off()));
    gateway
}

/// Builds a driver over `gateway` with a manual clock at t=0.
pub fn driver(
    gateway: &Arc<ScriptedGateway>,
    options: PepperOptions,
) -> (Pepper, Arc<ManualClock>, Arc<RecordingWarnings>) {
    let clock = Arc::new(ManualClock::new(0));
    let warnings = Arc::new(RecordingWarnings::default());
    let pepper = Pepper::with_collaborators(
        options,
        gateway.clone(),
        clock.clone(),
        warnings.clone(),
    )
    .expect("driver should build");
    (pepper, clock, warnings)
}
