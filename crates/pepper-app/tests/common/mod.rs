//! Shared fixtures for app integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pepper_auth::{
    GatewayTransport, ManualClock, Pepper, PepperOptions, TracingWarningSink, TransportError,
    TransportRequest,
};
use serde_json::{Value, json};

/// Gateway answering every route from one fixed table, counting status calls.
#[derive(Debug, Default)]
pub struct FixedGateway {
    status_failures: Mutex<u32>,
    routes: Mutex<Vec<String>>,
}

impl FixedGateway {
    /// Makes the next `count` status calls fail with a timeout.
    pub fn fail_next_status(&self, count: u32) {
        *self.status_failures.lock().expect("failures lock should work") = count;
    }

    /// Route sequence seen so far.
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().expect("routes lock should work").clone()
    }
}

impl GatewayTransport for FixedGateway {
    fn call(&self, request: &TransportRequest<'_>) -> Result<Value, TransportError> {
        let route = request.uri.rsplit('/').next().unwrap_or_default().to_string();
        self.routes
            .lock()
            .expect("routes lock should work")
            .push(route.clone());

        match route.as_str() {
            "status" => {
                let mut failures = self.status_failures.lock().expect("failures lock should work");
                if *failures > 0 {
                    *failures -= 1;
                    return Err(TransportError::Timeout(request.timeout.as_millis() as u64));
                }
                Ok(json!({
                    "version": "1.0",
                    "clientState": 1,
                    "session": { "sessionid": "54b7c4b200000004", "userName": "test" },
                    "accounting": { "sessionTime": 1, "inputOctets": 1234, "outputOctets": 234 }
                }))
            }
            "logoff" => Ok(json!({
                "version": "1.0",
                "clientState": 0,
                "challenge": "8561b644a9c14dbcdea738991cd4a0c9"
            })),
            other => Err(TransportError::Network(format!("unexpected route {other}"))),
        }
    }
}

/// Driver over a [`FixedGateway`] with a manual clock at t=0.
pub fn driver(interval_ms: Option<u64>) -> (Pepper, Arc<FixedGateway>, Arc<ManualClock>) {
    let gateway = Arc::new(FixedGateway::default());
    let clock = Arc::new(ManualClock::new(0));
    let options = PepperOptions {
        host: Some("10.1.0.1".to_string()),
        port: Some(3990),
        interval_ms,
        ..PepperOptions::default()
    };
    let pepper = Pepper::with_collaborators(
        options,
        gateway.clone(),
        clock.clone(),
        Arc::new(TracingWarningSink),
    )
    .expect("driver should build");
    (pepper, gateway, clock)
}
