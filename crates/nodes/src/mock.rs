//! `MockTransport` — a test double for `HttpTransport`.
//!
//! Useful in unit and integration tests where a real upstream is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::http::{HttpRequest, HttpTransport};
use crate::HostError;

type Handler = dyn Fn(&HttpRequest) -> Result<Value, HostError> + Send + Sync;

/// Behaviour injected into `MockTransport` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value for every request.
    ReturnValue(Value),
    /// Fail every request with the given error.
    Fail(HostError),
    /// Compute the answer from the request.
    Handler(Box<Handler>),
}

/// A mock transport that records every request it receives and answers
/// with a programmer-specified result.
pub struct MockTransport {
    /// What the transport will do when `send` is called.
    pub behaviour: MockBehaviour,
    /// All requests seen by this transport (in call order).
    pub calls: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(value: Value) -> Self {
        Self::from_behaviour(MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: HostError) -> Self {
        Self::from_behaviour(MockBehaviour::Fail(error))
    }

    /// Create a mock that routes each request through `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self::from_behaviour(MockBehaviour::Handler(Box::new(handler)))
    }

    fn from_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of requests this transport has received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Copy of every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value, HostError> {
        self.calls.lock().unwrap().push(request.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::Fail(err) => Err(err.clone()),
            MockBehaviour::Handler(handler) => handler(&request),
        }
    }
}
