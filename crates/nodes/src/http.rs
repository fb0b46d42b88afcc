//! Outbound HTTP: the request value nodes build and the transport that sends it.
//!
//! `ReqwestTransport` is the concrete transport used outside a host (the CLI).
//! It performs exactly one request per call and never retries.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::HostError;

/// HTTP verbs used by nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// A fully-resolved outbound request.
///
/// `query` and `body` are `None` when they should not be sent at all.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Option<Map<String, Value>>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: None,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header, replacing any existing value with the same (case-insensitive) name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Single-shot JSON transport.
///
/// Implementations must map a non-2xx answer to [`HostError::Status`] and a
/// failure to get any answer to [`HostError::Transport`]. An empty body
/// decodes to `Value::Null`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<Value, HostError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, HostError> {
        let client = Client::builder()
            .user_agent(concat!("chainstream-nodes/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value, HostError> {
        debug!("{} {}", request.method.as_str(), request.url);

        let mut builder = self
            .client
            .request(request.method.into(), &request.url);
        if let Some(query) = &request.query {
            let pairs: Vec<(&str, String)> = query
                .iter()
                .map(|(k, v)| (k.as_str(), scalar_to_string(v)))
                .collect();
            builder = builder.query(&pairs);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| HostError::Decode(e.to_string()))
    }
}

/// Render a query value the way it appears on the wire.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
