//! Tests for `ExecutionContext::http_request_with_authentication`.
//!
//! A toy credential type stands in for a real one; `MockTransport` plays
//! both the token endpoint and the API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::memory::{MemoryCredentials, MemoryParameters, MemoryStaticData};
use crate::mock::MockTransport;
use crate::{
    CredentialData, CredentialType, ExecutionContext, HostError, HttpMethod, HttpRequest,
    HttpTransport,
};

/// Issues `token-1`, `token-2`, … on each pre-authentication.
struct CountingToken {
    issued: AtomicUsize,
}

#[async_trait]
impl CredentialType for CountingToken {
    fn name(&self) -> &'static str {
        "toy"
    }

    fn is_expired(&self, data: &CredentialData) -> bool {
        data.get("token").and_then(Value::as_str).unwrap_or("").is_empty()
    }

    async fn pre_authenticate(
        &self,
        _http: &dyn HttpTransport,
        _data: &CredentialData,
    ) -> Result<CredentialData, HostError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let mut out = CredentialData::new();
        out.insert("token".into(), json!(format!("token-{n}")));
        Ok(out)
    }

    fn authenticate(&self, data: &CredentialData, request: &mut HttpRequest) {
        let token = data.get("token").and_then(Value::as_str).unwrap_or("");
        request.set_header("Authorization", format!("Bearer {token}"));
    }
}

fn ctx_with(transport: Arc<MockTransport>, creds: Arc<MemoryCredentials>) -> ExecutionContext {
    ExecutionContext::new(
        "Toy",
        Arc::new(MemoryParameters::new()),
        creds,
        transport,
        Arc::new(MemoryStaticData::new()),
    )
}

fn credential(token: &str) -> CredentialData {
    let mut data = CredentialData::new();
    data.insert("token".into(), json!(token));
    data
}

#[tokio::test]
async fn expired_credential_is_refreshed_and_written_back() {
    let transport = Arc::new(MockTransport::returning(json!({ "ok": true })));
    let creds = Arc::new(MemoryCredentials::new().with("toy", credential("")));
    let ctx = ctx_with(transport.clone(), creds.clone());
    let kind = CountingToken { issued: AtomicUsize::new(0) };

    let out = ctx
        .http_request_with_authentication(&kind, HttpRequest::new(HttpMethod::Get, "https://api.test/x"))
        .await
        .expect("request should succeed");

    assert_eq!(out, json!({ "ok": true }));
    assert_eq!(transport.requests()[0].header("authorization"), Some("Bearer token-1"));
    assert_eq!(creds.snapshot("toy").unwrap()["token"], "token-1");
}

#[tokio::test]
async fn valid_credential_is_used_as_is() {
    let transport = Arc::new(MockTransport::returning(Value::Null));
    let creds = Arc::new(MemoryCredentials::new().with("toy", credential("cached")));
    let ctx = ctx_with(transport.clone(), creds);
    let kind = CountingToken { issued: AtomicUsize::new(0) };

    ctx.http_request_with_authentication(&kind, HttpRequest::new(HttpMethod::Get, "https://api.test/x"))
        .await
        .unwrap();

    assert_eq!(kind.issued.load(Ordering::SeqCst), 0);
    assert_eq!(transport.requests()[0].header("Authorization"), Some("Bearer cached"));
}

#[tokio::test]
async fn unauthorized_triggers_exactly_one_refresh() {
    let transport = Arc::new(MockTransport::with_handler(|req| {
        match req.header("Authorization") {
            Some("Bearer stale") => Err(HostError::Status { status: 401, body: String::new() }),
            _ => Ok(json!({ "retried": true })),
        }
    }));
    let creds = Arc::new(MemoryCredentials::new().with("toy", credential("stale")));
    let ctx = ctx_with(transport.clone(), creds);
    let kind = CountingToken { issued: AtomicUsize::new(0) };

    let out = ctx
        .http_request_with_authentication(&kind, HttpRequest::new(HttpMethod::Get, "https://api.test/x"))
        .await
        .unwrap();

    assert_eq!(out["retried"], true);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(kind.issued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn other_statuses_propagate_without_retry() {
    let transport = Arc::new(MockTransport::failing(HostError::Status {
        status: 500,
        body: "boom".into(),
    }));
    let creds = Arc::new(MemoryCredentials::new().with("toy", credential("fine")));
    let ctx = ctx_with(transport.clone(), creds);
    let kind = CountingToken { issued: AtomicUsize::new(0) };

    let err = ctx
        .http_request_with_authentication(&kind, HttpRequest::new(HttpMethod::Get, "https://api.test/x"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(transport.call_count(), 1);
}
