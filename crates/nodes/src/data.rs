//! Item data exchanged between the host and a node.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

/// One output item, tagged with the input item it was produced from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutput {
    pub json: Value,
    pub paired_item: usize,
}

impl NodeOutput {
    pub fn new(json: Value, paired_item: usize) -> Self {
        Self { json, paired_item }
    }

    /// Error record emitted in place of a result when `continue_on_fail` is set.
    pub fn error(message: impl Into<String>, paired_item: usize) -> Self {
        Self {
            json: json!({ "error": message.into() }),
            paired_item,
        }
    }
}

/// Flatten a response into items: arrays yield their elements, objects
/// yield themselves, `null` yields nothing and other scalars are wrapped.
pub fn return_json_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::Object(_) => vec![value],
        scalar => vec![json!({ "data": scalar })],
    }
}

/// An inbound webhook delivery, scoped to a single call.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    headers: HashMap<String, String>,
    pub raw_body: Vec<u8>,
    pub body: Value,
}

impl WebhookEnvelope {
    /// Build an envelope; header names are lower-cased and the body is parsed
    /// as JSON (`Value::Null` when it is not valid JSON).
    pub fn new<I, K, V>(headers: I, raw_body: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let raw_body = raw_body.into();
        let body = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            headers,
            raw_body,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// What a webhook node hands back to the host.
///
/// `workflow_data: None` means the delivery was dropped and no run starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookResponse {
    pub workflow_data: Option<Vec<Value>>,
}

impl WebhookResponse {
    pub fn accept(body: Value) -> Self {
        Self {
            workflow_data: Some(return_json_array(body)),
        }
    }

    pub fn reject() -> Self {
        Self::default()
    }

    pub fn is_accepted(&self) -> bool {
        self.workflow_data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_are_flattened_and_objects_wrapped() {
        assert_eq!(return_json_array(json!([{ "a": 1 }, { "a": 2 }])).len(), 2);
        assert_eq!(return_json_array(json!({ "a": 1 })), vec![json!({ "a": 1 })]);
        assert!(return_json_array(Value::Null).is_empty());
        assert_eq!(return_json_array(json!(7)), vec![json!({ "data": 7 })]);
    }

    #[test]
    fn envelope_headers_are_case_insensitive() {
        let env = WebhookEnvelope::new([("Svix-Id", "msg_1")], br#"{"x":1}"#.to_vec());
        assert_eq!(env.header("svix-id"), Some("msg_1"));
        assert_eq!(env.header("SVIX-ID"), Some("msg_1"));
        assert_eq!(env.body["x"], 1);
    }

    #[test]
    fn invalid_json_body_parses_to_null() {
        let env = WebhookEnvelope::new(Vec::<(String, String)>::new(), b"not json".to_vec());
        assert_eq!(env.body, Value::Null);
        assert_eq!(env.raw_body, b"not json");
    }

    #[test]
    fn error_output_carries_message_and_item() {
        let out = NodeOutput::error("boom", 3);
        assert_eq!(out.json["error"], "boom");
        assert_eq!(out.paired_item, 3);
    }
}
