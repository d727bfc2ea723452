//! Generic HTTP adapter: a vendor-neutral `{id, action, parent_id?, error,
//! namespace, type, metadata?}` schema for producers with no dedicated
//! adapter (and for `vstrace-cli`). HMAC-validated via the shared
//! `X-VS-Signature` header convention.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use vstrace_api::{Event, EventTimings, IdDerivationError, KeyValue, SpanState, Value};
use vstrace_sdk::error::PipelineError;

use crate::validate;

pub const SOURCE: &str = "customhttp";

#[derive(Debug, Deserialize)]
pub struct CustomEvent {
    id: String,
    action: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    error: bool,
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    metadata: BTreeMap<String, JsonValue>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Event for CustomEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        Ok(format!("vstrace-{SOURCE}-{}-{}-{}", self.kind, self.namespace, self.id))
    }

    fn operation_name(&self) -> &str {
        &self.kind
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(self.parent_id.clone())
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        match self.action.as_str() {
            "start" => {
                if prev.is_some() {
                    SpanState::Intermediary
                } else {
                    SpanState::Start
                }
            }
            "end" => SpanState::End,
            "transition" => SpanState::Transition,
            _ => SpanState::Intermediary,
        }
    }

    fn is_error(&self) -> bool {
        self.error
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![
            KeyValue::new("service", "customhttp"),
            KeyValue::new("namespace", self.namespace.clone()),
        ];
        for (k, v) in &self.metadata {
            tags.push(KeyValue::new(k.clone(), json_to_value(v)));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

fn json_to_value(v: &JsonValue) -> Value {
    match v {
        JsonValue::Bool(b) => Value::from(*b),
        JsonValue::Number(n) => n.as_i64().map(Value::from).unwrap_or_else(|| Value::from(n.as_f64().unwrap_or_default())),
        other => Value::from(other.to_string()),
    }
}

/// Validates and decodes a `customhttp` delivery in one step: the body is
/// only parsed once the signature has verified.
pub fn decode(secret: Option<&[u8]>, body: &[u8], signature: Option<&str>) -> Result<Box<dyn Event>, PipelineError> {
    if !validate::validate(secret, body, signature) {
        return Err(PipelineError::InvalidSignature);
    }
    let event: CustomEvent =
        serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
    Ok(Box::new(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_action_classifies_as_start() {
        let payload = serde_json::json!({
            "id": "42",
            "action": "start",
            "type": "deploy",
            "error": false,
            "namespace": "widget",
        });
        let body = payload.to_string();
        let event = decode(None, body.as_bytes(), None).unwrap();
        assert_eq!(event.state(None), SpanState::Start);
        assert_eq!(event.span_id().unwrap(), "vstrace-customhttp-deploy-widget-42");
    }

    #[test]
    fn start_action_with_live_span_is_intermediary() {
        let payload = serde_json::json!({
            "id": "42",
            "action": "start",
            "type": "deploy",
            "namespace": "widget",
        });
        let body = payload.to_string();
        let event = decode(None, body.as_bytes(), None).unwrap();
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let body = serde_json::json!({"id": "1", "action": "start", "type": "deploy"}).to_string();
        let err = decode(Some(b"secret"), body.as_bytes(), Some("sha256=bad")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSignature));
    }

    #[test]
    fn valid_signature_decodes() {
        let body = serde_json::json!({"id": "1", "action": "end", "type": "build"}).to_string();
        let sig = validate::sign(b"secret", body.as_bytes());
        let event = decode(Some(b"secret"), body.as_bytes(), Some(&sig)).unwrap();
        assert_eq!(event.state(None), SpanState::End);
    }
}
