//! GitHub adapter: issues and pull_request deliveries.
//!
//! Validation follows GitHub's convention: `X-Hub-Signature-256` carries
//! `sha256=<hex hmac>` over the raw body, verified against
//! `GITHUB_WEBHOOK_SECRET_TOKEN`.

use serde_json::Value;
use vstrace_api::{Event, EventTimings, IdDerivationError, KeyValue, SpanState};

use crate::parent_id::find_parent_id;
use crate::validate;
use vstrace_sdk::error::PipelineError;

pub const SOURCE: &str = "github";

/// Scope segments of a span id may only contain `[0-9A-Za-z_]`, matching the
/// parent-mining regex; repository names commonly carry hyphens, so those
/// are folded to underscores rather than rejected.
fn sanitize_scope(raw: &str) -> String {
    raw.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

/// Verifies the `X-Hub-Signature-256` header against `body`.
pub fn validate_payload(secret: Option<&[u8]>, body: &[u8], signature_header: Option<&str>) -> bool {
    validate::validate(secret, body, signature_header)
}

fn str_field<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = v;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn num_field(v: &Value, path: &[&str]) -> Option<i64> {
    let mut cur = v;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_i64()
}

#[derive(Debug)]
pub struct IssuesEvent {
    payload: Value,
}

impl Event for IssuesEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let id = num_field(&self.payload, &["issue", "id"])
            .ok_or_else(|| IdDerivationError("issue.id".to_string()))?;
        let scope = str_field(&self.payload, &["repository", "name"])
            .map(sanitize_scope)
            .unwrap_or_else(|| "unscoped".to_string());
        Ok(format!("vstrace-{SOURCE}-issue-{scope}-{id}"))
    }

    fn operation_name(&self) -> &str {
        "issue"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(None)
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        match str_field(&self.payload, &["action"]) {
            Some("opened") | Some("reopened") => {
                if prev.is_some() {
                    SpanState::Intermediary
                } else {
                    SpanState::Start
                }
            }
            Some("closed") => SpanState::End,
            Some(_) => SpanState::Intermediary,
            None => SpanState::Unknown,
        }
    }

    fn is_error(&self) -> bool {
        false
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new("service", "github")];
        if let Some(v) = str_field(&self.payload, &["repository", "name"]) {
            tags.push(KeyValue::new("scm.repository.name", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["repository", "full_name"]) {
            tags.push(KeyValue::new("scm.repository.full_name", v.to_string()));
        }
        if let Some(v) = num_field(&self.payload, &["issue", "number"]) {
            tags.push(KeyValue::new("issue.number", v));
        }
        if let Some(v) = str_field(&self.payload, &["issue", "user", "login"]) {
            tags.push(KeyValue::new("user.name", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

#[derive(Debug)]
pub struct PullRequestEvent {
    payload: Value,
}

impl Event for PullRequestEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let id = num_field(&self.payload, &["pull_request", "id"])
            .ok_or_else(|| IdDerivationError("pull_request.id".to_string()))?;
        let scope = str_field(&self.payload, &["repository", "name"])
            .map(sanitize_scope)
            .unwrap_or_else(|| "unscoped".to_string());
        Ok(format!("vstrace-{SOURCE}-pull_request-{scope}-{id}"))
    }

    fn operation_name(&self) -> &str {
        "pull_request"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        let head_ref = str_field(&self.payload, &["pull_request", "head", "ref"]).unwrap_or_default();
        let body = str_field(&self.payload, &["pull_request", "body"]).unwrap_or_default();
        Ok(find_parent_id(head_ref).or_else(|| find_parent_id(body)))
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        match str_field(&self.payload, &["action"]) {
            Some("opened") | Some("reopened") => {
                if prev.is_some() {
                    SpanState::Intermediary
                } else {
                    SpanState::Start
                }
            }
            Some("closed") => SpanState::End,
            Some(_) => SpanState::Intermediary,
            None => SpanState::Unknown,
        }
    }

    fn is_error(&self) -> bool {
        false
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new("service", "github")];
        if let Some(v) = str_field(&self.payload, &["pull_request", "head", "ref"]) {
            tags.push(KeyValue::new("scm.head.ref", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["pull_request", "head", "sha"]) {
            tags.push(KeyValue::new("scm.head.sha", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["pull_request", "base", "ref"]) {
            tags.push(KeyValue::new("scm.base.ref", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["repository", "full_name"]) {
            tags.push(KeyValue::new("scm.repository.full_name", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

/// Decodes a body into an [`Event`] based on GitHub's `X-GitHub-Event`
/// header value.
pub fn decode(event_type: &str, body: &[u8]) -> Result<Box<dyn Event>, PipelineError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
    match event_type {
        "issues" => Ok(Box::new(IssuesEvent { payload })),
        "pull_request" => Ok(Box::new(PullRequestEvent { payload })),
        other => Err(PipelineError::UnsupportedEventKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_opened_classifies_as_start() {
        let payload = serde_json::json!({
            "action": "opened",
            "issue": {"id": 42, "number": 7, "user": {"login": "octocat"}},
            "repository": {"name": "widget", "full_name": "acme/widget"},
        });
        let event = IssuesEvent { payload };
        assert_eq!(event.state(None), SpanState::Start);
        assert_eq!(event.span_id().unwrap(), "vstrace-github-issue-widget-42");
    }

    #[test]
    fn issues_reopened_with_prior_state_is_intermediary() {
        let payload = serde_json::json!({
            "action": "reopened",
            "issue": {"id": 42, "number": 7, "user": {"login": "octocat"}},
            "repository": {"name": "widget", "full_name": "acme/widget"},
        });
        let event = IssuesEvent { payload };
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn pull_request_mines_parent_from_head_ref() {
        let payload = serde_json::json!({
            "action": "opened",
            "pull_request": {
                "id": 99,
                "head": {"ref": "feature/vstrace-github-issue-widget-12"},
            },
        });
        let event = PullRequestEvent { payload };
        assert_eq!(event.parent_span_id().unwrap(), Some("vstrace-github-issue-widget-12".to_string()));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = decode("ping", b"{}").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedEventKind(k) if k == "ping"));
    }
}
