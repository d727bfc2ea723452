//! GitLab adapter: issue, merge_request, pipeline, and job deliveries.
//!
//! GitLab signs webhooks with a plain shared-secret token in the
//! `X-Gitlab-Token` header rather than an HMAC digest; comparison is still
//! constant-time to avoid leaking the secret's length/prefix through timing.
//!
//! Pipeline and job hooks are the two-level exception to the one-event-per-
//! delivery rule every other adapter in this crate follows: a pipeline
//! delivery carries both the physical pipeline span and a synthesized
//! "logical pipeline" span that the pipeline's own jobs parent against, so
//! [`decode`] returns every event a delivery produces rather than at most
//! one.

use serde_json::Value;
use subtle::ConstantTimeEq;
use vstrace_api::{Event, EventTimings, IdDerivationError, KeyValue, SpanState};

use crate::parent_id::find_parent_id;
use vstrace_sdk::error::PipelineError;

pub const SOURCE: &str = "gitlab";

/// Prefix distinguishing a synthesized logical pipeline span_id from any
/// physical event's id, so the two never collide in the span store.
const LOGICAL_PREFIX: &str = "vstrace-logical";

fn sanitize_scope(raw: &str) -> String {
    raw.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

/// Verifies `token_header` against `secret` in constant time. GitLab sends
/// the configured secret verbatim; there is no digest to recompute.
pub fn validate_payload(secret: Option<&[u8]>, token_header: Option<&str>) -> bool {
    match secret {
        None => true,
        Some(secret) => match token_header {
            Some(token) => secret.ct_eq(token.as_bytes()).into(),
            None => false,
        },
    }
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

fn classify(state: Option<&str>, prev: Option<SpanState>) -> SpanState {
    match state {
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

#[derive(Debug)]
pub struct IssueEvent {
    payload: Value,
}

impl Event for IssueEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let iid = num_field(&self.payload, &["object_attributes", "iid"])
            .ok_or_else(|| IdDerivationError("object_attributes.iid".to_string()))?;
        let scope = str_field(&self.payload, &["project", "name"]).map(sanitize_scope).unwrap_or_else(|| "unscoped".to_string());
        Ok(format!("vstrace-{SOURCE}-issue-{scope}-{iid}"))
    }

    fn operation_name(&self) -> &str {
        "issue"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(None)
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        classify(str_field(&self.payload, &["object_attributes", "state"]), prev)
    }

    fn is_error(&self) -> bool {
        false
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new("service", "gitlab")];
        if let Some(v) = str_field(&self.payload, &["project", "path_with_namespace"]) {
            tags.push(KeyValue::new("scm.repository.full_name", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["object_attributes", "url"]) {
            tags.push(KeyValue::new("issue.url", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

#[derive(Debug)]
pub struct MergeRequestEvent {
    payload: Value,
}

impl Event for MergeRequestEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let iid = num_field(&self.payload, &["object_attributes", "iid"])
            .ok_or_else(|| IdDerivationError("object_attributes.iid".to_string()))?;
        let scope = str_field(&self.payload, &["project", "name"]).map(sanitize_scope).unwrap_or_else(|| "unscoped".to_string());
        Ok(format!("vstrace-{SOURCE}-pull_request-{scope}-{iid}"))
    }

    fn operation_name(&self) -> &str {
        "pull_request"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        let description = str_field(&self.payload, &["object_attributes", "description"]).unwrap_or_default();
        Ok(find_parent_id(description))
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        classify(str_field(&self.payload, &["object_attributes", "state"]), prev)
    }

    fn is_error(&self) -> bool {
        false
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new("service", "gitlab")];
        if let Some(v) = str_field(&self.payload, &["object_attributes", "source_branch"]) {
            tags.push(KeyValue::new("scm.base.label", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["object_attributes", "target_branch"]) {
            tags.push(KeyValue::new("scm.target.label", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

fn classify_pipeline_status(status: Option<&str>, prev: Option<SpanState>) -> SpanState {
    match status {
        Some("pending") => {
            if prev.is_some() {
                SpanState::Intermediary
            } else {
                SpanState::Start
            }
        }
        Some("running") => SpanState::Transition,
        Some("canceled") | Some("success") => SpanState::End,
        Some(_) => SpanState::Intermediary,
        None => SpanState::Unknown,
    }
}

fn classify_job_status(status: Option<&str>, prev: Option<SpanState>) -> SpanState {
    match status {
        Some("pending") | Some("created") => {
            if prev.is_some() {
                SpanState::Intermediary
            } else {
                SpanState::Start
            }
        }
        Some("running") => SpanState::Transition,
        Some("canceled") | Some("success") => SpanState::End,
        Some(_) => SpanState::Intermediary,
        None => SpanState::Unknown,
    }
}

fn pipeline_status_is_error(status: Option<&str>) -> bool {
    !matches!(status, Some("success") | Some("running"))
}

/// The pipeline's own span, scoped by project and pipeline id. Parents
/// itself against the logical pipeline span synthesized alongside it
/// (see [`PipelineLogicalEvent`]) so the tracing backend sees a coherent
/// tree even though this span and its logical parent arrive in the same
/// delivery.
#[derive(Debug)]
pub struct PipelineEvent {
    payload: Value,
}

impl PipelineEvent {
    fn project_scope(&self) -> String {
        str_field(&self.payload, &["project", "name"]).map(sanitize_scope).unwrap_or_else(|| "unscoped".to_string())
    }

    fn pipeline_id(&self) -> Option<i64> {
        num_field(&self.payload, &["object_attributes", "id"])
    }

    fn logical_span_id(&self) -> Result<String, IdDerivationError> {
        let id = self.pipeline_id().ok_or_else(|| IdDerivationError("object_attributes.id".to_string()))?;
        Ok(format!("{LOGICAL_PREFIX}-{SOURCE}-build-{}-{id}", self.project_scope()))
    }

    fn status(&self) -> Option<&str> {
        str_field(&self.payload, &["object_attributes", "status"])
    }
}

impl Event for PipelineEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let id = self.pipeline_id().ok_or_else(|| IdDerivationError("object_attributes.id".to_string()))?;
        Ok(format!("vstrace-{SOURCE}-build-{}-{id}", self.project_scope()))
    }

    fn operation_name(&self) -> &str {
        "pipeline"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(Some(self.logical_span_id()?))
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        classify_pipeline_status(self.status(), prev)
    }

    fn is_error(&self) -> bool {
        pipeline_status_is_error(self.status())
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![
            KeyValue::new("service", SOURCE),
            KeyValue::new("event.type", "pipeline"),
        ];
        if let Some(v) = self.status() {
            tags.push(KeyValue::new("event.state", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["project", "path_with_namespace"]) {
            tags.push(KeyValue::new("project.path_with_namespace", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["project", "web_url"]) {
            tags.push(KeyValue::new("project.url", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["user", "username"]) {
            tags.push(KeyValue::new("user.username", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["object_attributes", "ref"]) {
            tags.push(KeyValue::new("build.ref", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["object_attributes", "sha"]) {
            tags.push(KeyValue::new("build.sha", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

/// The logical pipeline span: opens on the pipeline's first `pending` and
/// closes on its terminal state, ignoring the `running` transition noise
/// in between so a pipeline's jobs have a single stable parent for the
/// whole run.
#[derive(Debug)]
pub struct PipelineLogicalEvent {
    payload: Value,
}

impl Event for PipelineLogicalEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let id = num_field(&self.payload, &["object_attributes", "id"]).ok_or_else(|| IdDerivationError("object_attributes.id".to_string()))?;
        let scope = str_field(&self.payload, &["project", "name"]).map(sanitize_scope).unwrap_or_else(|| "unscoped".to_string());
        Ok(format!("{LOGICAL_PREFIX}-{SOURCE}-build-{scope}-{id}"))
    }

    fn operation_name(&self) -> &str {
        "pipeline"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(None)
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        match classify_pipeline_status(str_field(&self.payload, &["object_attributes", "status"]), prev) {
            SpanState::Start => SpanState::Start,
            SpanState::End => SpanState::End,
            SpanState::Intermediary => SpanState::Intermediary,
            _ => SpanState::Unknown,
        }
    }

    fn is_error(&self) -> bool {
        pipeline_status_is_error(str_field(&self.payload, &["object_attributes", "status"]))
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new("service", SOURCE), KeyValue::new("event.type", "pipeline.logical")];
        if let Some(v) = str_field(&self.payload, &["project", "path_with_namespace"]) {
            tags.push(KeyValue::new("project.path_with_namespace", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

/// Builds the physical-then-logical (or logical-then-physical) pair a
/// single Pipeline Hook delivery produces. The logical span is ordered
/// first when the physical event is a Start, so it exists in the store
/// before anything parents against it; otherwise the physical leg runs
/// first (e.g. closing it before the logical span closes on End).
fn pipeline_events(payload: Value) -> Vec<Box<dyn Event>> {
    let physical = PipelineEvent { payload: payload.clone() };
    let logical = PipelineLogicalEvent { payload };
    if physical.state(None) == SpanState::Start {
        vec![Box::new(logical), Box::new(physical)]
    } else {
        vec![Box::new(physical), Box::new(logical)]
    }
}

/// A single job's span within a pipeline run, from GitLab's separate Job
/// Hook. Always parents against the logical pipeline span, never the
/// physical one, since jobs of the same pipeline fan out from the logical
/// root rather than from each other.
#[derive(Debug)]
pub struct JobEvent {
    payload: Value,
}

impl Event for JobEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        let id = num_field(&self.payload, &["build_id"]).ok_or_else(|| IdDerivationError("build_id".to_string()))?;
        let scope = str_field(&self.payload, &["project_name"]).map(sanitize_scope).unwrap_or_else(|| "unscoped".to_string());
        Ok(format!("vstrace-{SOURCE}-build-{scope}-{id}"))
    }

    fn operation_name(&self) -> &str {
        "build"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        let id = num_field(&self.payload, &["pipeline_id", "id"]).ok_or_else(|| IdDerivationError("pipeline_id.id".to_string()))?;
        let scope = str_field(&self.payload, &["repository", "name"])
            .or_else(|| str_field(&self.payload, &["project_name"]))
            .map(sanitize_scope)
            .unwrap_or_else(|| "unscoped".to_string());
        Ok(Some(format!("{LOGICAL_PREFIX}-{SOURCE}-build-{scope}-{id}")))
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        classify_job_status(str_field(&self.payload, &["build_status"]), prev)
    }

    fn is_error(&self) -> bool {
        pipeline_status_is_error(str_field(&self.payload, &["build_status"]))
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![KeyValue::new("service", SOURCE)];
        if let Some(v) = str_field(&self.payload, &["build_status"]) {
            tags.push(KeyValue::new("event.state", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["ref"]) {
            tags.push(KeyValue::new("build.ref", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["sha"]) {
            tags.push(KeyValue::new("build.sha", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["build_name"]) {
            tags.push(KeyValue::new("build.name", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["build_stage"]) {
            tags.push(KeyValue::new("build.stage", v.to_string()));
        }
        if let Some(v) = str_field(&self.payload, &["commit", "author_name"]) {
            tags.push(KeyValue::new("scm.commit.author.name", v.to_string()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

/// Decodes a body into the events it produces, based on GitLab's
/// `X-Gitlab-Event` header value. Every hook but Pipeline Hook produces
/// exactly one event; Pipeline Hook produces two (see [`pipeline_events`]).
pub fn decode(event_type: &str, body: &[u8]) -> Result<Vec<Box<dyn Event>>, PipelineError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
    match event_type {
        "Issue Hook" => Ok(vec![Box::new(IssueEvent { payload })]),
        "Merge Request Hook" => Ok(vec![Box::new(MergeRequestEvent { payload })]),
        "Pipeline Hook" => Ok(pipeline_events(payload)),
        "Job Hook" => Ok(vec![Box::new(JobEvent { payload })]),
        other => Err(PipelineError::UnsupportedEventKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_opened_classifies_as_start() {
        let payload = serde_json::json!({
            "object_attributes": {"iid": 5, "state": "opened"},
            "project": {"name": "widget"},
        });
        let event = IssueEvent { payload };
        assert_eq!(event.state(None), SpanState::Start);
        assert_eq!(event.span_id().unwrap(), "vstrace-gitlab-issue-widget-5");
    }

    #[test]
    fn issue_reopened_with_live_span_is_intermediary() {
        let payload = serde_json::json!({
            "object_attributes": {"iid": 5, "state": "reopened"},
            "project": {"name": "widget"},
        });
        let event = IssueEvent { payload };
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn merge_request_mines_parent_from_description() {
        let payload = serde_json::json!({
            "object_attributes": {
                "iid": 11,
                "state": "opened",
                "description": "fixes vstrace-jiracloud-issue-widget-99",
            },
            "project": {"name": "widget"},
        });
        let event = MergeRequestEvent { payload };
        assert_eq!(event.parent_span_id().unwrap(), Some("vstrace-jiracloud-issue-widget-99".to_string()));
    }

    #[test]
    fn token_validation_is_exact() {
        assert!(validate_payload(Some(b"shared-secret"), Some("shared-secret")));
        assert!(!validate_payload(Some(b"shared-secret"), Some("wrong")));
        assert!(!validate_payload(Some(b"shared-secret"), None));
    }

    fn pipeline_payload(status: &str) -> Value {
        serde_json::json!({
            "object_attributes": {"id": 42, "status": status, "ref": "main", "sha": "abc123"},
            "project": {"name": "widget", "path_with_namespace": "acme/widget"},
            "user": {"username": "ada"},
        })
    }

    #[test]
    fn pipeline_pending_produces_logical_before_physical() {
        let events = pipeline_events(pipeline_payload("pending"));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].span_id().unwrap(), "vstrace-logical-gitlab-build-widget-42");
        assert_eq!(events[1].span_id().unwrap(), "vstrace-gitlab-build-widget-42");
        assert_eq!(events[1].parent_span_id().unwrap(), Some("vstrace-logical-gitlab-build-widget-42".to_string()));
    }

    #[test]
    fn pipeline_success_produces_physical_before_logical() {
        let events = pipeline_events(pipeline_payload("success"));
        assert_eq!(events[0].span_id().unwrap(), "vstrace-gitlab-build-widget-42");
        assert_eq!(events[1].span_id().unwrap(), "vstrace-logical-gitlab-build-widget-42");
    }

    #[test]
    fn pipeline_running_is_transition_for_physical_but_unknown_for_logical() {
        let payload = pipeline_payload("running");
        let physical = PipelineEvent { payload: payload.clone() };
        let logical = PipelineLogicalEvent { payload };
        assert_eq!(physical.state(None), SpanState::Transition);
        assert_eq!(logical.state(None), SpanState::Unknown);
    }

    #[test]
    fn pipeline_error_classification_excludes_success_and_running() {
        assert!(!PipelineEvent { payload: pipeline_payload("success") }.is_error());
        assert!(!PipelineEvent { payload: pipeline_payload("running") }.is_error());
        assert!(PipelineEvent { payload: pipeline_payload("failed") }.is_error());
    }

    #[test]
    fn job_event_parents_against_logical_pipeline_span() {
        let payload = serde_json::json!({
            "build_id": 7,
            "build_status": "running",
            "project_name": "widget",
            "pipeline_id": {"id": 42},
            "repository": {"name": "widget"},
        });
        let event = JobEvent { payload };
        assert_eq!(event.span_id().unwrap(), "vstrace-gitlab-build-widget-7");
        assert_eq!(event.parent_span_id().unwrap(), Some("vstrace-logical-gitlab-build-widget-42".to_string()));
        assert_eq!(event.state(None), SpanState::Transition);
    }

    #[test]
    fn pipeline_pending_with_live_span_is_intermediary() {
        let physical = PipelineEvent { payload: pipeline_payload("pending") };
        assert_eq!(physical.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn job_pending_with_live_span_is_intermediary() {
        let payload = serde_json::json!({
            "build_id": 7,
            "build_status": "pending",
            "project_name": "widget",
            "pipeline_id": {"id": 42},
            "repository": {"name": "widget"},
        });
        let event = JobEvent { payload };
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn decode_pipeline_hook_yields_two_events() {
        let body = serde_json::to_vec(&pipeline_payload("pending")).unwrap();
        let events = decode("Pipeline Hook", &body).unwrap();
        assert_eq!(events.len(), 2);
    }
}
