//! Jira Cloud adapter: sprint and kanban issue transitions, dispatched by
//! the `webhookEvent` field rather than a header.

use serde::Deserialize;
use vstrace_api::{Event, EventTimings, IdDerivationError, KeyValue, SpanState};
use vstrace_sdk::error::PipelineError;

pub const SOURCE: &str = "jiracloud";

const KANBAN_BACKLOG: &str = "Backlog";
const KANBAN_SELECTED: &str = "Selected for Development";
const KANBAN_IN_PROGRESS: &str = "In Progress";
const KANBAN_DONE: &str = "Done";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "webhookEvent")]
    webhook_event: String,
}

#[derive(Debug, Deserialize)]
pub struct SprintEvent {
    sprint: Sprint,
}

#[derive(Debug, Deserialize)]
struct Sprint {
    id: i64,
    name: Option<String>,
    state: String,
    #[serde(rename = "originBoardId")]
    origin_board_id: Option<i64>,
}

impl Event for SprintEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        Ok(format!("vstrace-{SOURCE}-sprint-{}", self.sprint.id))
    }

    fn operation_name(&self) -> &str {
        "sprint"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(None)
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        match self.sprint.state.as_str() {
            "active" => {
                if prev.is_some() {
                    SpanState::Intermediary
                } else {
                    SpanState::Start
                }
            }
            "closed" => SpanState::End,
            _ => SpanState::Unknown,
        }
    }

    fn is_error(&self) -> bool {
        false
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![
            KeyValue::new("service", "jiracloud"),
            KeyValue::new("sprint.id", self.sprint.id),
        ];
        if let Some(v) = &self.sprint.name {
            tags.push(KeyValue::new("sprint.name", v.clone()));
        }
        if let Some(v) = self.sprint.origin_board_id {
            tags.push(KeyValue::new("sprint.origin_board_id", v));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueEvent {
    user: Option<JiraUser>,
    issue: Issue,
}

#[derive(Debug, Deserialize)]
struct JiraUser {
    #[serde(rename = "accountId")]
    account_id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    id: String,
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    status: Option<IssueStatus>,
    project: Option<IssueProject>,
}

#[derive(Debug, Deserialize)]
struct IssueStatus {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueProject {
    key: Option<String>,
    name: Option<String>,
}

impl Event for IssueEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        Ok(format!("vstrace-{SOURCE}-issue-{}", self.issue.key))
    }

    fn operation_name(&self) -> &str {
        "issue"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        Ok(None)
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        let Some(status) = &self.issue.fields.status else {
            return SpanState::Unknown;
        };
        match status.name.as_str() {
            KANBAN_SELECTED | KANBAN_IN_PROGRESS => {
                if prev.is_some() {
                    SpanState::Intermediary
                } else {
                    SpanState::Start
                }
            }
            KANBAN_DONE | KANBAN_BACKLOG => SpanState::End,
            _ => SpanState::Intermediary,
        }
    }

    fn is_error(&self) -> bool {
        false
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![
            KeyValue::new("service", "jiracloud"),
            KeyValue::new("issue.id", self.issue.id.clone()),
            KeyValue::new("issue.key", self.issue.key.clone()),
        ];
        if let Some(user) = &self.user {
            if let Some(v) = &user.account_id {
                tags.push(KeyValue::new("user.account_id", v.clone()));
            }
            if let Some(v) = &user.display_name {
                tags.push(KeyValue::new("user.display_name", v.clone()));
            }
        }
        if let Some(project) = &self.issue.fields.project {
            if let Some(v) = &project.key {
                tags.push(KeyValue::new("project.key", v.clone()));
            }
            if let Some(v) = &project.name {
                tags.push(KeyValue::new("project.name", v.clone()));
            }
        }
        if let Some(status) = &self.issue.fields.status {
            tags.push(KeyValue::new("issue.status.name", status.name.clone()));
            if let Some(id) = &status.id {
                tags.push(KeyValue::new("issue.status.id", id.clone()));
            }
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings::NONE
    }
}

/// Jira Cloud identifies its payload shape via the `webhookEvent` field
/// rather than an HTTP header.
pub fn decode(body: &[u8]) -> Result<Box<dyn Event>, PipelineError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
    if envelope.webhook_event.starts_with("sprint_") {
        let event: SprintEvent =
            serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
        return Ok(Box::new(event));
    }
    if envelope.webhook_event.starts_with("jira:issue_") {
        let event: IssueEvent =
            serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
        return Ok(Box::new(event));
    }
    Err(PipelineError::UnsupportedEventKind(envelope.webhook_event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_active_classifies_as_start() {
        let payload = serde_json::json!({
            "webhookEvent": "sprint_started",
            "sprint": {"id": 3, "state": "active"},
        });
        let event = decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.state(None), SpanState::Start);
        assert_eq!(event.span_id().unwrap(), "vstrace-jiracloud-sprint-3");
    }

    #[test]
    fn kanban_in_progress_with_no_prior_state_starts() {
        let payload = serde_json::json!({
            "webhookEvent": "jira:issue_updated",
            "issue": {"id": "10001", "key": "VS-7", "fields": {"status": {"name": "In Progress"}}},
        });
        let event = decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.state(None), SpanState::Start);
    }

    #[test]
    fn kanban_in_progress_with_live_span_is_intermediary() {
        let payload = serde_json::json!({
            "webhookEvent": "jira:issue_updated",
            "issue": {"id": "10001", "key": "VS-7", "fields": {"status": {"name": "In Progress"}}},
        });
        let event = decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn sprint_active_with_live_span_is_intermediary() {
        let payload = serde_json::json!({
            "webhookEvent": "sprint_updated",
            "sprint": {"id": 3, "state": "active"},
        });
        let event = decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn kanban_done_closes() {
        let payload = serde_json::json!({
            "webhookEvent": "jira:issue_updated",
            "issue": {"id": "10001", "key": "VS-7", "fields": {"status": {"name": "Done"}}},
        });
        let event = decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.state(None), SpanState::End);
    }
}
