//! Jenkins adapter: build and deploy events from a single flat JSON
//! payload (no vendor SDK; Jenkins ships this shape from a notification
//! plugin rather than a typed webhook API).
//!
//! Unlike the original, `running` classifies as a [`SpanState::Transition`]
//! (closing the queued/in-progress span and opening a running one) only
//! when a prior state is already known; with no prior state it is treated
//! as a fresh Start, since a restarted server may see `running` first.

use serde::Deserialize;
use vstrace_api::{Event, EventTimings, IdDerivationError, KeyValue, SpanState};
use vstrace_sdk::error::PipelineError;

use crate::parent_id::find_parent_id;

pub const SOURCE: &str = "jenkins";
const DEPLOY_PARAMETER_KEY: &str = "type";
const PARENT_PARAMETER_KEY: &str = "vstrace-trace-id";

#[derive(Debug, Deserialize)]
struct ScmInfo {
    url: Option<String>,
    commit: Option<String>,
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuildEvent {
    result: String,
    #[serde(rename = "ciUrl")]
    ci_url: Option<String>,
    #[serde(rename = "fullJobName")]
    full_job_name: Option<String>,
    #[serde(default)]
    parameters: std::collections::BTreeMap<String, String>,
    #[serde(rename = "buildUrl")]
    build_url: Option<String>,
    #[serde(rename = "buildCause")]
    build_cause: Option<String>,
    number: i64,
    #[serde(rename = "jobName")]
    job_name: String,
    #[serde(rename = "startedUsername")]
    started_username: Option<String>,
    #[serde(rename = "scmInfo")]
    scm_info: Option<ScmInfo>,
    duration: Option<i64>,
}

impl BuildEvent {
    fn branch_id(&self) -> Option<String> {
        let branch = self.scm_info.as_ref()?.branch.as_ref()?;
        Some(branch.strip_prefix("origin/").unwrap_or(branch).to_string())
    }
}

impl Event for BuildEvent {
    fn span_id(&self) -> Result<String, IdDerivationError> {
        Ok(format!("vstrace-{SOURCE}-{}-{}", self.operation_name(), self.number))
    }

    fn operation_name(&self) -> &str {
        if self.job_name.starts_with("deploy:") {
            return "deploy";
        }
        if self.parameters.get(DEPLOY_PARAMETER_KEY).map(String::as_str) == Some("deploy") {
            return "deploy";
        }
        "build"
    }

    fn parent_span_id(&self) -> Result<Option<String>, IdDerivationError> {
        if let Some(id) = self.parameters.get(PARENT_PARAMETER_KEY) {
            return Ok(Some(id.clone()));
        }
        if let Some(branch) = self.branch_id() {
            return Ok(find_parent_id(&branch));
        }
        Ok(None)
    }

    fn state(&self, prev: Option<SpanState>) -> SpanState {
        match self.result.as_str() {
            "INPROGRESS" | "pending" | "created" => {
                if prev.is_some() {
                    SpanState::Intermediary
                } else {
                    SpanState::Start
                }
            }
            "running" => {
                if prev.is_some() {
                    SpanState::Transition
                } else {
                    SpanState::Start
                }
            }
            "success" | "SUCCESS" | "canceled" => SpanState::End,
            _ => SpanState::End,
        }
    }

    fn is_error(&self) -> bool {
        !matches!(self.result.as_str(), "success" | "SUCCESS" | "running" | "INPROGRESS")
    }

    fn tags(&self) -> Vec<KeyValue> {
        let mut tags = vec![
            KeyValue::new("service", "jenkins"),
            KeyValue::new("build.result", self.result.clone()),
            KeyValue::new("build.job.name", self.job_name.clone()),
            KeyValue::new("build.number", self.number),
        ];
        if let Some(v) = &self.ci_url {
            tags.push(KeyValue::new("build.ci.url", v.clone()));
        }
        if let Some(v) = &self.build_url {
            tags.push(KeyValue::new("build.url", v.clone()));
        }
        if let Some(v) = &self.build_cause {
            tags.push(KeyValue::new("build.cause", v.clone()));
        }
        if let Some(v) = &self.full_job_name {
            tags.push(KeyValue::new("build.job.full_name", v.clone()));
        }
        if let Some(v) = &self.started_username {
            tags.push(KeyValue::new("build.started.user.name", v.clone()));
        }
        if let Some(scm) = &self.scm_info {
            if let Some(url) = &scm.url {
                tags.push(KeyValue::new("scm.head.url", url.clone()));
            }
            if let Some(sha) = &scm.commit {
                tags.push(KeyValue::new("scm.head.sha", sha.clone()));
            }
        }
        if let Some(branch) = self.branch_id() {
            tags.push(KeyValue::new("scm.branch", branch));
        }
        for (k, v) in &self.parameters {
            tags.push(KeyValue::new(format!("build.parameter.{k}"), v.clone()));
        }
        tags
    }

    fn timings(&self) -> EventTimings {
        EventTimings {
            duration: self.duration.filter(|d| *d >= 0).map(|d| std::time::Duration::from_millis(d as u64)),
        }
    }
}

/// Jenkins has one payload shape; there is no per-event-type dispatch.
pub fn decode(body: &[u8]) -> Result<Box<dyn Event>, PipelineError> {
    let event: BuildEvent =
        serde_json::from_slice(body).map_err(|e| PipelineError::DecodeError(e.to_string()))?;
    Ok(Box::new(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(result: &str, job_name: &str) -> BuildEvent {
        BuildEvent {
            result: result.to_string(),
            ci_url: None,
            full_job_name: None,
            parameters: Default::default(),
            build_url: None,
            build_cause: None,
            number: 14,
            job_name: job_name.to_string(),
            started_username: None,
            scm_info: None,
            duration: None,
        }
    }

    #[test]
    fn deploy_job_name_prefix_selects_deploy_operation() {
        let event = sample("INPROGRESS", "deploy:widget-prod");
        assert_eq!(event.operation_name(), "deploy");
    }

    #[test]
    fn non_deploy_job_name_selects_build_operation() {
        let event = sample("INPROGRESS", "widget-ci");
        assert_eq!(event.operation_name(), "build");
    }

    #[test]
    fn running_without_prior_state_starts_fresh() {
        let event = sample("running", "widget-ci");
        assert_eq!(event.state(None), SpanState::Start);
    }

    #[test]
    fn running_with_prior_state_transitions() {
        let event = sample("running", "widget-ci");
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Transition);
    }

    #[test]
    fn duplicate_inprogress_with_prior_state_is_intermediary() {
        let event = sample("INPROGRESS", "widget-ci");
        assert_eq!(event.state(Some(SpanState::Start)), SpanState::Intermediary);
    }

    #[test]
    fn non_success_result_is_an_error() {
        let event = sample("FAILURE", "widget-ci");
        assert!(event.is_error());
    }

    #[test]
    fn explicit_parent_parameter_wins_over_branch() {
        let mut event = sample("INPROGRESS", "widget-ci");
        event.parameters.insert(PARENT_PARAMETER_KEY.to_string(), "vstrace-github-issue-widget-1".to_string());
        event.scm_info = Some(ScmInfo {
            url: None,
            commit: None,
            branch: Some("origin/vstrace-github-issue-widget-2".to_string()),
        });
        assert_eq!(event.parent_span_id().unwrap(), Some("vstrace-github-issue-widget-1".to_string()));
    }
}
