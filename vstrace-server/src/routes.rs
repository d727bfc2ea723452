//! The webhook ingress routes and their supporting middleware.
//!
//! One handler per source decodes the body into an [`vstrace_api::Event`]
//! and hands it to that source's [`vstrace_sdk::PipelineContext`]; `/metrics`
//! and `/healthz` are plain introspection endpoints, and `/mocktracer/*` is
//! only reachable when the configured tracer backend is `mock`.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use vstrace_api::Event;
use vstrace_sdk::PipelineError;
use vstrace_sources::validate::SIGNATURE_HEADER;
use vstrace_sources::{customhttp, github, gitlab, jenkins, jiracloud};

use crate::app::App;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body<T: Into<Bytes>>(chunk: T) -> BoxBody {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<BoxBody> {
    Response::builder().status(status).body(full_body(body)).unwrap()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v: &HeaderValue| v.to_str().ok())
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidSignature => StatusCode::BAD_REQUEST,
        PipelineError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
        PipelineError::DecodeError(_) => StatusCode::BAD_REQUEST,
        PipelineError::UnsupportedEventKind(_) => StatusCode::BAD_REQUEST,
        PipelineError::IdDerivation(_) => StatusCode::BAD_REQUEST,
        PipelineError::CapacityExceeded(_) => StatusCode::BAD_REQUEST,
        // An End/Transition for a span this process never saw Start isn't
        // the caller's fault (the process may have restarted); acknowledge.
        PipelineError::SpanMissing(_) => StatusCode::OK,
        PipelineError::TracerUnavailable(_) => StatusCode::BAD_REQUEST,
        PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn read_body(req: Request<Incoming>) -> Result<(HeaderMap, Vec<u8>), Response<BoxBody>> {
    let headers = req.headers().clone();
    match req.into_body().collect().await {
        Ok(collected) => Ok((headers, collected.to_bytes().to_vec())),
        Err(e) => Err(text(StatusCode::BAD_REQUEST, format!("unreadable request body: {e}"))),
    }
}

fn handle_event(app: &App, source: &'static str, event: Result<Box<dyn Event>, PipelineError>) -> Response<BoxBody> {
    handle_events(app, source, event.map(|e| vec![e]))
}

/// Dispatches every event a delivery decoded to (almost always one; a
/// GitLab pipeline hook decodes to two, see `vstrace_sources::gitlab`).
fn handle_events(app: &App, source: &'static str, events: Result<Vec<Box<dyn Event>>, PipelineError>) -> Response<BoxBody> {
    let events = match events {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(source, error = %e, "rejected delivery");
            return text(status_for(&e), e.to_string());
        }
    };

    match app.pipelines[source].handle_all(&events) {
        Ok(()) => text(StatusCode::OK, "success"),
        Err(e) => {
            tracing::warn!(source, error = %e, "dispatch failed");
            text(status_for(&e), e.to_string())
        }
    }
}

async fn handle_github(app: Arc<App>, req: Request<Incoming>) -> Response<BoxBody> {
    let event_type = header_str(req.headers(), "X-GitHub-Event").unwrap_or_default().to_string();
    let signature = header_str(req.headers(), "X-Hub-Signature-256").map(str::to_string);
    let (_, body) = match read_body(req).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if !github::validate_payload(app.config.github_webhook_secret.as_deref().map(str::as_bytes), &body, signature.as_deref()) {
        return handle_event(&app, "github", Err(PipelineError::InvalidSignature));
    }
    handle_event(&app, "github", github::decode(&event_type, &body))
}

async fn handle_gitlab(app: Arc<App>, req: Request<Incoming>) -> Response<BoxBody> {
    let event_type = header_str(req.headers(), "X-Gitlab-Event").unwrap_or_default().to_string();
    let token = header_str(req.headers(), "X-Gitlab-Token").map(str::to_string);
    let (_, body) = match read_body(req).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if !gitlab::validate_payload(app.config.gitlab_webhook_secret.as_deref().map(str::as_bytes), token.as_deref()) {
        return handle_events(&app, "gitlab", Err(PipelineError::InvalidSignature));
    }
    handle_events(&app, "gitlab", gitlab::decode(&event_type, &body))
}

async fn handle_jenkins(app: Arc<App>, req: Request<Incoming>) -> Response<BoxBody> {
    let (_, body) = match read_body(req).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    handle_event(&app, "jenkins", jenkins::decode(&body))
}

async fn handle_jira(app: Arc<App>, req: Request<Incoming>) -> Response<BoxBody> {
    let (_, body) = match read_body(req).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    handle_event(&app, "jira", jiracloud::decode(&body))
}

async fn handle_customhttp(app: Arc<App>, req: Request<Incoming>) -> Response<BoxBody> {
    let signature = header_str(req.headers(), SIGNATURE_HEADER).map(str::to_string);
    let (_, body) = match read_body(req).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let secret = app.config.custom_http_secret.as_deref().map(str::as_bytes);
    handle_event(&app, "customhttp", customhttp::decode(secret, &body, signature.as_deref()))
}

fn handle_metrics(app: &App) -> Response<BoxBody> {
    match app.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(full_body(body))
            .unwrap(),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("metrics render failed: {e}")),
    }
}

fn handle_mocktracer_reset(app: &App) -> Response<BoxBody> {
    match &app.mock_tracer {
        Some(provider) => {
            provider.reset();
            text(StatusCode::OK, "success")
        }
        None => text(StatusCode::NOT_FOUND, "mock tracer not configured"),
    }
}

fn handle_mocktracer_finished_spans(app: &App) -> Response<BoxBody> {
    match &app.mock_tracer {
        Some(provider) => {
            let spans = provider.finished_spans();
            let json = serde_json::to_vec(&spans).unwrap_or_else(|_| b"[]".to_vec());
            Response::builder()
                .status(StatusCode::OK)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(full_body(json))
                .unwrap()
        }
        None => text(StatusCode::NOT_FOUND, "mock tracer not configured"),
    }
}

/// Dispatches one request to its route. The single entry point `main.rs`
/// wraps in `service_fn`.
pub async fn router(app: Arc<App>, req: Request<Incoming>) -> Result<Response<BoxBody>, hyper::Error> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => text(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => handle_metrics(&app),
        (&Method::POST, "/github") => handle_github(app, req).await,
        (&Method::POST, "/gitlab") => handle_gitlab(app, req).await,
        (&Method::POST, "/jenkins") => handle_jenkins(app, req).await,
        (&Method::POST, "/jira") => handle_jira(app, req).await,
        (&Method::POST, "/customhttp") => handle_customhttp(app, req).await,
        (&Method::POST, "/mocktracer/reset") => handle_mocktracer_reset(&app),
        (&Method::GET, "/mocktracer/finished-spans") => handle_mocktracer_finished_spans(&app),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}
