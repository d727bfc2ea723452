//! Companion CLI for the `customhttp` event source: emits signed
//! start/end deliveries for activities with no dedicated source adapter
//! (ad hoc scripts, manual runbooks, anything that can shell out to curl
//! but would rather not hand-roll the signature).

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value as JsonValue;
use vstrace_sources::validate;

#[derive(Parser)]
#[command(name = "vstrace", about = "Emit events to a vstrace customhttp source")]
struct Cli {
    /// URL of the customhttp event source.
    #[arg(long, env = "VS_CUSTOM_HTTP_EVENT_SOURCE_URL", default_value = "http://localhost:5000/customhttp")]
    event_source_url: String,

    /// Shared secret used to HMAC-sign the request body, matching the
    /// server's `VS_CUSTOM_HTTP_SECRET`. Unsigned if omitted.
    #[arg(long, env = "VS_CUSTOM_HTTP_EVENT_SOURCE_SECRET")]
    secret_key: Option<String>,

    /// Activity kind: issue, pull_request, build, deploy, sprint, pipeline.
    #[arg(long, default_value = "deploy")]
    kind: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new event, printing its generated id on success.
    Start {
        /// Id of another event this one continues.
        #[arg(long)]
        parent_event_id: Option<String>,

        /// Repeatable `key|value` tag.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Ends a previously started event.
    End {
        #[arg(long)]
        event_id: String,
    },
}

#[derive(Serialize)]
struct CustomEventPayload {
    id: String,
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    error: bool,
    namespace: &'static str,
    #[serde(rename = "type")]
    kind: String,
    metadata: BTreeMap<String, JsonValue>,
}

fn parse_tags(raw: &[String]) -> anyhow::Result<BTreeMap<String, JsonValue>> {
    let mut tags = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('|')
            .ok_or_else(|| anyhow::anyhow!("expected tag of the form key|value, received {entry:?}"))?;
        tags.insert(key.to_string(), JsonValue::String(value.to_string()));
    }
    if !tags.is_empty() {
        if let Ok(user) = std::env::var("USER") {
            tags.insert("user.username".to_string(), JsonValue::String(user));
        }
    }
    Ok(tags)
}

fn post_event(url: &str, secret: Option<&str>, payload: &CustomEventPayload) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;

    let client = reqwest::blocking::Client::new();
    let mut request = client.post(url).header("Content-Type", "application/json").body(body.clone());
    if let Some(secret) = secret {
        let signature = validate::sign(secret.as_bytes(), &body);
        request = request.header(validate::SIGNATURE_HEADER, format!("sha256={signature}"));
    }

    let response = request.send()?;
    let status = response.status();
    let text = response.text().unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("event source returned {status}: {text}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { parent_event_id, tags } => {
            let id = uuid::Uuid::new_v4().to_string();
            let payload = CustomEventPayload {
                id: id.clone(),
                action: "start",
                parent_id: parent_event_id,
                error: false,
                namespace: "default",
                kind: cli.kind,
                metadata: parse_tags(&tags)?,
            };
            post_event(&cli.event_source_url, cli.secret_key.as_deref(), &payload)?;
            println!("{id}");
        }
        Command::End { event_id } => {
            let payload = CustomEventPayload {
                id: event_id,
                action: "end",
                parent_id: None,
                error: false,
                namespace: "default",
                kind: cli.kind,
                metadata: BTreeMap::new(),
            };
            post_event(&cli.event_source_url, cli.secret_key.as_deref(), &payload)?;
        }
    }

    Ok(())
}
