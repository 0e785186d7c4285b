use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::chat::signature::verify_signature;
use crate::runs;
use crate::server::AppState;

pub const USAGE: &str = "Please provide a task description after the command.\n\
For example: `/momentum Create a new API endpoint to fetch user profiles.`";

/// A decoded slash-command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub user_id: String,
}

impl SlashCommand {
    pub fn from_form(body: &str) -> Self {
        let mut fields = parse_form(body);
        let mut take = |key: &str| fields.remove(key).unwrap_or_default();
        Self {
            command: take("command"),
            text: take("text").trim().to_string(),
            user_id: take("user_id"),
        }
    }
}

/// Decode an `application/x-www-form-urlencoded` body. Undecodable pairs are dropped.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Serialize)]
pub struct SlackReply {
    pub response_type: &'static str,
    pub text: String,
}

impl SlackReply {
    fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral",
            text: text.into(),
        }
    }
}

pub async fn handle_slash_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = state.config.slack.signing_secret.as_deref() else {
        tracing::warn!("Slack command received but slack.signing_secret is not configured");
        return StatusCode::NOT_FOUND.into_response();
    };

    let (Some(timestamp), Some(signature)) = (
        header(&headers, "x-slack-request-timestamp"),
        header(&headers, "x-slack-signature"),
    ) else {
        tracing::warn!("Missing Slack signature headers");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verify_signature(secret, timestamp, &body, signature, now) {
        tracing::warn!(error = %e, "Slack signature verification failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let form = String::from_utf8_lossy(&body);
    let command = SlashCommand::from_form(&form);

    if command.text.is_empty() {
        return Json(SlackReply::ephemeral(USAGE)).into_response();
    }

    tracing::info!(
        user = %command.user_id,
        command = %command.command,
        requirement = %command.text,
        "Received chat command"
    );

    let run_id = runs::launch(&state.runs, &state.orchestrator, command.text.clone()).await;

    Json(SlackReply::ephemeral(format!(
        "Got it! Starting work on your request: *{}*\nRun id: `{run_id}`",
        command.text
    )))
    .into_response()
}
