use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionRequest, LLMBackend};
use crate::ai::client::{CompletionError, CompletionResult};
use crate::types::TurnRole;

/// Client for any OpenAI-compatible chat-completions endpoint
pub struct EndpointClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

// Endpoint response shapes
#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct OpenAIShape {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct ContentOnly {
    content: String,
}

impl EndpointClient {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
        }
    }
}

/// Pull the completion text out of a successful response body.
fn extract_content(body: &str) -> String {
    // Try OpenAI-shaped response first
    if let Ok(parsed) = serde_json::from_str::<OpenAIShape>(body)
        && let Some(choice) = parsed.choices.into_iter().next()
        && let Some(msg) = choice.message
        && let Some(content) = msg.content
    {
        return content;
    }

    if let Ok(parsed) = serde_json::from_str::<ContentOnly>(body) {
        return parsed.content;
    }

    // Fallback to raw body
    body.to_string()
}

#[async_trait]
impl LLMBackend for EndpointClient {
    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> CompletionResult<String> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
        messages.extend(request.turns.iter().map(|turn| WireMessage {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            },
            content: &turn.content,
        }));

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&ChatCompletionRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .map_err(|e| CompletionError::UpstreamFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::UpstreamFailure(e.to_string()))?;
        debug!(%status, bytes = body.len(), "chat endpoint responded");

        if status == StatusCode::UNAUTHORIZED {
            return Err(CompletionError::CredentialRejected);
        }
        if !status.is_success() {
            return Err(CompletionError::UpstreamFailure(format!(
                "LLM endpoint error {status}: {body}"
            )));
        }

        Ok(extract_content(&body))
    }
}
