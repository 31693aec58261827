use async_trait::async_trait;
use rig::client::CompletionClient as _;
use rig::completion::Chat;
use rig::providers::openai;

use super::{CompletionRequest, LLMBackend};
use crate::ai::client::{CompletionError, CompletionResult, classify_provider_error};
use crate::types::{Turn, TurnRole};

/// Hosted OpenAI chat through Rig. A Rig client is built per call so the
/// credential is never cached.
pub struct OpenAIClient {
    model: String,
}

impl OpenAIClient {
    pub fn new(model: String) -> Self {
        Self { model }
    }
}

fn to_rig_message(turn: &Turn) -> rig::message::Message {
    match turn.role {
        TurnRole::User => rig::message::Message::user(&turn.content),
        TurnRole::Assistant => rig::message::Message::assistant(&turn.content),
    }
}

#[async_trait]
impl LLMBackend for OpenAIClient {
    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> CompletionResult<String> {
        // Rig takes the newest turn as the prompt and the rest as history.
        let (last, history) = request.turns.split_last().ok_or_else(|| {
            CompletionError::UpstreamFailure("no conversation turns to send".to_string())
        })?;
        let history = history.iter().map(to_rig_message).collect::<Vec<_>>();

        let client = openai::Client::new(api_key);
        let agent = client.agent(&self.model).preamble(&request.system).build();

        agent
            .chat(to_rig_message(last), history)
            .await
            .map_err(|err| classify_provider_error(&err.to_string()))
    }
}
