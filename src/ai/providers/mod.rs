pub mod endpoint;
pub mod openai;

use async_trait::async_trait;

use super::client::CompletionResult;
use crate::config::Settings;
use crate::types::Turn;

pub use endpoint::EndpointClient;
pub use openai::OpenAIClient;

/// One outgoing completion: a system prompt plus ordered turns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub turns: Vec<Turn>,
}

/// A transport able to run a single completion.
#[async_trait]
pub trait LLMBackend: Send + Sync {
    async fn complete(&self, api_key: &str, request: &CompletionRequest)
    -> CompletionResult<String>;
}

/// Enum to hold the configured provider
pub enum ProviderClient {
    OpenAI(OpenAIClient),
    Endpoint(EndpointClient),
}

impl ProviderClient {
    /// Priority order:
    /// 1. FLOAT_LLM_ENDPOINT → OpenAI-compatible chat-completions endpoint
    /// 2. otherwise → hosted OpenAI via Rig
    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.endpoint {
            Some(endpoint) => {
                Self::Endpoint(EndpointClient::new(endpoint.clone(), settings.model.clone()))
            }
            None => Self::OpenAI(OpenAIClient::new(settings.model.clone())),
        }
    }
}

#[async_trait]
impl LLMBackend for ProviderClient {
    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> CompletionResult<String> {
        match self {
            Self::OpenAI(client) => client.complete(api_key, request).await,
            Self::Endpoint(client) => client.complete(api_key, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_takes_priority() {
        let settings = Settings {
            endpoint: Some("http://localhost:9/v1/chat/completions".to_string()),
            ..Settings::default()
        };
        assert!(matches!(
            ProviderClient::from_settings(&settings),
            ProviderClient::Endpoint(_)
        ));
        assert!(matches!(
            ProviderClient::from_settings(&Settings::default()),
            ProviderClient::OpenAI(_)
        ));
    }
}
