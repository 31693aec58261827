use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use super::prompt::{
    analysis_payload, analysis_system_prompt, build_conversation_turns, build_system_prompt,
};
use super::providers::{CompletionRequest, LLMBackend, ProviderClient};
use crate::analysis::AnalysisKind;
use crate::config::{self, Settings};
use crate::types::{Message, Turn};

// ============================================
// Error Types
// ============================================

pub const MISSING_KEY_ADVISORY: &str =
    "⚠️ OpenAI API key is missing. Please add your OPENAI_API_KEY to your environment variables.";
pub const MALFORMED_KEY_ADVISORY: &str =
    "⚠️ Invalid OpenAI API key format. Please check your environment variables.";
pub const REJECTED_KEY_ADVISORY: &str = "⚠️ Incorrect API key provided. Please check your OpenAI API key in your environment variables.";
pub const UPSTREAM_ADVISORY: &str =
    "I'm having trouble processing that right now. Please try again.";

/// Marker shared by the missing-key advisory; the chunker keys off it.
pub const MISSING_KEY_MARKER: &str = "OpenAI API key is missing";

const KEY_PREFIX: &str = "sk-";
const KEY_MIN_LEN_EXCLUSIVE: usize = 20;
const KEY_PLACEHOLDER: &str = "your_api_key_here";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("OpenAI API key is missing")]
    CredentialMissing,

    #[error("Invalid OpenAI API key format")]
    CredentialMalformed,

    #[error("Incorrect API key provided")]
    CredentialRejected,

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),
}

impl CompletionError {
    /// User-facing replacement for the error.
    pub fn advisory(&self) -> &'static str {
        match self {
            Self::CredentialMissing => MISSING_KEY_ADVISORY,
            Self::CredentialMalformed => MALFORMED_KEY_ADVISORY,
            Self::CredentialRejected => REJECTED_KEY_ADVISORY,
            Self::UpstreamFailure(_) => UPSTREAM_ADVISORY,
        }
    }

    pub fn is_credential_issue(&self) -> bool {
        !matches!(self, Self::UpstreamFailure(_))
    }
}

pub type CompletionResult<T> = Result<T, CompletionError>;

/// Structural check only; the upstream service has the final word.
pub fn validate_credential(key: &str) -> CompletionResult<()> {
    if key.starts_with(KEY_PREFIX)
        && key.chars().count() > KEY_MIN_LEN_EXCLUSIVE
        && !key.contains(KEY_PLACEHOLDER)
    {
        Ok(())
    } else {
        Err(CompletionError::CredentialMalformed)
    }
}

/// Where the client looks for the credential on every call.
#[derive(Clone, Debug)]
pub enum CredentialSource {
    /// `OPENAI_API_KEY`, re-read per call.
    Environment,
    Fixed(Option<String>),
}

impl CredentialSource {
    fn resolve(&self) -> CompletionResult<String> {
        let key = match self {
            Self::Environment => config::credential_from_env(),
            Self::Fixed(key) => key.clone().filter(|k| !k.trim().is_empty()),
        };
        let key = key.ok_or(CompletionError::CredentialMissing)?;
        validate_credential(&key)?;
        Ok(key)
    }
}

/// Entry point for every completion the application makes.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn LLMBackend>,
    credential: CredentialSource,
}

impl CompletionClient {
    /// Client for the provider selected by `settings`, with the credential
    /// taken from the environment at call time.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ProviderClient::from_settings(settings),
            CredentialSource::Environment,
        )
    }

    pub fn new(backend: impl LLMBackend + 'static, credential: CredentialSource) -> Self {
        Self {
            backend: Arc::new(backend),
            credential,
        }
    }

    /// Chat completion over the conversation so far. Exactly one attempt.
    pub async fn complete(&self, history: &[Message], tags: &[String]) -> CompletionResult<String> {
        info!(messages = history.len(), "generating AI response");
        let api_key = self.credential.resolve().inspect_err(|err| {
            error!("cannot create completion client: {err}");
        })?;

        let request = CompletionRequest {
            system: build_system_prompt(history, tags),
            turns: build_conversation_turns(history),
        };
        self.backend
            .complete(&api_key, &request)
            .await
            .inspect_err(|err| error!("error generating AI response: {err}"))
    }

    /// Like [`complete`](Self::complete), but failures come back as advisory text.
    pub async fn reply(&self, history: &[Message], tags: &[String]) -> String {
        match self.complete(history, tags).await {
            Ok(text) => text,
            Err(err) => err.advisory().to_string(),
        }
    }

    /// Raw analysis answer for one kind: a JSON array, possibly fence-wrapped.
    ///
    /// Never fails. A credential problem on the insights kind is reported as a
    /// single insight so it shows up in the analysis panel; everything else
    /// degrades to `[]`.
    pub async fn analyze(&self, history: &[Message], kind: AnalysisKind) -> String {
        match self.request_analysis(history, kind).await {
            Ok(text) => text,
            Err(err) if err.is_credential_issue() && kind == AnalysisKind::Insights => {
                warn!(%kind, "analysis skipped: {err}");
                json!([{
                    "text": "OpenAI API key issue. Please check your API key configuration.",
                    "confidence": 100,
                    "tags": ["error"],
                    "explanation": "API key configuration issue"
                }])
                .to_string()
            }
            Err(err) => {
                error!(%kind, "error generating analysis: {err}");
                "[]".to_string()
            }
        }
    }

    async fn request_analysis(
        &self,
        history: &[Message],
        kind: AnalysisKind,
    ) -> CompletionResult<String> {
        let api_key = self.credential.resolve()?;
        let request = CompletionRequest {
            system: analysis_system_prompt(kind),
            turns: vec![Turn::user(analysis_payload(history))],
        };
        debug!(%kind, "requesting analysis");
        self.backend.complete(&api_key, &request).await
    }
}

/// Phrases that mark an authentication failure in provider error text.
const REJECTION_PHRASES: [&str; 5] = [
    "incorrect api key provided",
    "invalid_api_key",
    "401 unauthorized",
    "status code: 401",
    "status: 401",
];

/// Map provider error text onto the taxonomy.
pub(crate) fn classify_provider_error(message: &str) -> CompletionError {
    let lowered = message.to_ascii_lowercase();
    if REJECTION_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        CompletionError::CredentialRejected
    } else {
        CompletionError::UpstreamFailure(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, TurnRole};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const GOOD_KEY: &str = "sk-test-0123456789abcdefghij";

    #[derive(Default)]
    struct RecordingBackend {
        requests: Mutex<Vec<CompletionRequest>>,
        reply: Option<CompletionResult<String>>,
    }

    impl RecordingBackend {
        fn replying(reply: CompletionResult<String>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                reply: Some(reply),
            }
        }
    }

    #[async_trait]
    impl LLMBackend for Arc<RecordingBackend> {
        async fn complete(
            &self,
            _api_key: &str,
            request: &CompletionRequest,
        ) -> CompletionResult<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone().unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    fn client(backend: &Arc<RecordingBackend>, key: Option<&str>) -> CompletionClient {
        CompletionClient::new(
            backend.clone(),
            CredentialSource::Fixed(key.map(str::to_string)),
        )
    }

    #[test]
    fn test_validate_credential() {
        assert!(validate_credential(GOOD_KEY).is_ok());
        assert_eq!(
            validate_credential("pk-0123456789abcdefghijkl"),
            Err(CompletionError::CredentialMalformed)
        );
        assert_eq!(
            validate_credential("sk-short"),
            Err(CompletionError::CredentialMalformed)
        );
        // exactly 20 characters is still too short
        assert_eq!(
            validate_credential("sk-01234567890123456"),
            Err(CompletionError::CredentialMalformed)
        );
        assert!(validate_credential("sk-012345678901234567").is_ok());
        assert_eq!(
            validate_credential("sk-your_api_key_here"),
            Err(CompletionError::CredentialMalformed)
        );
        assert_eq!(
            validate_credential("sk-your_api_key_here-padding-padding"),
            Err(CompletionError::CredentialMalformed)
        );
    }

    #[tokio::test]
    async fn test_missing_credential_fails_fast() {
        let backend = Arc::new(RecordingBackend::default());
        let err = client(&backend, None).complete(&[], &[]).await.unwrap_err();
        assert_eq!(err, CompletionError::CredentialMissing);

        let err = client(&backend, Some("   "))
            .complete(&[], &[])
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::CredentialMissing);
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_credential_fails_fast() {
        let backend = Arc::new(RecordingBackend::default());
        let reply = client(&backend, Some("not-a-key")).reply(&[], &[]).await;
        assert_eq!(reply, MALFORMED_KEY_ADVISORY);
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_sends_prompt_and_turns() {
        let backend = Arc::new(RecordingBackend::default());
        let history = vec![
            Message::new("1", Role::System, "hidden"),
            Message::new("2", Role::User, "first thought"),
            Message::new("3", Role::Assistant, "noted"),
        ];
        let tags = vec!["idea".to_string()];
        let text = client(&backend, Some(GOOD_KEY))
            .complete(&history, &tags)
            .await
            .unwrap();
        assert_eq!(text, "ok");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("following tags: idea."));
        assert_eq!(requests[0].turns.len(), 2);
        assert_eq!(requests[0].turns[0].role, TurnRole::User);
    }

    #[tokio::test]
    async fn test_reply_maps_errors_to_advisories() {
        let backend = Arc::new(RecordingBackend::replying(Err(
            CompletionError::CredentialRejected,
        )));
        let reply = client(&backend, Some(GOOD_KEY)).reply(&[], &[]).await;
        assert_eq!(reply, REJECTED_KEY_ADVISORY);

        let backend = Arc::new(RecordingBackend::replying(Err(
            CompletionError::UpstreamFailure("rate limited".into()),
        )));
        let reply = client(&backend, Some(GOOD_KEY)).reply(&[], &[]).await;
        assert_eq!(reply, UPSTREAM_ADVISORY);
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_sends_user_messages_only() {
        let backend = Arc::new(RecordingBackend::replying(Ok("[]".to_string())));
        let history = vec![
            Message::new("1", Role::Assistant, "welcome"),
            Message::new("2", Role::User, "deadlines").with_tags(["task"]),
        ];
        let raw = client(&backend, Some(GOOD_KEY))
            .analyze(&history, AnalysisKind::Patterns)
            .await;
        assert_eq!(raw, "[]");

        let requests = backend.requests.lock().unwrap();
        assert!(requests[0].system.contains("identify patterns"));
        let payload: serde_json::Value = serde_json::from_str(&requests[0].turns[0].content).unwrap();
        assert_eq!(
            payload,
            json!([{ "content": "deadlines", "tags": ["task"] }])
        );
    }

    #[tokio::test]
    async fn test_analyze_credential_issue() {
        let backend = Arc::new(RecordingBackend::default());
        let raw = client(&backend, None)
            .analyze(&[], AnalysisKind::Insights)
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["tags"], json!(["error"]));

        let raw = client(&backend, None)
            .analyze(&[], AnalysisKind::Contradictions)
            .await;
        assert_eq!(raw, "[]");
    }

    #[test]
    fn test_classify_provider_error() {
        assert_eq!(
            classify_provider_error("ProviderError: Incorrect API key provided: sk-abc"),
            CompletionError::CredentialRejected
        );
        assert_eq!(
            classify_provider_error("HttpError: HTTP status client error (401 Unauthorized)"),
            CompletionError::CredentialRejected
        );
        assert!(matches!(
            classify_provider_error("connection reset"),
            CompletionError::UpstreamFailure(_)
        ));
        // a number that merely contains 401 is not an auth failure
        assert!(matches!(
            classify_provider_error(
                "Request too large for gpt-4o: Limit 30000, Requested 40125 tokens"
            ),
            CompletionError::UpstreamFailure(_)
        ));
    }
}
