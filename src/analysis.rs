//! Structured analysis of the user's thoughts.
//!
//! Three independent completions (insights, patterns, contradictions) are
//! requested concurrently. Each answer is parsed on its own; a bad answer
//! empties its own category and nothing else.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::ai::CompletionClient;
use crate::types::Message;

const MIN_CONFIDENCE: u8 = 50;
const MAX_CONFIDENCE: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Insights,
    Patterns,
    Contradictions,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [Self::Insights, Self::Patterns, Self::Contradictions];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insights => "insights",
            Self::Patterns => "patterns",
            Self::Contradictions => "contradictions",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown analysis kind: {0}")]
pub struct UnknownAnalysisKind(pub String);

impl FromStr for AnalysisKind {
    type Err = UnknownAnalysisKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownAnalysisKind(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub text: String,
    #[serde(deserialize_with = "confidence_in_range")]
    pub confidence: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excerpt {
    pub excerpt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub summary: String,
    pub messages: Vec<Excerpt>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    pub summary: String,
    pub statement1: Statement,
    pub statement2: Statement,
    #[serde(default)]
    pub explanation: String,
}

/// Result of one analysis run. Replaces the previous report wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub insights: Vec<Insight>,
    pub patterns: Vec<Pattern>,
    pub contradictions: Vec<Contradiction>,
    #[serde(with = "time::serde::rfc3339")]
    pub analyzed_at: OffsetDateTime,
}

fn confidence_in_range<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() {
        return Ok(MIN_CONFIDENCE);
    }
    let clamped = raw
        .round()
        .clamp(f64::from(MIN_CONFIDENCE), f64::from(MAX_CONFIDENCE));
    Ok(clamped as u8)
}

/// Remove a surrounding markdown code fence, if there is one.
///
/// The opening fence may carry a language tag (```` ```json ````).
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }

    text
}

/// Parse one category's answer.
///
/// An answer that is not a JSON array becomes an empty list. Inside a valid
/// array, items that do not fit `T` are skipped and the rest are kept.
pub fn parse_analysis<T: DeserializeOwned>(kind: AnalysisKind, raw: &str) -> Vec<T> {
    let items = match serde_json::from_str::<Vec<serde_json::Value>>(strip_code_fence(raw)) {
        Ok(items) => items,
        Err(err) => {
            warn!(%kind, "error parsing analysis: {err}");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            serde_json::from_value(item)
                .inspect_err(|err| warn!(%kind, index, "skipping analysis item: {err}"))
                .ok()
        })
        .collect()
}

/// Run all three analyses concurrently and wait for every one of them.
pub async fn run_analysis(client: &CompletionClient, messages: &[Message]) -> AnalysisReport {
    info!(messages = messages.len(), "running analysis");
    let (insights, patterns, contradictions) = futures::join!(
        client.analyze(messages, AnalysisKind::Insights),
        client.analyze(messages, AnalysisKind::Patterns),
        client.analyze(messages, AnalysisKind::Contradictions),
    );

    AnalysisReport {
        insights: parse_analysis(AnalysisKind::Insights, &insights),
        patterns: parse_analysis(AnalysisKind::Patterns, &patterns),
        contradictions: parse_analysis(AnalysisKind::Contradictions, &contradictions),
        analyzed_at: OffsetDateTime::now_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{CompletionRequest, CompletionResult, CredentialSource, LLMBackend};
    use crate::types::Role;
    use async_trait::async_trait;

    const INSIGHTS: &str = r#"[{"text":"You value structure","confidence":85,"tags":["work"],"explanation":"Repeated mentions"}]"#;
    const CONTRADICTIONS: &str = r#"[{"summary":"Deadline ambivalence","statement1":{"text":"I love deadlines"},"statement2":{"text":"Deadlines stress me out"},"explanation":"..."}]"#;

    /// Answers by analysis kind, keyed off the system prompt.
    struct KindBackend {
        insights: &'static str,
        patterns: &'static str,
        contradictions: &'static str,
    }

    #[async_trait]
    impl LLMBackend for KindBackend {
        async fn complete(
            &self,
            _api_key: &str,
            request: &CompletionRequest,
        ) -> CompletionResult<String> {
            let answer = if request.system.contains("identify insights") {
                self.insights
            } else if request.system.contains("identify patterns") {
                self.patterns
            } else {
                self.contradictions
            };
            Ok(answer.to_string())
        }
    }

    fn client(backend: KindBackend) -> CompletionClient {
        CompletionClient::new(
            backend,
            CredentialSource::Fixed(Some("sk-test-0123456789abcdefghij".to_string())),
        )
    }

    fn deadline_messages() -> Vec<Message> {
        vec![
            Message::new("1", Role::User, "I love deadlines"),
            Message::new("2", Role::User, "Deadlines stress me out"),
        ]
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in AnalysisKind::ALL {
            assert_eq!(kind.as_str().parse::<AnalysisKind>(), Ok(kind));
        }
        assert!("summaries".parse::<AnalysisKind>().is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\n[]\n```\n"), "[]");
        assert_eq!(strip_code_fence("  [3]  "), "[3]");
    }

    #[test]
    fn test_fenced_and_bare_arrays_parse_identically() {
        let fenced = format!("```json\n{CONTRADICTIONS}\n```");
        let bare: Vec<Contradiction> = parse_analysis(AnalysisKind::Contradictions, CONTRADICTIONS);
        let unwrapped: Vec<Contradiction> = parse_analysis(AnalysisKind::Contradictions, &fenced);
        assert_eq!(bare.len(), 1);
        assert_eq!(bare, unwrapped);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let raw = r#"[
            {"text":"a","confidence":12,"tags":[],"explanation":""},
            {"text":"b","confidence":140,"tags":[],"explanation":""},
            {"text":"c","confidence":72.6,"tags":[],"explanation":""}
        ]"#;
        let insights: Vec<Insight> = parse_analysis(AnalysisKind::Insights, raw);
        let confidences: Vec<u8> = insights.iter().map(|i| i.confidence).collect();
        assert_eq!(confidences, vec![50, 100, 73]);
    }

    #[test]
    fn test_bad_items_are_skipped_individually() {
        let raw = r#"[
            {"text":"You value structure","confidence":85,"tags":["work"],"explanation":"ok"},
            {"text":"Quoted confidence","confidence":"90","tags":[],"explanation":""},
            {"confidence":70}
        ]"#;
        let insights: Vec<Insight> = parse_analysis(AnalysisKind::Insights, raw);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].text, "You value structure");

        let raw = r#"[
            {"summary":"No statements"},
            {"summary":"Deadline ambivalence","statement1":{"text":"I love deadlines"},"statement2":{"text":"Deadlines stress me out"}}
        ]"#;
        let contradictions: Vec<Contradiction> = parse_analysis(AnalysisKind::Contradictions, raw);
        assert_eq!(contradictions.len(), 1);
        assert_eq!(contradictions[0].summary, "Deadline ambivalence");
    }

    #[test]
    fn test_wrong_shape_is_empty() {
        let patterns: Vec<Pattern> = parse_analysis(AnalysisKind::Patterns, INSIGHTS);
        assert!(patterns.is_empty());
        let patterns: Vec<Pattern> = parse_analysis(AnalysisKind::Patterns, "not json");
        assert!(patterns.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_category_is_isolated() {
        let client = client(KindBackend {
            insights: INSIGHTS,
            patterns: "[{\"summary\": \"cut off",
            contradictions: CONTRADICTIONS,
        });
        let report = run_analysis(&client, &deadline_messages()).await;

        assert_eq!(report.insights.len(), 1);
        assert!(report.patterns.is_empty());
        assert_eq!(report.contradictions.len(), 1);
    }

    #[tokio::test]
    async fn test_contradiction_fields_are_verbatim() {
        let client = client(KindBackend {
            insights: "[]",
            patterns: "[]",
            contradictions: CONTRADICTIONS,
        });
        let report = run_analysis(&client, &deadline_messages()).await;

        assert_eq!(report.contradictions.len(), 1);
        let found = &report.contradictions[0];
        assert_eq!(found.summary, "Deadline ambivalence");
        assert_eq!(found.statement1.text, "I love deadlines");
        assert_eq!(found.statement2.text, "Deadlines stress me out");
    }
}
