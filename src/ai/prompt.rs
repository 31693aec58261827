//! Prompt construction. Pure functions, no I/O.

use serde::Serialize;

use crate::analysis::AnalysisKind;
use crate::types::{Message, Role, Turn};

const PERSONA: &str = "You are FLOAT AI, an assistant integrated into a Personal Knowledge Management system.
Your purpose is to help the user explore their thoughts, identify patterns, and discover insights.
Be thoughtful, nuanced, and help surface connections between ideas.";

const RECENT_THEME_COUNT: usize = 3;
const THEME_SEPARATOR: &str = " | ";

const INSIGHTS_INSTRUCTIONS: &str = r#"Identify key insights from the user's thoughts. Look for underlying themes, novel ideas, and potential breakthroughs.
Format your response as a JSON array of insight objects with the following structure:
[
  {
    "text": "The insight in a clear, concise sentence",
    "confidence": 85, // A number between 50-100 indicating confidence
    "tags": ["relevant", "tags"],
    "explanation": "A brief explanation of why this is insightful"
  }
]
Provide 3-5 insights based on the available data. IMPORTANT: Return ONLY the raw JSON array without any markdown formatting or code blocks."#;

const PATTERNS_INSTRUCTIONS: &str = r#"Identify recurring patterns in the user's thoughts. Look for repeated themes, approaches, or mental models.
Format your response as a JSON array of pattern objects with the following structure:
[
  {
    "summary": "A concise description of the pattern",
    "messages": [
      { "excerpt": "A relevant excerpt from their thoughts" }
    ],
    "tags": ["relevant", "tags"],
    "explanation": "Why this pattern is significant"
  }
]
Provide 2-4 patterns based on the available data. IMPORTANT: Return ONLY the raw JSON array without any markdown formatting or code blocks."#;

const CONTRADICTIONS_INSTRUCTIONS: &str = r#"Identify potential contradictions or tensions in the user's thoughts. Look for ideas that might be in conflict.
Format your response as a JSON array of contradiction objects with the following structure:
[
  {
    "summary": "A concise description of the contradiction",
    "statement1": { "text": "The first contradictory statement" },
    "statement2": { "text": "The second contradictory statement" },
    "explanation": "Why these statements might be in tension and how this tension might be productive"
  }
]
Provide 1-3 contradictions based on the available data. If you can't find any real contradictions, return an empty array. IMPORTANT: Return ONLY the raw JSON array without any markdown formatting or code blocks."#;

/// System prompt for a chat completion.
pub fn build_system_prompt(messages: &[Message], tags: &[String]) -> String {
    let mut prompt = PERSONA.to_string();

    if !tags.is_empty() {
        prompt.push_str(&format!(
            "\n\nThe user has organized their thoughts with the following tags: {}.",
            tags.join(", ")
        ));
    }

    let user_messages: Vec<&Message> = messages.iter().filter(|m| m.is_user()).collect();
    if !user_messages.is_empty() {
        prompt.push_str(&format!(
            "\n\nThe user has shared {} thoughts in this space.",
            user_messages.len()
        ));

        if user_messages.len() >= RECENT_THEME_COUNT {
            let recent = user_messages[user_messages.len() - RECENT_THEME_COUNT..]
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(THEME_SEPARATOR);
            prompt.push_str(&format!(
                "\n\nRecent themes in their thinking include: {recent}"
            ));
        }
    }

    prompt
}

/// Conversation context for the provider: system messages dropped, order kept.
pub fn build_conversation_turns(messages: &[Message]) -> Vec<Turn> {
    messages
        .iter()
        .filter_map(|msg| match msg.role {
            Role::User => Some(Turn::user(&msg.content)),
            Role::Assistant => Some(Turn::assistant(&msg.content)),
            Role::System => None,
        })
        .collect()
}

pub fn analysis_system_prompt(kind: AnalysisKind) -> String {
    let instructions = match kind {
        AnalysisKind::Insights => INSIGHTS_INSTRUCTIONS,
        AnalysisKind::Patterns => PATTERNS_INSTRUCTIONS,
        AnalysisKind::Contradictions => CONTRADICTIONS_INSTRUCTIONS,
    };
    format!(
        "You are FLOAT AI, an assistant integrated into a Personal Knowledge Management system.
You are analyzing the user's thoughts to identify {kind}.\n\n{instructions}"
    )
}

#[derive(Serialize)]
struct AnalysisEntry<'a> {
    content: &'a str,
    tags: &'a [String],
}

/// The user's thoughts as a JSON array of `{content, tags}`.
pub fn analysis_payload(messages: &[Message]) -> String {
    let entries: Vec<AnalysisEntry<'_>> = messages
        .iter()
        .filter(|m| m.is_user())
        .map(|m| AnalysisEntry {
            content: &m.content,
            tags: &m.tags,
        })
        .collect();
    // A Vec of plain string structs always serializes.
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}
