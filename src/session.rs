//! Conversation store.
//!
//! A `Session` is the single owner of the message list and the tag list.
//! Every change goes through one of its methods; messages are only ever
//! appended.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ai::{CompletionClient, UPSTREAM_ADVISORY};
use crate::chunker::{ChunkSink, ResponseChunker};
use crate::types::{Message, Role, Tag};

pub const WELCOME_MESSAGE: &str = "Welcome to FLOAT - your personal knowledge management system. I'm your AI assistant, ready to help you explore your thoughts and ideas.";
pub const DEFAULT_TAGS: [&str; 6] = ["idea", "question", "insight", "task", "reference", "ai-insight"];
pub const INSIGHT_TAG: &str = "ai-insight";

const MIN_MESSAGES_FOR_ANALYSIS: usize = 2;

/// Filter for [`Session::search`]. Empty fields match everything.
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    pub text: String,
    pub tags: Vec<String>,
}

impl SearchQuery {
    pub fn matches(&self, message: &Message) -> bool {
        let text = self.text.to_lowercase();
        let matches_text = text.is_empty() || message.content.to_lowercase().contains(&text);
        let matches_tags = self.tags.iter().all(|tag| message.has_tag(tag));
        matches_text && matches_tags
    }
}

#[derive(Debug)]
pub struct Session {
    messages: Vec<Message>,
    tags: Vec<Tag>,
    next_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session: welcome message plus the default tags.
    pub fn new() -> Self {
        let mut session = Self::empty();
        for tag in DEFAULT_TAGS {
            session.add_tag(tag);
        }
        session.push(Role::Assistant, WELCOME_MESSAGE, Vec::<String>::new());
        session
    }

    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            tags: Vec::new(),
            next_id: 1,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Returns `false` when a tag with that name already exists.
    pub fn add_tag(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.tags.iter().any(|t| t.name == name) {
            return false;
        }
        self.tags.push(Tag::new(name));
        true
    }

    /// Append a user message.
    pub fn submit_message(&mut self, text: &str, tags: &[String]) -> &Message {
        self.push(Role::User, text, tags.iter().cloned())
    }

    /// Append the assistant's finished response. Blank responses (for example
    /// a stream cancelled before its first word) are not recorded.
    pub fn complete_response(&mut self, full_text: &str) -> Option<&Message> {
        let content = full_text.trim();
        if content.is_empty() {
            return None;
        }
        Some(self.push(Role::Assistant, content, Vec::<String>::new()))
    }

    /// Record an analysis result the user chose to explore.
    pub fn select_insight(&mut self, insight: &str) -> &Message {
        let content = format!("AI suggested insight: {insight}");
        self.push(Role::User, &content, [INSIGHT_TAG])
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<&Message> {
        self.messages.iter().filter(|m| query.matches(m)).collect()
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    pub fn can_analyze(&self) -> bool {
        self.user_message_count() >= MIN_MESSAGES_FOR_ANALYSIS
    }

    /// One full user turn: record the message, fetch the completion, replay it
    /// to `sink`, record the answer.
    ///
    /// The completion runs in its own task. Cancelling `cancel` stops the
    /// replay at the next word boundary but lets the request finish in the
    /// background.
    pub async fn send<S>(
        &mut self,
        client: &CompletionClient,
        chunker: &ResponseChunker,
        text: &str,
        tags: &[String],
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Option<&Message>
    where
        S: ChunkSink + ?Sized,
    {
        if text.trim().is_empty() {
            return None;
        }
        self.submit_message(text, tags);
        info!(messages = self.messages.len(), "user message submitted");

        let history = self.messages.clone();
        let tag_names = self.tag_names();
        let client = client.clone();
        let request = tokio::spawn(async move { client.reply(&history, &tag_names).await });
        let reply = match request.await {
            Ok(reply) => reply,
            Err(err) => {
                error!("completion task failed: {err}");
                UPSTREAM_ADVISORY.to_string()
            }
        };

        let delivered = chunker.deliver(&reply, cancel, sink).await;
        self.complete_response(&delivered)
    }

    fn push<I, S>(&mut self, role: Role, content: &str, tags: I) -> &Message
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.messages
            .push(Message::new(id, role, content).with_tags(tags));
        &self.messages[self.messages.len() - 1]
    }
}
