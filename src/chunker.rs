//! Incremental delivery of an already complete response.
//!
//! The provider answers in one piece; the chunker replays that answer to a
//! sink word by word so the consumer sees it being "typed".

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ai::MISSING_KEY_MARKER;
use crate::config::{DEFAULT_CHUNK_DELAY, Settings};

/// Receiver of a chunked response.
pub trait ChunkSink {
    fn on_chunk(&mut self, chunk: &str);

    /// Called exactly once per delivery, with everything emitted.
    fn on_complete(&mut self, full_text: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkEvent {
    Chunk(String),
    Done(String),
}

/// Forwards chunks over a channel. A closed receiver cancels the delivery.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ChunkEvent>,
    cancel: CancellationToken,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ChunkEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    fn send(&self, event: ChunkEvent) {
        if self.tx.send(event).is_err() {
            self.cancel.cancel();
        }
    }
}

impl ChunkSink for ChannelSink {
    fn on_chunk(&mut self, chunk: &str) {
        self.send(ChunkEvent::Chunk(chunk.to_string()));
    }

    fn on_complete(&mut self, full_text: &str) {
        self.send(ChunkEvent::Done(full_text.to_string()));
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ResponseChunker {
    pacing: Duration,
}

impl Default for ResponseChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_DELAY)
    }
}

impl ResponseChunker {
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.chunk_delay)
    }

    /// Replay `full_text` to `sink` one whitespace-delimited token at a time.
    ///
    /// Cancellation is checked before each token only; a pacing sleep that has
    /// started runs to the end. Returns the accumulated text, which is also
    /// what `on_complete` receives.
    pub async fn deliver<S>(&self, full_text: &str, cancel: &CancellationToken, sink: &mut S) -> String
    where
        S: ChunkSink + ?Sized,
    {
        if full_text.contains(MISSING_KEY_MARKER) {
            sink.on_chunk(full_text);
            sink.on_complete(full_text);
            return full_text.to_string();
        }

        let mut accumulated = String::with_capacity(full_text.len() + 1);
        let mut emitted = 0usize;
        for token in full_text.split_whitespace() {
            if cancel.is_cancelled() {
                debug!(emitted, "response delivery cancelled");
                break;
            }
            tokio::time::sleep(self.pacing).await;
            let chunk = format!("{token} ");
            sink.on_chunk(&chunk);
            accumulated.push_str(&chunk);
            emitted += 1;
        }

        sink.on_complete(&accumulated);
        accumulated
    }
}
