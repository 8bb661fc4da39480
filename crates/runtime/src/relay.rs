//! Streaming relay between a chat client and a consumer of updates.

use crate::model::{ChatClient, Message, ToolSpec, Update};
use crate::{Error, Result};
use futures::StreamExt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receives updates as the relay pulls them from the stream.
///
/// The relay awaits each call before asking for the next update, so a slow
/// sink slows the stream rather than buffering it.
pub trait UpdateSink: Send {
    fn on_update(&mut self, update: &Update) -> impl Future<Output = ()> + Send;
}

/// Drives streaming completions and forwards their updates.
pub struct Relay<C> {
    client: C,
}

impl<C: ChatClient> Relay<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Stream a response for `messages` with `tools` attached.
    ///
    /// Each update is handed to `sink` in order. Returns the concatenated text
    /// of every update once the stream is exhausted. Backend failures end the
    /// stream with [`Error::CompletionFailed`]; a fired `cancel` token ends it
    /// with [`Error::Cancelled`]. Nothing is retried.
    pub async fn stream<S: UpdateSink>(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<String> {
        let mut updates = self.client.stream_response(messages, tools);
        let mut text = String::new();
        let mut count = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(updates = count, "relay cancelled");
                    return Err(Error::Cancelled);
                }
                next = updates.next() => next,
            };

            let Some(update) = next else {
                break;
            };
            let update = update.map_err(|e| Error::CompletionFailed(e.to_string()))?;

            text.push_str(&update.text);
            count += 1;
            sink.on_update(&update).await;
        }

        debug!(updates = count, chars = text.len(), "relay finished");
        Ok(text)
    }
}
