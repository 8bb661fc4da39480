//! Per-request orchestration of a chat turn.

use crate::outbox::Outbox;
use crate::protocol::ServerEvent;
use runtime::{
    Assembler, ChatClient, Error as RuntimeError, Relay, ToolDirectory, ToolHost, Update,
    UpdateSink,
};
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One `sendMessage` invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub user: String,
    pub message: String,
    pub history: Vec<Value>,
}

/// Where a turn currently is. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Listing,
    Assembling,
    Streaming,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listing => "listing",
            Self::Assembling => "assembling",
            Self::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Entry point for client invocations.
///
/// Holds no per-turn state, so one endpoint can serve any number of turns
/// concurrently. A failed turn never affects the next one.
pub struct ChatEndpoint<H, C> {
    directory: ToolDirectory<H>,
    assembler: Assembler,
    relay: Relay<C>,
}

impl<H, C> ChatEndpoint<H, C>
where
    H: ToolHost,
    C: ChatClient,
{
    pub fn new(directory: ToolDirectory<H>, assembler: Assembler, relay: Relay<C>) -> Self {
        Self {
            directory,
            assembler,
            relay,
        }
    }

    /// Run one chat turn, streaming the reply to the outbox audience.
    ///
    /// Every failure is reported as a `receiveMessage` from the system sender
    /// after the typing indicator has been cleared. Cancellation clears the
    /// indicator without reporting an error.
    pub async fn send_message<O: Outbox>(
        &self,
        outbox: &O,
        turn: ChatTurn,
        cancel: &CancellationToken,
    ) {
        let ChatTurn {
            user,
            message,
            history,
        } = turn;
        info!(%user, history = history.len(), "chat turn started");

        let mut phase = TurnPhase::Idle;
        match self
            .run_turn(outbox, &message, &history, cancel, &mut phase)
            .await
        {
            Ok(text) => {
                outbox.all(ServerEvent::typing(false)).await;
                info!(%user, chars = text.len(), "chat turn finished");
            }
            Err(RuntimeError::Cancelled) => {
                outbox.all(ServerEvent::typing(false)).await;
                info!(%user, %phase, "chat turn cancelled");
            }
            Err(error) => {
                warn!(%user, %phase, %error, "chat turn failed");
                outbox.all(ServerEvent::typing(false)).await;
                outbox
                    .all(ServerEvent::system(format!("Error: {error}")))
                    .await;
            }
        }
    }

    async fn run_turn<O: Outbox>(
        &self,
        outbox: &O,
        message: &str,
        history: &[Value],
        cancel: &CancellationToken,
        phase: &mut TurnPhase,
    ) -> runtime::Result<String> {
        *phase = TurnPhase::Listing;
        let tools = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            tools = self.directory.list_tools() => tools?,
        };

        *phase = TurnPhase::Assembling;
        let messages = self.assembler.assemble(history, message);
        debug!(messages = messages.len(), tools = tools.len(), "turn assembled");

        *phase = TurnPhase::Streaming;
        outbox.all(ServerEvent::typing(true)).await;
        let mut forward = Forward { outbox };
        self.relay.stream(messages, tools, cancel, &mut forward).await
    }

    /// Reply to the caller with the names of the current tools.
    pub async fn get_available_tools<O: Outbox>(&self, outbox: &O) {
        match self.directory.tool_names().await {
            Ok(names) => {
                debug!(count = names.len(), "listing tools for caller");
                outbox.caller(ServerEvent::tools(names)).await;
            }
            Err(error) => {
                warn!(%error, "tool listing failed");
                outbox
                    .caller(ServerEvent::system(format!("Error getting tools: {error}")))
                    .await;
            }
        }
    }
}

/// Forwards each update as a `receiveMessageStream` event.
struct Forward<'a, O> {
    outbox: &'a O,
}

impl<O: Outbox> UpdateSink for Forward<'_, O> {
    async fn on_update(&mut self, update: &Update) {
        self.outbox
            .all(ServerEvent::fragment(update.text.clone()))
            .await;
    }
}
