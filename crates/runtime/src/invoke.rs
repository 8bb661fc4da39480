//! Automatic tool invocation during streaming completions.
//!
//! [`FunctionInvoker`] wraps a [`Backend`] and a [`ToolHost`]. When a
//! streaming round ends with tool calls, the calls are executed, their
//! results appended to the conversation, and another round is started. The
//! caller sees a single stream of updates spanning every round.

use crate::model::{
    Backend, ChatClient, Message, ModelError, ModelRequest, Part, Role, ToolCall, ToolCallDelta,
    ToolResult, ToolSpec, Update,
};
use crate::tools::ToolHost;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rounds allowed per response before giving up on a tool-happy model.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Chat client that runs requested tools between backend rounds.
pub struct FunctionInvoker<B, H> {
    backend: B,
    tools: Arc<H>,
    max_rounds: usize,
}

impl<B, H> FunctionInvoker<B, H> {
    pub fn new(backend: B, tools: Arc<H>) -> Self {
        Self {
            backend,
            tools,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Set the maximum number of backend rounds per response (at least one).
    ///
    /// Tool calls requested in the last round are not executed; the response
    /// ends with [`ModelError::ToolRounds`] instead.
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }
}

impl<B, H> ChatClient for FunctionInvoker<B, H>
where
    B: Backend + 'static,
    H: ToolHost + 'static,
{
    fn stream_response(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
    ) -> BoxStream<'_, Result<Update, ModelError>> {
        Box::pin(async_stream::try_stream! {
            let mut messages = messages;

            for round in 1..=self.max_rounds {
                let request = ModelRequest {
                    messages: messages.clone(),
                    tools: tools.clone(),
                };
                let mut updates = self.backend.stream(request).await?;
                let mut pending = PendingCalls::default();
                let mut text = String::new();

                while let Some(update) = updates.next().await {
                    let update = update?;
                    text.push_str(&update.text);
                    pending.absorb(&update.tool_calls);
                    yield update;
                }

                let calls = pending.finish()?;
                if calls.is_empty() {
                    debug!(round, "completion finished");
                    return;
                }

                if round == self.max_rounds {
                    warn!(round, calls = calls.len(), "tool round limit reached; calls not run");
                    Err::<(), _>(ModelError::ToolRounds(self.max_rounds))?;
                }

                debug!(round, calls = calls.len(), "model requested tools");
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    results.push(self.invoke(call).await);
                }

                let mut parts = Vec::with_capacity(calls.len() + 1);
                if !text.is_empty() {
                    parts.push(Part::Text(text));
                }
                parts.extend(calls.into_iter().map(Part::ToolCall));
                messages.push(Message::from_parts(Role::Assistant, parts));
                messages.push(Message::tool_results(results));
            }
        })
    }
}

impl<B, H: ToolHost> FunctionInvoker<B, H> {
    /// Run one tool call; failures are reported back to the model, not raised.
    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(output) => {
                debug!(tool = %call.name, id = %call.id, "tool call succeeded");
                ToolResult::Success {
                    tool_call_id: call.id.clone(),
                    output,
                }
            }
            Err(error) => {
                warn!(tool = %call.name, id = %call.id, %error, "tool call failed");
                ToolResult::Failure {
                    tool_call_id: call.id.clone(),
                    error,
                }
            }
        }
    }
}

/// Tool calls being assembled from streamed fragments, keyed by index.
#[derive(Debug, Default)]
struct PendingCalls {
    calls: BTreeMap<usize, PendingCall>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PendingCalls {
    fn absorb(&mut self, deltas: &[ToolCallDelta]) {
        for delta in deltas {
            let call = self.calls.entry(delta.index).or_default();
            if let Some(id) = &delta.id {
                call.id = Some(id.clone());
            }
            if let Some(name) = &delta.name {
                call.name.push_str(name);
            }
            call.arguments.push_str(&delta.arguments);
        }
    }

    /// Complete the calls in index order.
    ///
    /// Arguments that are not valid JSON are kept as a raw string so the
    /// tool host can reject them and the model sees why.
    fn finish(self) -> Result<Vec<ToolCall>, ModelError> {
        self.calls
            .into_iter()
            .map(|(index, call)| {
                if call.name.is_empty() {
                    return Err(ModelError::InvalidResponse(format!(
                        "tool call {index} has no name"
                    )));
                }
                let input = if call.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.arguments)
                        .unwrap_or(Value::String(call.arguments))
                };
                Ok(ToolCall {
                    id: call.id.unwrap_or_else(|| format!("call_{index}")),
                    name: call.name,
                    input,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UpdateStream;
    use crate::tools::{EmptyToolHost, ToolError};
    use futures::stream;
    use serde_json::json;
    use std::sync::Mutex;

    /// Backend replaying one scripted round per call and recording requests.
    struct ScriptedBackend {
        rounds: Mutex<Vec<Vec<Result<Update, ModelError>>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedBackend {
        fn new(rounds: Vec<Vec<Result<Update, ModelError>>>) -> Self {
            Self {
                rounds: Mutex::new(rounds),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl Backend for Arc<ScriptedBackend> {
        async fn stream(&self, request: ModelRequest) -> Result<UpdateStream, ModelError> {
            self.requests.lock().unwrap().push(request);
            let round = self.rounds.lock().unwrap().remove(0);
            Ok(Box::pin(stream::iter(round)))
        }
    }

    struct FileHost;

    impl ToolHost for FileHost {
        async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
            Ok(Vec::new())
        }

        async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
            match call.name.as_str() {
                "list_directory" => Ok(Value::String("[FILE] notes.txt".into())),
                other => Err(ToolError::NotFound(other.into())),
            }
        }
    }

    fn call_delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> Update {
        Update {
            text: String::new(),
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(Into::into),
                name: name.map(Into::into),
                arguments: args.into(),
            }],
        }
    }

    async fn collect<C: ChatClient>(client: &C) -> Vec<Result<Update, ModelError>> {
        client
            .stream_response(vec![Message::user("list files")], Vec::new())
            .collect()
            .await
    }

    #[test]
    fn pending_calls_assemble_fragments() {
        let mut pending = PendingCalls::default();
        pending.absorb(&call_delta(0, Some("call_a"), Some("read_file"), "{\"pa").tool_calls);
        pending.absorb(&call_delta(1, None, Some("list_directory"), "").tool_calls);
        pending.absorb(&call_delta(0, None, None, "th\":\"a.txt\"}").tool_calls);

        let calls = pending.finish().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].input, json!({"path": "a.txt"}));
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].input, json!({}));
    }

    #[test]
    fn pending_calls_keep_broken_arguments() {
        let mut pending = PendingCalls::default();
        pending.absorb(&call_delta(0, Some("c"), Some("read_file"), "{\"path\":").tool_calls);

        let calls = pending.finish().unwrap();
        assert_eq!(calls[0].input, Value::String("{\"path\":".into()));
    }

    #[test]
    fn pending_call_without_name_is_invalid() {
        let mut pending = PendingCalls::default();
        pending.absorb(&call_delta(0, Some("c"), None, "{}").tool_calls);
        assert!(matches!(
            pending.finish(),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn plain_response_is_single_round() {
        let backend = Arc::new(ScriptedBackend::new(vec![vec![
            Ok(Update::from_text("Hello")),
            Ok(Update::from_text(" there")),
        ]]));
        let invoker = FunctionInvoker::new(Arc::clone(&backend), Arc::new(EmptyToolHost));

        let updates = collect(&invoker).await;
        assert_eq!(updates.len(), 2);
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tool_calls_trigger_another_round() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            vec![
                Ok(Update::from_text("Let me look. ")),
                Ok(call_delta(0, Some("call_1"), Some("list_directory"), "{\"path\":\".\"}")),
            ],
            vec![Ok(Update::from_text("You have notes.txt"))],
        ]));
        let invoker = FunctionInvoker::new(Arc::clone(&backend), Arc::new(FileHost));

        let text: String = collect(&invoker)
            .await
            .into_iter()
            .map(|u| u.unwrap().text)
            .collect();
        assert_eq!(text, "Let me look. You have notes.txt");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[1].text(), "Let me look. ");
        assert_eq!(second[1].tool_calls()[0].name, "list_directory");
        assert_eq!(second[2].results()[0].content(), "[FILE] notes.txt");
    }

    #[tokio::test]
    async fn failed_tool_is_reported_to_model() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            vec![Ok(call_delta(0, Some("call_1"), Some("format_disk"), "{}"))],
            vec![Ok(Update::from_text("I can't do that."))],
        ]));
        let invoker = FunctionInvoker::new(Arc::clone(&backend), Arc::new(FileHost));

        let updates = collect(&invoker).await;
        assert!(updates.iter().all(Result::is_ok));

        let requests = backend.requests.lock().unwrap();
        let result = requests[1].messages[2].results()[0].clone();
        assert!(matches!(result, ToolResult::Failure { .. }));
        assert_eq!(result.content(), "tool not found: format_disk");
    }

    #[tokio::test]
    async fn round_limit_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            vec![Ok(call_delta(0, Some("a"), Some("list_directory"), "{}"))],
            vec![Ok(call_delta(0, Some("b"), Some("list_directory"), "{}"))],
        ]));
        let invoker =
            FunctionInvoker::new(Arc::clone(&backend), Arc::new(FileHost)).max_rounds(2);

        let updates = collect(&invoker).await;
        assert!(matches!(
            updates.last(),
            Some(Err(ModelError::ToolRounds(2)))
        ));
    }

    /// Host counting every execution it is asked for.
    #[derive(Default)]
    struct CountingHost {
        executed: std::sync::atomic::AtomicUsize,
    }

    impl ToolHost for CountingHost {
        async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
            Ok(Vec::new())
        }

        async fn execute(&self, _call: &ToolCall) -> Result<Value, ToolError> {
            self.executed
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Value::String("written".into()))
        }
    }

    #[tokio::test]
    async fn calls_in_the_last_round_are_not_executed() {
        let backend = Arc::new(ScriptedBackend::new(vec![vec![Ok(call_delta(
            0,
            Some("call_1"),
            Some("write_file"),
            r#"{"path":"a.txt","content":"x"}"#,
        ))]]));
        let host = Arc::new(CountingHost::default());
        let invoker = FunctionInvoker::new(Arc::clone(&backend), Arc::clone(&host)).max_rounds(1);

        let updates = collect(&invoker).await;

        assert!(matches!(
            updates.last(),
            Some(Err(ModelError::ToolRounds(1)))
        ));
        assert_eq!(
            host.executed.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn round_limit_runs_tools_of_earlier_rounds_only() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            vec![Ok(call_delta(0, Some("a"), Some("write_file"), "{}"))],
            vec![Ok(call_delta(0, Some("b"), Some("write_file"), "{}"))],
        ]));
        let host = Arc::new(CountingHost::default());
        let invoker = FunctionInvoker::new(Arc::clone(&backend), Arc::clone(&host)).max_rounds(2);

        let updates = collect(&invoker).await;

        assert!(matches!(
            updates.last(),
            Some(Err(ModelError::ToolRounds(2)))
        ));
        assert_eq!(
            host.executed.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn backend_error_ends_stream() {
        let backend = Arc::new(ScriptedBackend::new(vec![vec![
            Ok(Update::from_text("partial")),
            Err(ModelError::Network("connection reset".into())),
            Ok(Update::from_text("never seen")),
        ]]));
        let invoker = FunctionInvoker::new(Arc::clone(&backend), Arc::new(EmptyToolHost));

        let updates = collect(&invoker).await;
        assert_eq!(updates.len(), 2);
        assert!(matches!(updates[1], Err(ModelError::Network(_))));
    }
}
