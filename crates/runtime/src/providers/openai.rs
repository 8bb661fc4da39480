//! OpenAI-compatible chat completions backend (Azure OpenAI deployments included).

use super::sse::SseResponseExt;
use crate::model::{
    Backend, Message, ModelError, ModelRequest, Part, Role, ToolCallDelta, ToolSpec, Update,
    UpdateStream,
};
use futures::StreamExt;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Where chat completion requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiEndpoint {
    /// An Azure OpenAI resource; the model is picked by deployment name.
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
    /// Any OpenAI-compatible API; the model is named in the request body.
    Compatible { base_url: String, model: String },
}

impl OpenAiEndpoint {
    pub fn azure(endpoint: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self::Azure {
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
        }
    }

    fn chat_url(&self) -> String {
        match self {
            Self::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
                endpoint.trim_end_matches('/')
            ),
            Self::Compatible { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
        }
    }

    fn model(&self) -> Option<&str> {
        match self {
            Self::Azure { .. } => None,
            Self::Compatible { model, .. } => Some(model),
        }
    }

    fn deployment(&self) -> &str {
        match self {
            Self::Azure { deployment, .. } => deployment,
            Self::Compatible { model, .. } => model,
        }
    }
}

/// Authentication mode for the completion API.
///
/// Use `ApiKey` for Azure resource keys (sent as `api-key`).
/// Use `Bearer` for OpenAI keys or Entra ID access tokens.
#[derive(Debug, Clone)]
pub enum OpenAiAuth {
    ApiKey(String),
    Bearer(String),
}

impl std::fmt::Display for OpenAiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => write!(f, "api_key"),
            Self::Bearer(_) => write!(f, "bearer"),
        }
    }
}

impl OpenAiAuth {
    fn apply_headers(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Self::ApiKey(key) => req.header("api-key", key),
            Self::Bearer(token) => req.bearer_auth(token),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiChunk {
    choices: Option<Vec<ApiChoice>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    delta: Option<ApiDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    endpoint: OpenAiEndpoint,
    auth: OpenAiAuth,
    client: Option<reqwest::Client>,
}

impl OpenAiBackendBuilder {
    pub fn new(endpoint: OpenAiEndpoint, auth: OpenAiAuth) -> Self {
        Self {
            endpoint,
            auth,
            client: None,
        }
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, ...).
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: self.client.unwrap_or_default(),
            endpoint: self.endpoint,
            auth: self.auth,
        }
    }
}

/// Streaming chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: OpenAiEndpoint,
    auth: OpenAiAuth,
}

impl OpenAiBackend {
    pub fn builder(endpoint: OpenAiEndpoint, auth: OpenAiAuth) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(endpoint, auth)
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Convert one message into wire messages.
    ///
    /// Tool results become separate `tool` messages following the message
    /// that carried them.
    fn message_to_api(msg: &Message, out: &mut Vec<ApiMessage>) {
        let text = msg.text();
        let tool_calls: Vec<ApiToolCall> = msg
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(ApiToolCall {
                    id: call.id.clone(),
                    call_type: "function",
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: match &call.input {
                            Value::String(raw) => raw.clone(),
                            input => input.to_string(),
                        },
                    },
                }),
                _ => None,
            })
            .collect();
        let results = msg.results();

        if !text.is_empty() || !tool_calls.is_empty() || results.is_empty() {
            out.push(ApiMessage {
                role: Self::role_to_api(msg.role),
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
                tool_calls,
                tool_call_id: None,
            });
        }

        out.extend(results.into_iter().map(|result| ApiMessage {
            role: "tool",
            content: Some(result.content()),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id().to_string()),
        }));
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.input_schema,
            },
        }
    }

    /// Parse one SSE payload. Chunks without choices carry no update.
    fn parse_chunk(data: &str) -> Result<Option<Update>, ModelError> {
        let chunk: ApiChunk =
            serde_json::from_str(data).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        if let Some(error) = chunk.error {
            return Err(ModelError::Api(error.message));
        }

        let Some(choice) = chunk.choices.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };
        let delta = choice.delta.unwrap_or_default();

        let tool_calls = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let (name, arguments) = call
                    .function
                    .map(|f| (f.name, f.arguments.unwrap_or_default()))
                    .unwrap_or_default();
                ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }
            })
            .collect();

        Ok(Some(Update {
            text: delta.content.unwrap_or_default(),
            tool_calls,
        }))
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "openai({}, auth={})",
            self.endpoint.deployment(),
            self.auth
        )
    }
}

impl Backend for OpenAiBackend {
    async fn stream(&self, request: ModelRequest) -> Result<UpdateStream, ModelError> {
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            Self::message_to_api(message, &mut messages);
        }

        let api_request = ApiRequest {
            model: self.endpoint.model(),
            messages,
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: true,
        };

        let req = self
            .client
            .post(self.endpoint.chat_url())
            .header("content-type", "application/json")
            .header("accept", "text/event-stream");

        let req = self.auth.apply_headers(req);

        debug!(
            backend = %self,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "starting completion stream"
        );

        let response = req
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let updates = response
            .sse()
            .map(|line| match line {
                Ok(data) => Self::parse_chunk(&data),
                Err(e) => Err(ModelError::Network(e.to_string())),
            })
            .filter_map(|parsed| futures::future::ready(parsed.transpose()));

        Ok(Box::pin(updates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ToolCall, ToolResult};
    use serde_json::json;

    #[test]
    fn auth_display() {
        assert_eq!(OpenAiAuth::ApiKey("k".into()).to_string(), "api_key");
        assert_eq!(OpenAiAuth::Bearer("t".into()).to_string(), "bearer");
    }

    #[test]
    fn azure_chat_url() {
        let endpoint = OpenAiEndpoint::azure("https://res.openai.azure.com/", "gpt-4o");
        assert_eq!(
            endpoint.chat_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
        assert_eq!(endpoint.model(), None);
    }

    #[test]
    fn compatible_chat_url() {
        let endpoint = OpenAiEndpoint::Compatible {
            base_url: "http://localhost:11434/v1".into(),
            model: "llama3.1".into(),
        };
        assert_eq!(
            endpoint.chat_url(),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(endpoint.model(), Some("llama3.1"));
    }

    #[test]
    fn text_messages_to_api() {
        let mut out = Vec::new();
        OpenAiBackend::message_to_api(&Message::system("be brief"), &mut out);
        OpenAiBackend::message_to_api(&Message::user("list files"), &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, "system");
        assert_eq!(out[1].role, "user");
        assert_eq!(out[1].content.as_deref(), Some("list files"));
    }

    #[test]
    fn tool_round_trip_to_api() {
        let call = Message::from_parts(
            Role::Assistant,
            vec![Part::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "list_directory".into(),
                input: json!({"path": "."}),
            })],
        );
        let results = Message::tool_results(vec![ToolResult::Success {
            tool_call_id: "call_1".into(),
            output: Value::String("[FILE] notes.txt".into()),
        }]);

        let mut out = Vec::new();
        OpenAiBackend::message_to_api(&call, &mut out);
        OpenAiBackend::message_to_api(&results, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, "assistant");
        assert_eq!(out[0].content, None);
        assert_eq!(out[0].tool_calls[0].function.arguments, r#"{"path":"."}"#);
        assert_eq!(out[1].role, "tool");
        assert_eq!(out[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(out[1].content.as_deref(), Some("[FILE] notes.txt"));
    }

    #[test]
    fn request_serialization() {
        let spec = ToolSpec {
            name: "read_file".into(),
            description: "Read a file".into(),
            input_schema: json!({"type": "object"}),
        };
        let request = ApiRequest {
            model: None,
            messages: vec![],
            tools: vec![OpenAiBackend::tool_to_api(&spec)],
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("model").is_none());
        assert_eq!(value["stream"], true);
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "read_file");
        assert_eq!(value["tools"][0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn parse_text_chunk() {
        let update = OpenAiBackend::parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(update, Update::from_text("Hel"));
    }

    #[test]
    fn parse_tool_call_chunk() {
        let update = OpenAiBackend::parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"read_file","arguments":"{\"pa"}}]}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert!(update.text.is_empty());
        assert_eq!(
            update.tool_calls,
            [ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("read_file".into()),
                arguments: "{\"pa".into(),
            }]
        );
    }

    #[test]
    fn parse_chunk_without_choices() {
        // Azure sends prompt filter results first, with no choices.
        let update =
            OpenAiBackend::parse_chunk(r#"{"choices":[],"prompt_filter_results":[]}"#).unwrap();
        assert!(update.is_none());
    }

    #[test]
    fn parse_chunk_with_null_fields() {
        let update = OpenAiBackend::parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hi","tool_calls":null}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(update, Update::from_text("Hi"));

        let update = OpenAiBackend::parse_chunk(
            r#"{"choices":[{"index":0,"delta":null,"finish_reason":"stop"}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(update, Update::from_text(""));

        let update = OpenAiBackend::parse_chunk(r#"{"choices":null,"usage":{}}"#).unwrap();
        assert!(update.is_none());
    }

    #[test]
    fn parse_error_event() {
        let err = OpenAiBackend::parse_chunk(r#"{"error":{"message":"rate limited"}}"#)
            .unwrap_err();
        assert!(matches!(err, ModelError::Api(msg) if msg == "rate limited"));
    }

    #[test]
    fn parse_garbage() {
        let err = OpenAiBackend::parse_chunk("not json").unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    mod wire {
        use super::*;
        use axum::http::{HeaderMap, StatusCode, header};
        use axum::routing::post;
        use axum::{Json, Router};
        use std::sync::{Arc, Mutex};

        const SSE_BODY: &str = concat!(
            "data: {\"choices\":[],\"prompt_filter_results\":[]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"The \",\"tool_calls\":null}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"dir\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",",
            "\"function\":{\"name\":\"list_directory\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
        );

        type Captured = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

        async fn serve(app: Router) -> String {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}/v1")
        }

        fn backend(base_url: String) -> OpenAiBackend {
            let endpoint = OpenAiEndpoint::Compatible {
                base_url,
                model: "test-model".into(),
            };
            OpenAiBackend::builder(endpoint, OpenAiAuth::Bearer("sk-test".into())).build()
        }

        fn request() -> ModelRequest {
            ModelRequest {
                messages: vec![Message::user("list files")],
                tools: vec![ToolSpec {
                    name: "list_directory".into(),
                    description: "List a directory".into(),
                    input_schema: json!({"type": "object"}),
                }],
            }
        }

        #[tokio::test]
        async fn streams_updates_from_sse_body() {
            let captured = Captured::default();
            let seen = Arc::clone(&captured);
            let app = Router::new().route(
                "/v1/chat/completions",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push((headers, body));
                        ([(header::CONTENT_TYPE, "text/event-stream")], SSE_BODY)
                    }
                }),
            );
            let backend = backend(serve(app).await);

            let Ok(stream) = backend.stream(request()).await else {
                panic!("stream did not start");
            };
            let updates: Vec<Update> = stream.map(|u| u.unwrap()).collect().await;

            let texts: Vec<&str> = updates.iter().map(|u| u.text.as_str()).collect();
            assert_eq!(texts, ["The ", "dir", ""]);
            assert_eq!(
                updates[2].tool_calls,
                [ToolCallDelta {
                    index: 0,
                    id: Some("call_1".into()),
                    name: Some("list_directory".into()),
                    arguments: "{}".into(),
                }]
            );

            let captured = captured.lock().unwrap();
            let (headers, body) = &captured[0];
            assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-test");
            assert_eq!(body["model"], "test-model");
            assert_eq!(body["stream"], true);
            assert_eq!(body["messages"][0]["content"], "list files");
            assert_eq!(body["tools"][0]["function"]["name"], "list_directory");
        }

        #[tokio::test]
        async fn error_status_is_an_api_error() {
            let app = Router::new().route(
                "/v1/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
            );
            let backend = backend(serve(app).await);

            let Err(err) = backend.stream(request()).await else {
                panic!("stream started despite an error status");
            };
            assert!(matches!(
                err,
                ModelError::Api(ref msg) if msg.contains("429") && msg.contains("slow down")
            ));
        }

        #[tokio::test]
        async fn in_stream_error_event_ends_with_api_error() {
            let app = Router::new().route(
                "/v1/chat/completions",
                post(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/event-stream")],
                        concat!(
                            "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n",
                            "data: {\"error\":{\"message\":\"content filtered\"}}\n\n",
                        ),
                    )
                }),
            );
            let backend = backend(serve(app).await);

            let Ok(stream) = backend.stream(request()).await else {
                panic!("stream did not start");
            };
            let items: Vec<_> = stream.collect().await;

            assert_eq!(items.len(), 2);
            assert!(matches!(&items[0], Ok(update) if update.text == "par"));
            assert!(matches!(&items[1], Err(ModelError::Api(msg)) if msg == "content filtered"));
        }
    }
}
