use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use futures::{stream::StreamExt, Stream};
use scout::{
    agent::Agent,
    geo::{GeoHint, CITY_HEADER, LATITUDE_HEADER, LONGITUDE_HEADER},
    models::message::{Message, MessageContent},
    models::role::Role,
    models::tool::{ToolCall, ToolOutput},
    prompt::system_prompt,
    providers::{base::Usage, factory, selector::ModelSelection},
    relay::{relay, RelayEvent},
    tools::Toolbox,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_stream::wrappers::ReceiverStream;

const HEARTBEAT: Duration = Duration::from_millis(500);

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<IncomingMessage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    #[serde(rename = "toolInvocations")]
    tool_invocations: Vec<ToolInvocation>,
}

#[derive(Debug, Deserialize)]
struct ToolInvocation {
    state: String,
    #[serde(rename = "toolCallId")]
    tool_call_id: String,
    #[serde(rename = "toolName")]
    tool_name: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    result: Option<Value>,
}

// Custom SSE response type that implements the Vercel AI SDK protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .header("x-vercel-ai-data-stream", "v1")
            .body(body)
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build stream response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}

// Convert incoming messages to our internal Message type
fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "user" => {
                messages.push(Message::user().with_text(msg.content));
            }
            "assistant" => {
                // Each finished invocation is a complete request/response cycle
                for tool in msg.tool_invocations {
                    let output = match tool.state.as_str() {
                        "result" => match tool.result {
                            Some(Value::Null) | None => ToolOutput::Absent,
                            Some(result) => ToolOutput::Json(result),
                        },
                        // The interface acted on the call without reporting a result
                        "call" => ToolOutput::Signal,
                        _ => {
                            tracing::debug!("Dropping {} tool invocation {}", tool.state, tool.tool_call_id);
                            continue;
                        }
                    };

                    let tool_call = ToolCall::new(tool.tool_name, tool.args);
                    messages.push(
                        Message::assistant()
                            .with_tool_request(tool.tool_call_id.clone(), Ok(tool_call)),
                    );
                    messages.push(Message::user().with_tool_response(tool.tool_call_id, Ok(output)));
                }

                // Then add the assistant's text response after tool interactions
                if !msg.content.is_empty() {
                    messages.push(Message::assistant().with_text(msg.content));
                }
            }
            _ => {
                tracing::warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

fn geo_from_headers(headers: &HeaderMap) -> GeoHint {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    GeoHint::from_header_values(
        value(LATITUDE_HEADER),
        value(LONGITUDE_HEADER),
        value(CITY_HEADER),
    )
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        // Tool calls start with "9:"
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_result(id: &str, result: &Value) -> String {
        // Tool results start with "a:"
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_error(message: &str) -> String {
        let encoded = serde_json::to_string(message).unwrap_or_else(|_| String::from("\"\""));
        format!("3:{}\n", encoded)
    }

    fn format_finish(reason: &str, usage: &Usage) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": usage.input_tokens.unwrap_or(0),
                "completionTokens": usage.output_tokens.unwrap_or(0)
            }
        });
        format!("d:{}\n", finish)
    }
}

async fn stream_message(
    message: Message,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    match message.role {
        Role::User => {
            // Only tool responses travel back to the interface from user turns
            for content in message.content {
                if let MessageContent::ToolResponse(response) = content {
                    match response.tool_result {
                        Ok(output) => {
                            // Signals have no result, the interface already has the call
                            if let Some(result) = output.client_result() {
                                tx.send(ProtocolFormatter::format_tool_result(
                                    &response.id,
                                    &result,
                                ))
                                .await?;
                            }
                        }
                        Err(err) => {
                            let result = json!(format!("Error: {}", err));
                            tx.send(ProtocolFormatter::format_tool_result(
                                &response.id,
                                &result,
                            ))
                            .await?;
                        }
                    }
                }
            }
        }
        Role::Assistant => {
            for content in message.content {
                match content {
                    MessageContent::ToolRequest(request) => {
                        if let Ok(tool_call) = request.tool_call {
                            tx.send(ProtocolFormatter::format_tool_call(
                                &request.id,
                                &tool_call.name,
                                &tool_call.arguments,
                            ))
                            .await?;
                        } else {
                            // An invalid call still needs a place in the history, its error
                            // arrives as the matching result
                            tx.send(ProtocolFormatter::format_tool_call(
                                &request.id,
                                "invalid_tool",
                                &json!({}),
                            ))
                            .await?;
                        }
                    }
                    MessageContent::Text(_) => {
                        // Already sent as it streamed in
                        continue;
                    }
                    MessageContent::ToolResponse(_) => {
                        // Tool responses should only come from the user
                        continue;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn stream_event(
    event: RelayEvent,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    match event {
        RelayEvent::TextDelta(text) => tx.send(ProtocolFormatter::format_text(&text)).await,
        RelayEvent::Message(message) => stream_message(message, tx).await,
        RelayEvent::Error(message) => tx.send(ProtocolFormatter::format_error(&message)).await,
        RelayEvent::Finish { reason, usage } => {
            tx.send(ProtocolFormatter::format_finish(reason.as_str(), &usage))
                .await
        }
    }
}

async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, StatusCode> {
    // Check protocol header (optional in our case)
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let selection = ModelSelection::select(&request.model);
    tracing::info!(
        provider = selection.provider.name(),
        model = %selection.model,
        "selected model"
    );
    let config = selection
        .into_config(&state.settings.endpoints())
        .map_err(|e| {
            tracing::error!("Failed to configure provider: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let provider = factory::get_provider(config).map_err(|e| {
        tracing::error!("Failed to create provider: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let geo = geo_from_headers(&headers);
    let system = system_prompt(&Utc::now(), &geo).map_err(|e| {
        tracing::error!("Failed to render system prompt: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let toolbox = Toolbox::standard(state.client.clone(), &state.settings.tools);
    let agent = Agent::new(provider, toolbox).with_max_steps(state.settings.agent.max_steps);

    // Convert incoming messages
    let messages = convert_messages(request.messages);

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    let observer = state.observer.clone();
    let deadline = Instant::now() + Duration::from_secs(state.settings.server.request_timeout_secs);

    // Spawn task to handle streaming
    tokio::spawn(async move {
        let mut events = relay(&agent, &system, &messages, observer);

        loop {
            let wait = deadline.saturating_duration_since(Instant::now()).min(HEARTBEAT);
            match timeout(wait, events.next()).await {
                Ok(Some(event)) => {
                    if let Err(e) = stream_event(event, &tx).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and then end running tools.
                    if tx.is_closed() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        tracing::warn!("Reply exceeded the request timeout");
                        let _ = tx
                            .send(ProtocolFormatter::format_error("The request timed out"))
                            .await;
                        let _ = tx
                            .send(ProtocolFormatter::format_finish("error", &agent.usage()))
                            .await;
                        break;
                    }
                    continue;
                }
            }
        }

        // Dropping an unfinished relay reports it to the observer as an error
        drop(events);
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{AgentSettings, ServerSettings, Settings};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use scout::providers::configs::EndpointSettings;
    use scout::relay::{CompletionObserver, FinishEvent, FinishReason};
    use scout::tools::ToolSettings;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<FinishEvent>>,
    }

    impl CompletionObserver for RecordingObserver {
        fn on_finish(&self, event: &FinishEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn settings(server: &MockServer, openai_key: Option<&str>) -> Settings {
        Settings {
            server: ServerSettings::default(),
            openai: EndpointSettings::new(server.uri(), openai_key.map(str::to_string)),
            anthropic: EndpointSettings::new(server.uri(), None),
            tools: ToolSettings {
                search_host: server.uri(),
                search_api_key: Some("tvly-test".to_string()),
                retrieve_host: server.uri(),
                retrieve_timeout_secs: 1,
                weather_host: server.uri(),
                weather_api_key: Some("owm-test".to_string()),
            },
            agent: AgentSettings::default(),
        }
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn openai_stream(deltas: Vec<Value>) -> ResponseTemplate {
        let mut body: String = deltas
            .into_iter()
            .map(|delta| json!({"choices": [{"index": 0, "delta": delta}]}))
            .chain(std::iter::once(json!({
                "choices": [],
                "usage": {"prompt_tokens": 50, "completion_tokens": 10, "total_tokens": 60}
            })))
            .map(|chunk| format!("data: {}\n\n", chunk))
            .collect();
        body.push_str("data: [DONE]\n\n");
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
    }

    /// An upstream completion that streams `parts` as separate text deltas
    fn openai_text(parts: &[&str]) -> ResponseTemplate {
        openai_stream(parts.iter().map(|part| json!({"content": part})).collect())
    }

    /// An upstream completion that streams a single tool call
    fn openai_tool_call(id: &str, name: &str, arguments: &str) -> ResponseTemplate {
        openai_stream(vec![json!({"tool_calls": [{
            "index": 0,
            "id": id,
            "type": "function",
            "function": {"name": name, "arguments": arguments}
        }]})])
    }

    /// Split a data-stream body into (prefix, payload) frames
    fn frames(body: &str) -> Vec<(String, Value)> {
        body.lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (prefix, payload) = line.split_once(':').unwrap();
                (prefix.to_string(), serde_json::from_str(payload).unwrap())
            })
            .collect()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_protocol_formatter() {
        assert_eq!(
            ProtocolFormatter::format_text("Hello \"world\"\n"),
            "0:\"Hello \\\"world\\\"\\n\"\n"
        );
        assert_eq!(
            ProtocolFormatter::format_error("upstream failed"),
            "3:\"upstream failed\"\n"
        );

        let call = ProtocolFormatter::format_tool_call("call_1", "web_search", &json!({"query": "rust"}));
        assert!(call.starts_with("9:"));
        let payload: Value = serde_json::from_str(call[2..].trim_end()).unwrap();
        assert_eq!(
            payload,
            json!({"toolCallId": "call_1", "toolName": "web_search", "args": {"query": "rust"}})
        );

        let finish = ProtocolFormatter::format_finish("tool-calls", &Usage::new(Some(7), Some(3), Some(10)));
        let payload: Value = serde_json::from_str(finish[2..].trim_end()).unwrap();
        assert_eq!(
            payload,
            json!({"finishReason": "tool-calls", "usage": {"promptTokens": 7, "completionTokens": 3}})
        );
    }

    #[test]
    fn test_convert_messages_replays_tool_invocations() {
        let incoming: Vec<IncomingMessage> = serde_json::from_value(json!([
            {"role": "user", "content": "How is AAPL?"},
            {
                "role": "assistant",
                "content": "Apple rose today.",
                "toolInvocations": [
                    {"state": "result", "toolCallId": "call_1", "toolName": "web_search",
                     "args": {"query": "AAPL"}, "result": {"results": []}},
                    {"state": "call", "toolCallId": "call_2", "toolName": "stock_chart_ui",
                     "args": {"symbol": "AAPL"}},
                    {"state": "partial-call", "toolCallId": "call_3", "toolName": "web_search",
                     "args": {}}
                ]
            },
            {"role": "system", "content": "ignored"},
            {"role": "user", "content": "And MSFT?"}
        ]))
        .unwrap();

        let messages = convert_messages(incoming);
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[0].text(), "How is AAPL?");
        assert_eq!(messages[1].tool_requests()[0].tool_name(), Some("web_search"));
        assert_eq!(
            messages[2].content[0],
            MessageContent::tool_response("call_1", Ok(ToolOutput::Json(json!({"results": []}))))
        );
        assert_eq!(messages[3].tool_requests()[0].tool_name(), Some("stock_chart_ui"));
        assert_eq!(
            messages[4].content[0],
            MessageContent::tool_response("call_2", Ok(ToolOutput::Signal))
        );
        assert_eq!(messages[5].role, Role::Assistant);
        assert_eq!(messages[5].text(), "Apple rose today.");
        assert_eq!(messages[6].text(), "And MSFT?");
    }

    #[test]
    fn test_geo_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(LATITUDE_HEADER, "-23.55".parse().unwrap());
        headers.insert(CITY_HEADER, "S%C3%A3o%20Paulo".parse().unwrap());

        let geo = geo_from_headers(&headers);
        assert_eq!(geo.latitude, Some(-23.55));
        assert_eq!(geo.longitude, None);
        assert_eq!(geo.city.as_deref(), Some("São Paulo"));
    }

    #[tokio::test]
    async fn test_weather_question_streams_forecast() {
        let server = MockServer::start().await;
        let forecast = json!({
            "cod": "200",
            "list": [{"dt": 1718884800, "main": {"temp": 291.3}, "weather": [{"main": "Clouds"}]}],
            "city": {"name": "Paris"}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("tool_call_id"))
            .respond_with(openai_text(&[
                "It is 18°C ",
                "and cloudy in Paris, ",
                "per OpenWeatherMap.",
            ]))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"model": "gpt-4o"})))
            .and(body_string_contains("São Paulo"))
            .respond_with(openai_tool_call(
                "call_weather",
                "get_weather_data",
                "{\"lat\":48.8566,\"lon\":2.3522}",
            ))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .and(query_param("appid", "owm-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast.clone()))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(0)
            .mount(&server)
            .await;

        let observer = Arc::new(RecordingObserver::default());
        let state = AppState::new(settings(&server, Some("sk-test")))
            .unwrap()
            .with_observer(observer.clone());
        let app = routes(state);

        let mut request = chat_request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "What's the weather in Paris?"}]
        }));
        request
            .headers_mut()
            .insert(CITY_HEADER, "S%C3%A3o%20Paulo".parse().unwrap());
        request.headers_mut().insert("x-protocol", "data".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");

        let frames = frames(&body_text(response).await);
        let prefixes: Vec<&str> = frames.iter().map(|(p, _)| p.as_str()).collect();
        // The answer arrives as the model writes it, one text part per delta
        assert_eq!(prefixes, vec!["9", "a", "0", "0", "0", "d"]);

        assert_eq!(frames[0].1["toolName"], "get_weather_data");
        assert_eq!(frames[0].1["toolCallId"], "call_weather");
        assert_eq!(frames[1].1["toolCallId"], "call_weather");
        assert_eq!(frames[1].1["result"], forecast);
        assert_eq!(frames[2].1, json!("It is 18°C "));
        assert_eq!(frames[4].1, json!("per OpenWeatherMap."));
        assert_eq!(
            frames[5].1,
            json!({"finishReason": "stop", "usage": {"promptTokens": 100, "completionTokens": 20}})
        );

        let recorded = observer.events.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].tool_calls, vec!["get_weather_data"]);
        assert_eq!(
            recorded[0].text,
            "It is 18°C and cloudy in Paris, per OpenWeatherMap."
        );
    }

    #[tokio::test]
    async fn test_signal_tool_call_has_no_result_frame() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("tool_call_id"))
            .respond_with(openai_text(&["Here is the chart."]))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(openai_tool_call(
                "call_chart",
                "stock_chart_ui",
                "{\"symbol\":\"AAPL\"}",
            ))
            .with_priority(2)
            .mount(&server)
            .await;

        let state = AppState::new(settings(&server, Some("sk-test"))).unwrap();
        let response = routes(state)
            .oneshot(chat_request(json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Show me AAPL"}]
            })))
            .await
            .unwrap();

        let frames = frames(&body_text(response).await);
        let prefixes: Vec<&str> = frames.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(prefixes, vec!["9", "0", "d"]);
        assert_eq!(frames[0].1["args"], json!({"symbol": "AAPL"}));
    }

    #[tokio::test]
    async fn test_provider_error_ends_stream_with_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let state = AppState::new(settings(&server, Some("sk-test"))).unwrap();
        let response = routes(state)
            .oneshot(chat_request(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .await
            .unwrap();

        let frames = frames(&body_text(response).await);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, "3");
        assert_eq!(frames[1].0, "d");
        assert_eq!(frames[1].1["finishReason"], "error");
    }

    #[tokio::test]
    async fn test_request_timeout_ends_stream_with_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(openai_text(&["too late"]).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let mut settings = settings(&server, Some("sk-test"));
        settings.server.request_timeout_secs = 1;
        let observer = Arc::new(RecordingObserver::default());
        let state = AppState::new(settings)
            .unwrap()
            .with_observer(observer.clone());
        let response = routes(state)
            .oneshot(chat_request(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .await
            .unwrap();

        let frames = frames(&body_text(response).await);
        let prefixes: Vec<&str> = frames.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(prefixes, vec!["3", "d"]);
        assert_eq!(frames[1].1["finishReason"], "error");

        // The abandoned reply is still reported
        let recorded = observer.events.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].finish_reason, FinishReason::Error);
        assert!(recorded[0].tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_other_protocols() {
        let server = MockServer::start().await;
        let state = AppState::new(settings(&server, Some("sk-test"))).unwrap();

        let mut request = chat_request(json!({"model": "gpt-4o", "messages": []}));
        request.headers_mut().insert("x-protocol", "text".parse().unwrap());

        let response = routes(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_server_error() {
        let server = MockServer::start().await;
        let state = AppState::new(settings(&server, None)).unwrap();

        let response = routes(state)
            .oneshot(chat_request(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let server = MockServer::start().await;
        let state = AppState::new(settings(&server, Some("sk-test"))).unwrap();

        let response = routes(state)
            .oneshot(chat_request(json!({"messages": "not a list"})))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
