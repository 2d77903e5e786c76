use anyhow::{anyhow, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::base::{Provider, ProviderEvent, ProviderStream, Usage};
use super::configs::AnthropicProviderConfig;
use super::utils::{sanitize_function_name, sse_data};
use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: i32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
        let output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn build_payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_anthropic_spec(messages),
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_anthropic_spec(tools));
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        payload
    }

    async fn send(&self, payload: &Value) -> Result<Response> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let error_text = response.text().await?;
                Err(anyhow!("Request failed: {} - {}", status, error_text))
            }
        }
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        Ok(self.send(payload).await?.json().await?)
    }
}

#[derive(Debug)]
enum StreamedBlock {
    Text(String),
    ToolUse {
        id: String,
        name: Option<String>,
        input: String,
    },
}

/// Folds the events of a streamed Anthropic message back into one message
#[derive(Debug, Default)]
pub struct AnthropicStreamAccumulator {
    blocks: BTreeMap<u64, StreamedBlock>,
    input_tokens: Option<i32>,
    output_tokens: Option<i32>,
}

impl AnthropicStreamAccumulator {
    /// Take in one event and return the text it carried, if any
    pub fn push(&mut self, event: &Value) -> Result<Option<String>> {
        let index = event["index"].as_u64().unwrap_or_default();

        match event["type"].as_str() {
            Some("message_start") => {
                let usage = &event["message"]["usage"];
                self.input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
                self.output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
            }
            Some("content_block_start") => {
                let block = &event["content_block"];
                match block["type"].as_str() {
                    Some("text") => {
                        let text = block["text"].as_str().unwrap_or_default().to_string();
                        self.blocks.insert(index, StreamedBlock::Text(text.clone()));
                        if !text.is_empty() {
                            return Ok(Some(text));
                        }
                    }
                    Some("tool_use") => {
                        self.blocks.insert(
                            index,
                            StreamedBlock::ToolUse {
                                id: block["id"].as_str().unwrap_or_default().to_string(),
                                name: block["name"].as_str().map(str::to_string),
                                input: String::new(),
                            },
                        );
                    }
                    other => {
                        debug!("Skipping unsupported Anthropic content block: {:?}", other);
                    }
                }
            }
            Some("content_block_delta") => {
                let delta = &event["delta"];
                match (self.blocks.get_mut(&index), delta["type"].as_str()) {
                    (Some(StreamedBlock::Text(text)), Some("text_delta")) => {
                        let fragment = delta["text"].as_str().unwrap_or_default();
                        if !fragment.is_empty() {
                            text.push_str(fragment);
                            return Ok(Some(fragment.to_string()));
                        }
                    }
                    (Some(StreamedBlock::ToolUse { input, .. }), Some("input_json_delta")) => {
                        input.push_str(delta["partial_json"].as_str().unwrap_or_default());
                    }
                    _ => {}
                }
            }
            Some("message_delta") => {
                if let Some(output) = event["usage"]["output_tokens"].as_i64() {
                    self.output_tokens = Some(output as i32);
                }
            }
            Some("error") => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error");
                return Err(anyhow!("Anthropic stream error: {}", message));
            }
            _ => {}
        }

        Ok(None)
    }

    pub fn finish(self) -> (Message, Usage) {
        let mut message = Message::assistant();

        for block in self.blocks.into_values() {
            match block {
                StreamedBlock::Text(text) => {
                    if !text.is_empty() {
                        message = message.with_text(text);
                    }
                }
                StreamedBlock::ToolUse { id, name, input } => {
                    let tool_call = match name {
                        None => Err(AgentError::ToolNotFound(format!(
                            "Tool use {} did not name a tool",
                            id
                        ))),
                        Some(name) if input.trim().is_empty() => {
                            Ok(ToolCall::new(name, json!({})))
                        }
                        Some(name) => match serde_json::from_str::<Value>(&input) {
                            Ok(arguments) => Ok(ToolCall::new(name, arguments)),
                            Err(e) => Err(AgentError::InvalidParameters(format!(
                                "Could not interpret tool use parameters for id {}: {}",
                                id, e
                            ))),
                        },
                    };
                    message = message.with_tool_request(id, tool_call);
                }
            }
        }

        let total_tokens = match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        let usage = Usage::new(self.input_tokens, self.output_tokens, total_tokens);

        (message, usage)
    }
}

/// Convert internal messages into Anthropic content blocks. Tool requests become
/// `tool_use` blocks on assistant turns, tool responses `tool_result` blocks on user turns.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut anthropic_messages = Vec::new();

    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let mut blocks = Vec::new();
        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text.text}));
                    }
                }
                MessageContent::ToolRequest(request) => {
                    let (name, input) = match &request.tool_call {
                        Ok(call) => (sanitize_function_name(&call.name), call.arguments.clone()),
                        // The paired response carries the error back to the model
                        Err(_) => ("invalid_tool".to_string(), json!({})),
                    };
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": name,
                        "input": input,
                    }));
                }
                MessageContent::ToolResponse(response) => {
                    let mut block = json!({
                        "type": "tool_result",
                        "tool_use_id": response.id,
                    });
                    match &response.tool_result {
                        Ok(output) => {
                            if let Some(text) = output.model_content() {
                                block["content"] = json!(text);
                            }
                        }
                        Err(e) => {
                            block["content"] =
                                json!(format!("The tool call returned the following error:\n{}", e));
                            block["is_error"] = json!(true);
                        }
                    }
                    blocks.push(block);
                }
            }
        }

        if !blocks.is_empty() {
            anthropic_messages.push(json!({
                "role": role,
                "content": blocks,
            }));
        }
    }

    anthropic_messages
}

pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect()
}

pub fn anthropic_response_to_message(response: &Value) -> Result<Message> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

    let mut message = Message::assistant();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(text) = block["text"].as_str() {
                    message = message.with_text(text);
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default();
                let tool_call = match block["name"].as_str() {
                    Some(name) => Ok(ToolCall::new(name, block["input"].clone())),
                    None => Err(AgentError::ToolNotFound(format!(
                        "Tool use {} did not name a tool",
                        id
                    ))),
                };
                message = message.with_tool_request(id, tool_call);
            }
            other => {
                tracing::debug!("Skipping unsupported Anthropic content block: {:?}", other);
            }
        }
    }

    Ok(message)
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools);
        let response = self.post(&payload).await?;

        let message = anthropic_response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let mut payload = self.build_payload(system, messages, tools);
        payload["stream"] = json!(true);

        let response = self.send(&payload).await?;

        Ok(Box::pin(try_stream! {
            let mut data = sse_data(response);
            let mut accumulator = AnthropicStreamAccumulator::default();

            while let Some(line) = data.next().await {
                let event: Value = serde_json::from_str(&line?)?;
                if event["type"] == "message_stop" {
                    break;
                }
                if let Some(text) = accumulator.push(&event)? {
                    yield ProviderEvent::TextDelta(text);
                }
            }

            let (message, usage) = accumulator.finish();
            debug!(usage = ?usage, "anthropic stream finished");
            yield ProviderEvent::Complete { message, usage };
        }))
    }
}
