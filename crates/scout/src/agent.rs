use anyhow::{anyhow, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::errors::AgentResult;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{ToolCall, ToolOutput};
use crate::providers::base::{Provider, ProviderEvent, Usage};
use crate::tools::Toolbox;

pub const DEFAULT_MAX_STEPS: usize = 5;

/// What a reply produces, in order
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Assistant text, streamed as the provider produces it
    TextDelta(String),
    /// A whole message: the assembled assistant turn, or the tool responses that follow it
    Message(Message),
}

/// Agent integrates a foundational LLM with the tools it may call
pub struct Agent {
    provider: Box<dyn Provider>,
    toolbox: Toolbox,
    max_steps: usize,
    usage: Mutex<Usage>,
}

impl Agent {
    /// Create a new Agent with the specified provider and tools
    pub fn new(provider: Box<dyn Provider>, toolbox: Toolbox) -> Self {
        Self {
            provider,
            toolbox,
            max_steps: DEFAULT_MAX_STEPS,
            usage: Mutex::new(Usage::default()),
        }
    }

    /// Cap the number of completions one reply may take
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Token usage summed over every completion of the latest reply
    pub fn usage(&self) -> Usage {
        self.usage
            .lock()
            .map(|usage| usage.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn record_usage(&self, step: usize, usage: &Usage) {
        let mut total = self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if step == 0 {
            *total = Usage::default();
        }
        total.accumulate(usage);
    }

    /// Dispatch a single tool call to the toolbox
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<ToolOutput> {
        let call = tool_call?;
        info!(tool = %call.name, "dispatching tool call");
        self.toolbox.dispatch(call).await
    }

    /// Create a stream that yields assistant text as it arrives, then each finished
    /// message. This includes both the assistant's responses and any tool responses.
    pub fn reply<'a>(
        &'a self,
        system: &'a str,
        messages: &[Message],
    ) -> BoxStream<'a, Result<AgentEvent>> {
        let mut messages = messages.to_vec();
        let tools = self.toolbox.tools();

        Box::pin(async_stream::try_stream! {
            for step in 0..self.max_steps {
                let mut completion = self.provider.stream(
                    system,
                    &messages,
                    &tools,
                ).await?;

                let mut completed = None;
                while let Some(event) = completion.next().await {
                    match event? {
                        ProviderEvent::TextDelta(text) => {
                            yield AgentEvent::TextDelta(text);
                        }
                        ProviderEvent::Complete { message, usage } => {
                            completed = Some((message, usage));
                        }
                    }
                }
                let (response, usage) = completed
                    .ok_or_else(|| anyhow!("Provider stream ended without a message"))?;
                debug!(step, ?usage, "completion finished");
                self.record_usage(step, &usage);

                yield AgentEvent::Message(response.clone());

                // Ensure the message above is flushed before long-running tools start
                tokio::task::yield_now().await;

                let tool_requests: Vec<&ToolRequest> = response.tool_requests();
                if tool_requests.is_empty() {
                    break;
                }

                // Dispatch each request in parallel and wait until all are finished
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();
                let outputs = futures::future::join_all(futures).await;

                // Combine the outputs into one message using the original IDs
                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield AgentEvent::Message(message_tool_response.clone());

                messages.push(response.clone());
                messages.push(message_tool_response);
            }
        })
    }
}
