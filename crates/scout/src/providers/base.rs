use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Fold another completion's counts into this one
    pub fn accumulate(&mut self, other: &Usage) {
        fn sum(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            }
        }
        self.input_tokens = sum(self.input_tokens, other.input_tokens);
        self.output_tokens = sum(self.output_tokens, other.output_tokens);
        self.total_tokens = sum(self.total_tokens, other.total_tokens);
    }
}

/// One step of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Assistant text as it arrives
    TextDelta(String),
    /// The assembled message, tool calls included, and its token counts. Always last.
    Complete { message: Message, usage: Usage },
}

pub type ProviderStream = BoxStream<'static, Result<ProviderEvent>>;

/// Base trait for AI providers (OpenAI, Anthropic)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message for the conversation, given the system prompt and
    /// the tools the model may call
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Stream the next message. Text is yielded as it is produced and the
    /// stream ends with `ProviderEvent::Complete`.
    ///
    /// The default waits for `complete` and replays its text as a single delta.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderStream> {
        let (message, usage) = self.complete(system, messages, tools).await?;
        let text = message.text();

        let mut events = Vec::new();
        if !text.is_empty() {
            events.push(Ok(ProviderEvent::TextDelta(text)));
        }
        events.push(Ok(ProviderEvent::Complete { message, usage }));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}
