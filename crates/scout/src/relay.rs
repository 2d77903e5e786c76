//! Forwards an agent reply to the caller and reports how it ended.

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::agent::{Agent, AgentEvent};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::providers::base::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
        }
    }
}

/// Summary of a finished reply handed to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishEvent {
    /// Text of the last assistant message
    pub text: String,
    /// Names of every tool the model called, in call order
    pub tool_calls: Vec<String>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

pub trait CompletionObserver: Send + Sync {
    fn on_finish(&self, event: &FinishEvent);
}

/// Writes the final text and the tools used to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl CompletionObserver for LoggingObserver {
    fn on_finish(&self, event: &FinishEvent) {
        info!(
            finish_reason = event.finish_reason.as_str(),
            tool_calls = ?event.tool_calls,
            usage = ?event.usage,
            "reply finished"
        );
        info!("{}", event.text);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    TextDelta(String),
    Message(Message),
    Error(String),
    Finish { reason: FinishReason, usage: Usage },
}

/// What a reply has produced so far. Reports to the observer exactly once: through
/// `finish`, or on drop when the caller abandons the stream first.
struct Progress<'a> {
    agent: &'a Agent,
    observer: Arc<dyn CompletionObserver>,
    text: String,
    /// Text streamed for a completion whose message has not arrived yet
    pending: String,
    tool_calls: Vec<String>,
    finish_reason: FinishReason,
    reported: bool,
}

impl<'a> Progress<'a> {
    fn new(agent: &'a Agent, observer: Arc<dyn CompletionObserver>) -> Self {
        Self {
            agent,
            observer,
            text: String::new(),
            pending: String::new(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            reported: false,
        }
    }

    fn record(&mut self, message: &Message) {
        if message.role != Role::Assistant {
            return;
        }
        let requests = message.tool_requests();
        self.text = message.text();
        self.pending.clear();
        self.tool_calls.extend(
            requests
                .iter()
                .filter_map(|request| request.tool_name().map(str::to_string)),
        );
        self.finish_reason = if requests.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
    }

    fn finish(&mut self) -> FinishEvent {
        let text = if self.pending.is_empty() {
            self.text.clone()
        } else {
            self.pending.clone()
        };
        let event = FinishEvent {
            text,
            tool_calls: self.tool_calls.clone(),
            finish_reason: self.finish_reason,
            usage: self.agent.usage(),
        };
        self.reported = true;
        self.observer.on_finish(&event);
        event
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        if !self.reported {
            warn!("reply abandoned before it finished");
            self.finish_reason = FinishReason::Error;
            self.finish();
        }
    }
}

/// Run the agent over `messages` and relay its text deltas and each message it
/// produces, followed by a single finish event. The observer is notified before the
/// finish event is yielded, or with `FinishReason::Error` if the stream is dropped
/// before then.
pub fn relay<'a>(
    agent: &'a Agent,
    system: &'a str,
    messages: &[Message],
    observer: Arc<dyn CompletionObserver>,
) -> BoxStream<'a, RelayEvent> {
    let mut replies = agent.reply(system, messages);

    Box::pin(async_stream::stream! {
        let mut progress = Progress::new(agent, observer);

        while let Some(next) = replies.next().await {
            match next {
                Ok(AgentEvent::TextDelta(text)) => {
                    progress.pending.push_str(&text);
                    yield RelayEvent::TextDelta(text);
                }
                Ok(AgentEvent::Message(message)) => {
                    progress.record(&message);
                    yield RelayEvent::Message(message);
                }
                Err(e) => {
                    error!("Error processing reply: {:#}", e);
                    progress.finish_reason = FinishReason::Error;
                    yield RelayEvent::Error(e.to_string());
                    break;
                }
            }
        }
        drop(replies);

        let event = progress.finish();
        yield RelayEvent::Finish {
            reason: event.finish_reason,
            usage: event.usage,
        };
    })
}
