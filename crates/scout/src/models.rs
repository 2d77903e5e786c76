//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - vercel useChat messages/tool invocations, sent from the interface to the relay
//! - vercel data stream protocol parts, sent from the relay to the interface
//! - openai messages/tools, sent from the agent to the LLM
//! - anthropic messages/tools, sent from the agent to the LLM
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers, so the internal models are not an exact match to any of these formats.
pub mod message;
pub mod role;
pub mod tool;
