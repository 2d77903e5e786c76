//! Tools the model can call mid-generation.
//!
//! Every tool is a [`Capability`]: either an executable one backed by a
//! [`ToolExecutor`] that talks to a remote API, or a signal-only one whose call
//! is relayed to the interface and never executed here.

pub mod retrieve;
pub mod search;
pub mod stock_chart;
pub mod weather;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall, ToolOutput};

pub use retrieve::RetrieveTool;
pub use search::WebSearchTool;
pub use stock_chart::stock_chart_capability;
pub use weather::WeatherTool;

pub const SEARCH_HOST: &str = "https://api.tavily.com";
pub const RETRIEVE_HOST: &str = "https://r.jina.ai";
pub const WEATHER_HOST: &str = "https://api.openweathermap.org";

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The definition advertised to the model
    fn tool(&self) -> &Tool;

    /// Run the tool with the arguments the model produced
    async fn execute(&self, arguments: Value) -> AgentResult<ToolOutput>;
}

pub enum Capability {
    Executable(Box<dyn ToolExecutor>),
    Signal(Tool),
}

impl Capability {
    pub fn tool(&self) -> &Tool {
        match self {
            Capability::Executable(executor) => executor.tool(),
            Capability::Signal(tool) => tool,
        }
    }

    pub async fn invoke(&self, arguments: Value) -> AgentResult<ToolOutput> {
        match self {
            Capability::Executable(executor) => executor.execute(arguments).await,
            Capability::Signal(_) => Ok(ToolOutput::Signal),
        }
    }
}

/// Endpoints and credentials for the remote APIs behind the tools
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_search_host")]
    pub search_host: String,
    #[serde(default)]
    pub search_api_key: Option<String>,
    #[serde(default = "default_retrieve_host")]
    pub retrieve_host: String,
    #[serde(default = "default_retrieve_timeout_secs")]
    pub retrieve_timeout_secs: u64,
    #[serde(default = "default_weather_host")]
    pub weather_host: String,
    #[serde(default)]
    pub weather_api_key: Option<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            search_host: default_search_host(),
            search_api_key: None,
            retrieve_host: default_retrieve_host(),
            retrieve_timeout_secs: default_retrieve_timeout_secs(),
            weather_host: default_weather_host(),
            weather_api_key: None,
        }
    }
}

fn default_search_host() -> String {
    SEARCH_HOST.to_string()
}

fn default_retrieve_host() -> String {
    RETRIEVE_HOST.to_string()
}

fn default_retrieve_timeout_secs() -> u64 {
    15
}

fn default_weather_host() -> String {
    WEATHER_HOST.to_string()
}

/// The set of capabilities offered to the model for one request
#[derive(Default)]
pub struct Toolbox {
    capabilities: Vec<Capability>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Web search, retrieve, weather and the stock chart trigger
    pub fn standard(client: reqwest::Client, settings: &ToolSettings) -> Self {
        Self::new()
            .with(Capability::Executable(Box::new(WebSearchTool::new(
                client.clone(),
                &settings.search_host,
                settings.search_api_key.clone(),
            ))))
            .with(Capability::Executable(Box::new(RetrieveTool::new(
                client.clone(),
                &settings.retrieve_host,
                Duration::from_secs(settings.retrieve_timeout_secs),
            ))))
            .with(Capability::Executable(Box::new(WeatherTool::new(
                client,
                &settings.weather_host,
                settings.weather_api_key.clone(),
            ))))
            .with(stock_chart_capability())
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.capabilities
            .iter()
            .map(|capability| capability.tool().clone())
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&Capability> {
        self.capabilities
            .iter()
            .find(|capability| capability.tool().name == name)
    }

    pub async fn dispatch(&self, call: ToolCall) -> AgentResult<ToolOutput> {
        let capability = self
            .find(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        capability.invoke(call.arguments).await
    }
}

/// Deserialize tool arguments, reporting failures the way the model can act on
pub(crate) fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: Value,
) -> AgentResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| AgentError::InvalidParameters(format!("{}: {}", tool, e)))
}
