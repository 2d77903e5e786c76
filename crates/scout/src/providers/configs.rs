use serde::Deserialize;

pub const OPENAI_HOST: &str = "https://api.openai.com";
pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";

/// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Anthropic(AnthropicProviderConfig),
}

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

/// Operator settings for one upstream model API. The model name is chosen per request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EndpointSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl EndpointSettings {
    pub fn new<S: Into<String>>(host: S, api_key: Option<String>) -> Self {
        Self {
            host: host.into(),
            api_key,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Settings for every provider a request may be routed to
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderEndpoints {
    pub openai: EndpointSettings,
    pub anthropic: EndpointSettings,
}
