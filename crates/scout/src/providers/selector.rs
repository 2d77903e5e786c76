//! Routes a requested model identifier to the upstream provider that serves it.

use anyhow::{anyhow, Result};

use super::configs::{
    AnthropicProviderConfig, EndpointSettings, OpenAiProviderConfig, ProviderConfig,
    ProviderEndpoints,
};

/// The one model identifier served by Anthropic; everything else goes to OpenAI
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20240620";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    OpenAi,
    Anthropic,
}

impl ModelProvider {
    pub fn for_model(model: &str) -> Self {
        if model == ANTHROPIC_MODEL {
            ModelProvider::Anthropic
        } else {
            ModelProvider::OpenAi
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "openai",
            ModelProvider::Anthropic => "anthropic",
        }
    }

    fn env_hint(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "OPENAI_API_KEY",
            ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// A provider paired with the model name to request from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ModelProvider,
    pub model: String,
}

impl ModelSelection {
    /// Total mapping from identifier to provider. The identifier is passed through
    /// unmodified and is not validated here.
    pub fn select(model: &str) -> Self {
        Self {
            provider: ModelProvider::for_model(model),
            model: model.to_string(),
        }
    }

    /// Build the client configuration for this selection
    pub fn into_config(self, endpoints: &ProviderEndpoints) -> Result<ProviderConfig> {
        match self.provider {
            ModelProvider::OpenAi => {
                let settings = &endpoints.openai;
                Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                    host: settings.host.clone(),
                    api_key: api_key(self.provider, settings)?,
                    model: self.model,
                    temperature: settings.temperature,
                    max_tokens: settings.max_tokens,
                }))
            }
            ModelProvider::Anthropic => {
                let settings = &endpoints.anthropic;
                Ok(ProviderConfig::Anthropic(AnthropicProviderConfig {
                    host: settings.host.clone(),
                    api_key: api_key(self.provider, settings)?,
                    model: self.model,
                    temperature: settings.temperature,
                    max_tokens: settings.max_tokens,
                }))
            }
        }
    }
}

fn api_key(provider: ModelProvider, settings: &EndpointSettings) -> Result<String> {
    settings
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "No API key configured for {}, set {}",
                provider.name(),
                provider.env_hint()
            )
        })
}
