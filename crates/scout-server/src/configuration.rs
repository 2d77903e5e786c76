use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use scout::agent::DEFAULT_MAX_STEPS;
use scout::providers::configs::{
    EndpointSettings, ProviderEndpoints, ANTHROPIC_HOST, OPENAI_HOST,
};
use scout::tools::ToolSettings;
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;

/// Conventional variables read as defaults, beneath any `SCOUT_` override
const CONVENTIONAL_KEYS: [(&str, &str); 4] = [
    ("openai.api_key", "OPENAI_API_KEY"),
    ("anthropic.api_key", "ANTHROPIC_API_KEY"),
    ("tools.search_api_key", "TAVILY_API_KEY"),
    ("tools.weather_api_key", "OPENWEATHER_API_KEY"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on one streamed reply
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub openai: EndpointSettings,
    pub anthropic: EndpointSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            openai: self.openai.clone(),
            anthropic: self.anthropic.clone(),
        }
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("server.request_timeout_secs", default_request_timeout_secs())?
            // Provider defaults
            .set_default("openai.host", OPENAI_HOST)?
            .set_default("anthropic.host", ANTHROPIC_HOST)?;

        for (key, var) in CONVENTIONAL_KEYS {
            if let Ok(value) = env::var(var) {
                builder = builder.set_default(key, value)?;
            }
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("SCOUT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}
