use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_arguments, ToolExecutor};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolOutput};

#[derive(Debug, Deserialize)]
struct WeatherArguments {
    lat: f64,
    lon: f64,
}

/// Five day forecast for a coordinate pair, returned exactly as the forecast API sends it
pub struct WeatherTool {
    client: Client,
    host: String,
    api_key: Option<String>,
    tool: Tool,
}

impl WeatherTool {
    pub fn new(client: Client, host: &str, api_key: Option<String>) -> Self {
        let tool = Tool::new(
            "get_weather_data",
            "Get the weather data for the given coordinates.",
            json!({
                "type": "object",
                "required": ["lat", "lon"],
                "properties": {
                    "lat": {
                        "type": "number",
                        "description": "The latitude of the location."
                    },
                    "lon": {
                        "type": "number",
                        "description": "The longitude of the location."
                    }
                }
            }),
        );

        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            tool,
        }
    }

    pub async fn forecast(&self, lat: f64, lon: f64) -> anyhow::Result<Value> {
        let forecast = self
            .client
            .get(format!("{}/data/2.5/forecast", self.host))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone().unwrap_or_default()),
            ])
            .send()
            .await?
            .json()
            .await?;
        Ok(forecast)
    }
}

#[async_trait]
impl ToolExecutor for WeatherTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn execute(&self, arguments: Value) -> AgentResult<ToolOutput> {
        let args: WeatherArguments = parse_arguments(&self.tool.name, arguments)?;
        let forecast = self
            .forecast(args.lat, args.lon)
            .await
            .map_err(|e| AgentError::ExecutionError(format!("get_weather_data: {}", e)))?;
        Ok(ToolOutput::Json(forecast))
    }
}
