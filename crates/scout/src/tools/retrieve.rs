use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::error;

use super::{parse_arguments, ToolExecutor};
use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolOutput};

pub const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
struct RetrieveArguments {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ExtractedPage {
    #[serde(default)]
    title: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Value,
}

/// Keep at most `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Fetches a page through the content-extraction proxy. Failures never reach the
/// model as errors: they are logged and the tool reports no result.
pub struct RetrieveTool {
    client: Client,
    host: String,
    timeout: Duration,
    tool: Tool,
}

impl RetrieveTool {
    pub fn new(client: Client, host: &str, timeout: Duration) -> Self {
        let tool = Tool::new(
            "retrieve",
            "Retrieve the information from the web search tool.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to retrieve the information from."
                    }
                }
            }),
        );

        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            timeout,
            tool,
        }
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<Value> {
        let response: ExtractionResponse = self
            .client
            .get(format!("{}/{}", self.host, url))
            .header("Accept", "application/json")
            .header("X-With-Generated-Alt", "true")
            .timeout(self.timeout)
            .send()
            .await?
            .json()
            .await?;

        if is_empty_payload(&response.data) {
            return Err(anyhow!("no data extracted from {}", url));
        }

        let page: ExtractedPage = serde_json::from_value(response.data)?;
        Ok(json!({
            "results": [{
                "title": page.title,
                "content": truncate_chars(&page.content, MAX_CONTENT_CHARS),
                "url": page.url,
            }],
            "query": "",
            "images": [],
        }))
    }

    pub async fn retrieve(&self, url: &str) -> Option<Value> {
        match self.fetch(url).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Retrieve API error for {}: {:#}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for RetrieveTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn execute(&self, arguments: Value) -> AgentResult<ToolOutput> {
        let args: RetrieveArguments = match parse_arguments(&self.tool.name, arguments) {
            Ok(args) => args,
            Err(e) => {
                error!("Retrieve called with unusable arguments: {}", e);
                return Ok(ToolOutput::Absent);
            }
        };

        Ok(match self.retrieve(&args.url).await {
            Some(value) => ToolOutput::Json(value),
            None => ToolOutput::Absent,
        })
    }
}
