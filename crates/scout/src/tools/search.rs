use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use tracing::debug;

use super::{parse_arguments, ToolExecutor};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolOutput};

pub const MIN_RESULTS: u32 = 5;
const DEFAULT_RESULTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArguments {
    query: String,
    #[serde(default)]
    max_results: Option<f64>,
    #[serde(default)]
    search_depth: SearchDepth,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
    query: &'a str,
    max_results: Number,
    search_depth: SearchDepth,
    include_images: bool,
    include_answers: bool,
}

/// One search hit. Only the fields the model reads are kept, and any of them may be
/// missing upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

/// The number of results requested upstream. Anything below five becomes five, and
/// larger numbers are sent exactly as the model gave them.
pub fn effective_max_results(requested: Option<f64>) -> Number {
    let requested = requested.unwrap_or(DEFAULT_RESULTS);
    if requested.is_nan() || requested < MIN_RESULTS as f64 {
        return Number::from(MIN_RESULTS);
    }
    if requested.fract() == 0.0 && requested <= u64::MAX as f64 {
        Number::from(requested as u64)
    } else {
        // Infinity has no JSON form
        Number::from_f64(requested).unwrap_or_else(|| Number::from(MIN_RESULTS))
    }
}

pub struct WebSearchTool {
    client: Client,
    host: String,
    api_key: Option<String>,
    tool: Tool,
}

impl WebSearchTool {
    pub fn new(client: Client, host: &str, api_key: Option<String>) -> Self {
        let tool = Tool::new(
            "web_search",
            "Search the web for information with the given query, max results and search depth.",
            json!({
                "type": "object",
                "required": ["query", "maxResults", "searchDepth"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to look up on the web."
                    },
                    "maxResults": {
                        "type": "number",
                        "description": "The maximum number of results to return. Default to be used is 10."
                    },
                    "searchDepth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "description": "The search depth to use for the search. Default is basic."
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

    pub async fn search(
        &self,
        query: &str,
        max_results: Option<f64>,
        search_depth: SearchDepth,
    ) -> anyhow::Result<Vec<SearchResult>> {
        let request = SearchRequest {
            api_key: self.api_key.as_deref(),
            query,
            max_results: effective_max_results(max_results),
            search_depth,
            include_images: true,
            include_answers: true,
        };
        debug!(query, max_results = %request.max_results, "searching the web");

        let response: SearchResponse = self
            .client
            .post(format!("{}/search", self.host))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        Ok(response.results)
    }
}

#[async_trait]
impl ToolExecutor for WebSearchTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn execute(&self, arguments: Value) -> AgentResult<ToolOutput> {
        let args: SearchArguments = parse_arguments(&self.tool.name, arguments)?;
        if args.query.trim().is_empty() {
            return Err(AgentError::InvalidParameters(
                "web_search: query must not be empty".to_string(),
            ));
        }

        let results = self
            .search(&args.query, args.max_results, args.search_depth)
            .await
            .map_err(|e| AgentError::ExecutionError(format!("web_search: {}", e)))?;

        Ok(ToolOutput::Json(json!({ "results": results })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search_payload() -> Value {
        json!({
            "query": "rust async",
            "answer": "Rust has async/await.",
            "images": ["https://example.com/a.png"],
            "results": [
                {
                    "url": "https://rust-lang.org",
                    "title": "Rust",
                    "content": "A language empowering everyone.",
                    "raw_content": null,
                    "score": 0.98
                },
                {
                    "url": "https://tokio.rs",
                    "title": "Tokio",
                    "content": "An asynchronous runtime."
                }
            ]
        })
    }

    #[test]
    fn test_effective_max_results() {
        assert_eq!(effective_max_results(Some(1.0)), Number::from(5));
        assert_eq!(effective_max_results(Some(5.0)), Number::from(5));
        assert_eq!(effective_max_results(Some(-3.0)), Number::from(5));
        assert_eq!(effective_max_results(Some(f64::NAN)), Number::from(5));
        assert_eq!(effective_max_results(Some(6.0)), Number::from(6));
        assert_eq!(effective_max_results(Some(20.0)), Number::from(20));
        assert_eq!(effective_max_results(None), Number::from(10));
        assert_eq!(effective_max_results(Some(6.7)).as_f64(), Some(6.7));
        assert_eq!(effective_max_results(Some(f64::INFINITY)), Number::from(5));
    }

    #[tokio::test]
    async fn test_search_clamps_and_requests_images_and_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tvly-test",
                "query": "rust async",
                "max_results": 5,
                "search_depth": "advanced",
                "include_images": true,
                "include_answers": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Client::new(), &server.uri(), Some("tvly-test".into()));
        let output = tool
            .execute(json!({"query": "rust async", "maxResults": 2, "searchDepth": "advanced"}))
            .await
            .unwrap();

        let ToolOutput::Json(value) = output else {
            panic!("Expected JSON output");
        };
        let results = value["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://rust-lang.org");
        assert_eq!(results[1]["title"], "Tokio");
        assert!(results[0].get("score").is_none());
        assert_eq!(results[1]["raw_content"], Value::Null);
    }

    #[tokio::test]
    async fn test_search_passes_larger_max_results_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"max_results": 12, "search_depth": "basic"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Client::new(), &server.uri(), None);
        let results = tool
            .search("rust async", Some(12.0), SearchDepth::Basic)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_fractional_max_results_are_not_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"max_results": 6.7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Client::new(), &server.uri(), None);
        tool.search("rust async", Some(6.7), SearchDepth::Basic)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_results_with_missing_fields_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"url": "https://blog.example/untitled", "content": "No title here."},
                    {"url": "https://tokio.rs", "title": null, "content": null}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Client::new(), &server.uri(), None);
        let output = tool
            .execute(json!({"query": "untitled", "maxResults": 5, "searchDepth": "basic"}))
            .await
            .unwrap();

        let ToolOutput::Json(value) = output else {
            panic!("Expected JSON output");
        };
        let results = value["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["title"], Value::Null);
        assert_eq!(results[0]["content"], "No title here.");
        assert_eq!(results[1]["url"], "https://tokio.rs");
    }

    #[tokio::test]
    async fn test_search_failure_is_a_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": {"error": "Unauthorized"}})),
            )
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(Client::new(), &server.uri(), None);
        let err = tool
            .execute(json!({"query": "rust", "maxResults": 10, "searchDepth": "basic"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ExecutionError(_)));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let tool = WebSearchTool::new(Client::new(), "http://127.0.0.1:9", None);
        let err = tool.execute(json!({"query": "  "})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));

        let err = tool
            .execute(json!({"query": "rust", "searchDepth": "deep"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }
}
