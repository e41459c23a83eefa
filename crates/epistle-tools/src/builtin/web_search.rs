use futures::future::BoxFuture;
use serde_json::json;

use epistle_core::error::{EpistleError, Result};
use epistle_core::traits::Tool;
use epistle_core::types::ToolResult;

/// Tavily web search.
///
/// `max_results` set at construction is the default; a per-call
/// `max_results` in the input wins.
pub struct WebSearchTool {
    api_key: String,
    max_results: u64,
    http: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: &str, max_results: u64) -> Self {
        Self {
            api_key: api_key.to_string(),
            max_results,
            http: reqwest::Client::new(),
        }
    }
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns relevant results with snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results"
                }
            },
            "required": ["query"]
        })
    }

    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let query = input["query"]
                .as_str()
                .ok_or_else(|| EpistleError::ToolValidation("'query' must be a string".into()))?;
            let max = input["max_results"].as_u64().unwrap_or(self.max_results);

            let resp = self
                .http
                .post("https://api.tavily.com/search")
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": max,
                }))
                .send()
                .await
                .map_err(|e| EpistleError::ToolExecution {
                    tool: "web_search".into(),
                    message: e.to_string(),
                })?;

            let body: serde_json::Value =
                resp.json().await.map_err(|e| EpistleError::ToolExecution {
                    tool: "web_search".into(),
                    message: e.to_string(),
                })?;

            let results = body["results"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .map(|r| {
                            format!(
                                "**{}**\n{}\nURL: {}",
                                r["title"].as_str().unwrap_or(""),
                                r["content"].as_str().unwrap_or(""),
                                r["url"].as_str().unwrap_or("")
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n\n---\n\n")
                })
                .unwrap_or_else(|| "No results found.".into());

            Ok(ToolResult::success(results))
        })
    }
}
