use super::{error_value, require_str, LocalTool, ToolContext};
use crate::domain::tool::ToolDeclaration;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_MAX_RESULTS: u64 = 5;

pub struct WebFetchTool;

#[async_trait]
impl LocalTool for WebFetchTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "WebFetch",
            "Fetch content from a URL",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to fetch"
                    }
                },
                "required": ["url"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let url = match require_str(&args, "url") {
            Ok(value) => value,
            Err(error) => return error,
        };

        info!(url, "fetching url");
        let response = match ctx.http.get(url).timeout(HTTP_TIMEOUT).send().await {
            Ok(response) => response,
            Err(err) => return error_value(format!("fetch failed: {err}")),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !(200..300).contains(&status) {
            return error_value(format!("fetch failed with status {status}"));
        }

        match response.text().await {
            Ok(content) => {
                info!(url, bytes = content.len(), "fetched url");
                json!({
                    "content": content,
                    "url": url,
                    "status_code": status,
                    "content_type": content_type,
                })
            }
            Err(err) => error_value(format!("failed to read response body: {err}")),
        }
    }
}

pub struct WebSearchTool;

#[async_trait]
impl LocalTool for WebSearchTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "WebSearch",
            "Perform a web search and return the top results",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 5)"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let query = match require_str(&args, "query") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_RESULTS) as usize;

        info!(query, "running web search");
        let response = match ctx
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[("q", query)])
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return error_value(format!("search failed: {err}")),
        };
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return error_value(format!("failed to read search response: {err}")),
        };

        let results = extract_results(&body, max_results);
        info!(query, count = results.len(), "web search finished");
        json!({
            "results": results,
            "query": query,
            "count": results.len(),
        })
    }
}

/// Pulls result links out of the DuckDuckGo HTML listing. The markup has
/// been stable for years: each hit is an anchor with class `result__a`.
fn extract_results(body: &str, max_results: usize) -> Vec<Value> {
    let anchor =
        regex::Regex::new(r#"<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
            .ok();
    let tag = regex::Regex::new(r"<[^>]+>").ok();
    let (Some(anchor), Some(tag)) = (anchor, tag) else {
        return Vec::new();
    };

    anchor
        .captures_iter(body)
        .take(max_results)
        .map(|capture| {
            let url = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let raw_title = capture.get(2).map(|m| m.as_str()).unwrap_or_default();
            let title = tag.replace_all(raw_title, "").trim().to_string();
            json!({ "title": title, "url": url })
        })
        .collect()
}
