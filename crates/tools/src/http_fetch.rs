//! HTTP fetch tool: GET a URL and return the status and (truncated) body.

use agentwire_core::error::ToolError;
use agentwire_core::tool::{Tool, required_str};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

/// Bodies longer than this many characters are cut.
const MAX_BODY_CHARS: usize = 8_000;

pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("agentwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn upstream(reason: impl ToString) -> ToolError {
    ToolError::UpstreamFailure {
        tool_name: "http_fetch".into(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page or API endpoint with HTTP GET and return its status code and body text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http:// or https:// URL"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let url = required_str(&arguments, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidInput("url must start with http:// or https://".into()));
        }

        tracing::debug!(url, "Fetching URL");
        let response = self.client.get(url).send().await.map_err(upstream)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(upstream)?;

        let truncated = text.chars().count() > MAX_BODY_CHARS;
        let body: String = if truncated {
            text.chars().take(MAX_BODY_CHARS).collect()
        } else {
            text
        };

        Ok(json!({
            "url": url,
            "status": status,
            "body": body,
            "truncated": truncated,
        }))
    }
}
