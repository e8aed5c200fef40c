use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use crate::providers::{truncate_utf8, ProviderError};
use crate::traits::{ModelProvider, ProviderResponse, TokenUsage, ToolCall};

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Drop for OpenAiCompatibleProvider {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

/// Validate the base URL for security.
/// - HTTPS is required for remote URLs to protect API keys in transit
/// - HTTP is allowed only for localhost/127.0.0.1 (local LLM servers)
fn validate_base_url(base_url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(base_url)
        .map_err(|e| format!("Invalid base_url '{}': {}", base_url, e))?;

    let scheme = parsed.scheme();
    let host = parsed.host_str().unwrap_or("");

    match scheme {
        "https" => Ok(()),
        "http" => {
            let is_localhost =
                host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1";

            if is_localhost {
                warn!(
                    "Using unencrypted HTTP for local LLM server at '{}'. \
                     API key will be transmitted in cleartext.",
                    base_url
                );
                Ok(())
            } else {
                Err(format!(
                    "HTTP is not allowed for remote URLs (base_url: '{}'). \
                     Use HTTPS to protect your API key in transit. \
                     HTTP is only permitted for localhost.",
                    base_url
                ))
            }
        }
        _ => Err(format!(
            "Unsupported URL scheme '{}' in base_url '{}'. Only http and https are allowed.",
            scheme, base_url
        )),
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, String> {
        validate_base_url(base_url)?;

        // Zero means no client-side timeout.
        let mut builder = Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn consume_stream(
        &self,
        resp: reqwest::Response,
        model: &str,
        delta_tx: mpsc::Sender<String>,
    ) -> anyhow::Result<ProviderResponse> {
        let mut body_stream = resp.bytes_stream();
        let mut buf = String::new();
        let mut state = StreamState::default();

        while let Some(chunk) = body_stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::network(&e))?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            // SSE frames are newline-delimited "data: {...}" lines.
            while let Some(pos) = buf.find('\n') {
                let line: String = buf.drain(..=pos).collect();
                if let Some(delta) = state.apply_line(line.trim(), model) {
                    // A closed receiver means the client stopped listening;
                    // keep draining so the final response is still complete.
                    let _ = delta_tx.send(delta).await;
                }
            }
        }

        Ok(state.finish())
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        delta_tx: Option<mpsc::Sender<String>>,
    ) -> anyhow::Result<ProviderResponse> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if delta_tx.is_some() {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }

        let url = format!("{}/chat/completions", self.base_url);
        info!(model, url = %url, tools = tools.len(), streaming = delta_tx.is_some(), "Calling LLM API");

        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("HTTP request failed: {}", e);
                return Err(ProviderError::network(&e).into());
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, "Provider API error: {}", text);
            return Err(ProviderError::from_status(status.as_u16(), &text).into());
        }

        match delta_tx {
            Some(tx) => self.consume_stream(resp, model, tx).await,
            None => {
                let text = resp.text().await?;
                debug!("Provider response: {}", truncate_utf8(&text, 2000));
                parse_complete(&text, model)
            }
        }
    }
}

/// Parse a non-streaming chat completion body.
fn parse_complete(text: &str, model: &str) -> anyhow::Result<ProviderResponse> {
    let data: Value = serde_json::from_str(text)?;
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;
    let message = &choice["message"];

    let content = message["content"].as_str().map(|s| s.to_string());

    let mut tool_calls = Vec::new();
    if let Some(tcs) = message["tool_calls"].as_array() {
        for tc in tcs {
            tool_calls.push(ToolCall {
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"]
                    .as_str()
                    .unwrap_or("{}")
                    .to_string(),
            });
        }
    }

    let usage = parse_usage(data.get("usage"), model);

    Ok(ProviderResponse {
        content,
        tool_calls,
        usage,
    })
}

fn parse_usage(usage: Option<&Value>, model: &str) -> Option<TokenUsage> {
    let u = usage.filter(|u| !u.is_null())?;
    Some(TokenUsage {
        input_tokens: u.get("prompt_tokens")?.as_u64()? as u32,
        output_tokens: u.get("completion_tokens")?.as_u64()? as u32,
        model: model.to_string(),
    })
}

/// Accumulates deltas from an SSE completion stream. Tool-call fragments are
/// keyed by the `index` field; argument strings arrive in pieces and are
/// concatenated in order.
#[derive(Default)]
struct StreamState {
    content: String,
    calls: Vec<PartialToolCall>,
    usage: Option<TokenUsage>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamState {
    /// Apply one SSE line; returns the content delta if the line carried one.
    fn apply_line(&mut self, line: &str, model: &str) -> Option<String> {
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                debug!("Skipping unparseable stream line: {}", e);
                return None;
            }
        };

        // The usage-only chunk has an empty choices array.
        if let Some(usage) = parse_usage(value.get("usage"), model) {
            self.usage = Some(usage);
        }

        let delta = &value["choices"][0]["delta"];
        if let Some(fragments) = delta["tool_calls"].as_array() {
            for frag in fragments {
                let idx = frag["index"].as_u64().unwrap_or(0) as usize;
                while self.calls.len() <= idx {
                    self.calls.push(PartialToolCall::default());
                }
                let call = &mut self.calls[idx];
                if let Some(id) = frag["id"].as_str() {
                    call.id = id.to_string();
                }
                if let Some(name) = frag["function"]["name"].as_str() {
                    call.name = name.to_string();
                }
                if let Some(args) = frag["function"]["arguments"].as_str() {
                    call.arguments.push_str(args);
                }
            }
        }

        delta["content"].as_str().map(|piece| {
            self.content.push_str(piece);
            piece.to_string()
        })
    }

    fn finish(self) -> ProviderResponse {
        ProviderResponse {
            content: if self.content.is_empty() {
                None
            } else {
                Some(self.content)
            },
            tool_calls: self
                .calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.name,
                    arguments: if c.arguments.is_empty() {
                        "{}".to_string()
                    } else {
                        c.arguments
                    },
                })
                .collect(),
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        assert!(validate_base_url("https://api.openai.com").is_ok());
    }

    #[test]
    fn test_http_localhost_accepted() {
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("http://127.0.0.1:1234").is_ok());
        assert!(validate_base_url("http://[::1]:8080").is_ok());
    }

    #[test]
    fn test_http_remote_rejected() {
        let err = validate_base_url("http://api.example.com").unwrap_err();
        assert!(err.contains("HTTP is not allowed"), "got: {}", err);
    }

    #[test]
    fn test_ftp_rejected() {
        let err = validate_base_url("ftp://example.com").unwrap_err();
        assert!(err.contains("Unsupported URL scheme"), "got: {}", err);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let provider =
            OpenAiCompatibleProvider::new("https://api.openai.com/v1/", "test-key", 120).unwrap();
        assert!(!provider.base_url.ends_with('/'));
    }

    #[test]
    fn test_parse_complete_with_tool_calls() {
        let body = r#"{
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "head", "arguments": "{\"file_id\":\"f1\"}"}
                }]
            }}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let resp = parse_complete(body, "gpt-4o-mini").unwrap();
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "head");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn test_stream_accumulates_content_deltas() {
        let mut state = StreamState::default();
        let lines = [
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
            "data: [DONE]",
        ];
        let mut deltas = Vec::new();
        for line in lines {
            if let Some(d) = state.apply_line(line, "m") {
                deltas.push(d);
            }
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
        let resp = state.finish();
        assert_eq!(resp.content.as_deref(), Some("Hello"));
        assert_eq!(resp.usage.unwrap().output_tokens, 2);
    }

    #[test]
    fn test_stream_assembles_split_tool_call_fragments() {
        let mut state = StreamState::default();
        let lines = [
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"filter","arguments":"{\"file"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"_id\":\"f1\"}"}}]}}]}"#,
            "data: [DONE]",
        ];
        for line in lines {
            state.apply_line(line, "m");
        }
        let resp = state.finish();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "call_1");
        assert_eq!(resp.tool_calls[0].name, "filter");
        assert_eq!(resp.tool_calls[0].arguments, "{\"file_id\":\"f1\"}");
    }

    #[test]
    fn test_stream_ignores_noise_lines() {
        let mut state = StreamState::default();
        assert!(state.apply_line("", "m").is_none());
        assert!(state.apply_line(": keep-alive", "m").is_none());
        assert!(state.apply_line("data: not json", "m").is_none());
        assert!(state.finish().content.is_none());
    }
}
