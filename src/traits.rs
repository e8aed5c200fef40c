use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// A single message in a conversation. Shaped so it round-trips to the
/// OpenAI chat wire format without a separate DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: String, // "system", "user", "assistant", "tool"
    pub content: Option<String>,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_calls_json: Option<String>, // serialized Vec<ToolCall>
    pub created_at: DateTime<Utc>,
    /// True only while assistant content is still being streamed in.
    /// At most one message per conversation may be streaming at any instant.
    #[serde(default)]
    pub streaming: bool,
}

impl Message {
    pub fn user(session_id: &str, text: &str) -> Self {
        Self::bare(session_id, "user", Some(text.to_string()))
    }

    pub fn assistant(session_id: &str, content: Option<String>) -> Self {
        Self::bare(session_id, "assistant", content)
    }

    /// A tool-result message keyed by the originating tool-call id.
    pub fn tool_result(session_id: &str, call: &ToolCall, result_text: String) -> Self {
        let mut msg = Self::bare(session_id, "tool", Some(result_text));
        msg.tool_call_id = Some(call.id.clone());
        msg.tool_name = Some(call.name.clone());
        msg
    }

    fn bare(session_id: &str, role: &str, content: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: role.to_string(),
            content,
            tool_call_id: None,
            tool_name: None,
            tool_calls_json: None,
            created_at: Utc::now(),
            streaming: false,
        }
    }
}

/// A single tool call as returned by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String, // raw JSON string, exactly as the model sent it
}

/// Token usage statistics from an LLM API response.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
}

impl TokenUsage {
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        if self.model.is_empty() {
            self.model = other.model.clone();
        }
    }
}

/// The LLM's response: either content text, tool calls, or both.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

/// Model provider — sends messages + tool defs to an LLM, gets back a response.
///
/// `delta_tx` receives incremental content tokens as they arrive; the returned
/// `ProviderResponse` carries the fully accumulated content and tool calls.
/// Passing `None` disables streaming delivery (the response is still complete).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        delta_tx: Option<mpsc::Sender<String>>,
    ) -> anyhow::Result<ProviderResponse>;
}
