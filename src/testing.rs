//! Test infrastructure: MockProvider and a fully wired Agent over an
//! in-memory store, suitable for integration tests that exercise the real
//! agent loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::agent::Agent;
use crate::config::{AgentConfig, FilesConfig};
use crate::query::QueryEngine;
use crate::store::FileStore;
use crate::traits::{ModelProvider, ProviderResponse, TokenUsage, ToolCall};

/// A recorded call to `MockProvider::chat()`.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MockChatCall {
    pub model: String,
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
}

/// Mock LLM provider that returns scripted responses.
pub struct MockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    pub call_log: Mutex<Vec<MockChatCall>>,
}

impl MockProvider {
    /// Create a provider that always returns "Mock response".
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider with a FIFO queue of scripted responses.
    pub fn with_responses(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Helper: build a text-only ProviderResponse.
    pub fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                model: "mock".to_string(),
            }),
        }
    }

    /// Helper: build a single-tool-call ProviderResponse.
    pub fn tool_call_response(tool_name: &str, args: &str) -> ProviderResponse {
        ProviderResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                name: tool_name.to_string(),
                arguments: args.to_string(),
            }],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                model: "mock".to_string(),
            }),
        }
    }

    /// How many times `chat()` was called.
    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        delta_tx: Option<mpsc::Sender<String>>,
    ) -> anyhow::Result<ProviderResponse> {
        self.call_log.lock().await.push(MockChatCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        });

        let mut responses = self.responses.lock().await;
        let resp = if responses.is_empty() {
            MockProvider::text_response("Mock response")
        } else {
            responses.remove(0)
        };

        // Scripted content streams out as one delta per response.
        if let (Some(tx), Some(content)) = (&delta_tx, &resp.content) {
            let _ = tx.send(content.clone()).await;
        }

        Ok(resp)
    }
}

/// Everything needed to run integration tests against the agent.
pub struct TestHarness {
    pub agent: Agent,
    pub provider: Arc<MockProvider>,
    pub store: Arc<FileStore>,
    pub file_id: String,
}

/// Build a fully wired agent with a mock provider and one uploaded CSV
/// (region/amount sales data). Each call gets an isolated store.
pub fn setup_test_agent(provider: MockProvider) -> TestHarness {
    let store = Arc::new(FileStore::new());
    let record = store
        .upload(b"region,amount\neast,10\nwest,20\neast,30\n", "sales.csv")
        .expect("upload test csv");
    let engine = QueryEngine::new(store.clone(), FilesConfig::default());
    let provider = Arc::new(provider);
    let agent = Agent::new(
        provider.clone(),
        store.clone(),
        engine,
        AgentConfig::default(),
        "mock-model".to_string(),
    );
    TestHarness {
        agent,
        provider,
        store,
        file_id: record.id,
    }
}
