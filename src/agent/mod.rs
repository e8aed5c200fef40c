//! The conversational agent: owns the provider, the function registry, the
//! query engine, and the per-session conversation state. One call to
//! `handle_message` runs one full turn.

mod llm;
mod main_loop;
mod tool_exec;

use std::sync::Arc;

use serde_json::Value;

use crate::config::AgentConfig;
use crate::query::QueryEngine;
use crate::registry::FunctionRegistry;
use crate::session::SessionStore;
use crate::store::FileStore;
use crate::traits::{ModelProvider, TokenUsage};

pub struct Agent {
    provider: Arc<dyn ModelProvider>,
    store: Arc<FileStore>,
    engine: QueryEngine,
    registry: FunctionRegistry,
    sessions: SessionStore,
    config: AgentConfig,
    model: String,
}

/// What a finished turn looked like, for logging and accounting.
#[derive(Debug, Default)]
pub struct TurnSummary {
    pub reply: Option<String>,
    pub usage: TokenUsage,
    pub iterations: usize,
    pub error_code: Option<&'static str>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<FileStore>,
        engine: QueryEngine,
        config: AgentConfig,
        model: String,
    ) -> Self {
        Self {
            provider,
            store,
            engine,
            registry: FunctionRegistry::new(),
            sessions: SessionStore::new(),
            config,
            model,
        }
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn surface_tool_results(&self) -> bool {
        self.config.surface_tool_results
    }

    /// Attach an uploaded file to a session so the model hears about it.
    pub async fn attach_file(&self, session_id: &str, file_id: &str) {
        let mut conv = self.sessions.open(session_id).await;
        conv.attach_file(file_id);
    }

    fn tool_definitions(&self) -> Vec<Value> {
        self.registry.tool_definitions()
    }

    /// System prompt: identity plus a catalog of the session's attached files.
    fn system_prompt(&self, attached: &[String]) -> String {
        let mut prompt = String::from(
            "You are a data analyst assistant. The user has uploaded spreadsheet \
             files; answer their questions by calling the provided functions \
             against those files. Always pass the file_id exactly as listed. \
             Report numbers from function results only, never from memory.",
        );
        let mut listed = 0usize;
        for file_id in attached {
            // A deleted file silently drops out of the catalog.
            if let Some(record) = self.store.record(file_id) {
                if listed == 0 {
                    prompt.push_str("\n\nAttached files:");
                }
                listed += 1;
                prompt.push_str(&format!(
                    "\n- {} (file_id: {}, sheets: [{}], {} rows)",
                    record.filename,
                    record.id,
                    record.sheet_names.join(", "),
                    record.row_count,
                ));
            }
        }
        if listed == 0 {
            prompt.push_str(
                "\n\nNo files are attached yet. Tell the user to upload a file first \
                 if they ask about data.",
            );
        }
        prompt
    }
}
