//! Wire protocol for streaming a turn to a client.
//!
//! The agent emits internal `AgentEvent`s; `forward` maps them onto the
//! public `WireEvent` frames in arrival order and guarantees exactly one
//! terminal frame (`done` or `error`) per turn. Anything arriving after the
//! terminal frame is dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::traits::{TokenUsage, ToolCall};

/// Internal turn events produced by the agent loop.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Delta(String),
    ToolCallStarted(ToolCall),
    ToolResult {
        call_id: String,
        name: String,
        result: Value,
        is_error: bool,
    },
    Completed {
        content: Option<String>,
        usage: Option<TokenUsage>,
    },
    Failed {
        message: String,
        code: &'static str,
    },
}

/// One frame on the client-facing stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Chunk {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        name: String,
        result: Value,
        is_error: bool,
    },
    Done,
    Error {
        message: String,
        code: String,
    },
}

impl WireEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::Done | WireEvent::Error { .. })
    }
}

/// Drain agent events into wire frames until the turn terminates.
///
/// `surface_tool_results` gates `tool_result` frames only; tool-call frames
/// are always forwarded so the client can show activity.
pub async fn forward(
    mut rx: mpsc::Receiver<AgentEvent>,
    tx: mpsc::Sender<WireEvent>,
    surface_tool_results: bool,
) {
    while let Some(event) = rx.recv().await {
        let frame = match event {
            AgentEvent::Delta(content) => WireEvent::Chunk { content },
            AgentEvent::ToolCallStarted(call) => WireEvent::ToolCall {
                id: call.id,
                name: call.name,
                // The model's raw argument string, parsed when well-formed.
                arguments: serde_json::from_str(&call.arguments)
                    .unwrap_or(Value::String(call.arguments)),
            },
            AgentEvent::ToolResult {
                call_id,
                name,
                result,
                is_error,
            } => {
                if !surface_tool_results {
                    continue;
                }
                WireEvent::ToolResult {
                    id: call_id,
                    name,
                    result,
                    is_error,
                }
            }
            AgentEvent::Completed { .. } => WireEvent::Done,
            AgentEvent::Failed { message, code } => WireEvent::Error {
                message,
                code: code.to_string(),
            },
        };
        let terminal = frame.is_terminal();
        if tx.send(frame).await.is_err() {
            return; // client went away
        }
        if terminal {
            return;
        }
    }
}
