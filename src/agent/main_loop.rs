use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::stream::AgentEvent;
use crate::traits::{Message, TokenUsage};

use super::{Agent, TurnSummary};

impl Agent {
    /// Run one turn: user message in, events out, until the model answers in
    /// plain text or a stopping condition fires. Exactly one terminal event
    /// (`Completed` or `Failed`) is emitted per call.
    pub async fn handle_message(
        &self,
        session_id: &str,
        user_text: &str,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> TurnSummary {
        let Some(mut conv) = self.sessions.begin_turn(session_id) else {
            info!(session_id, "Rejected message: turn already in progress");
            return self
                .fail(
                    &events,
                    TokenUsage::default(),
                    0,
                    "A turn is already running for this session.",
                    "turn_in_progress",
                )
                .await;
        };

        conv.push(Message::user(session_id, user_text));

        let tool_defs = self.tool_definitions();
        let system_prompt = self.system_prompt(&conv.attached_files);
        let mut usage = TokenUsage::default();
        let cap = self.config.max_iterations;

        for iteration in 1..=cap {
            if cancel.is_cancelled() {
                return self
                    .fail(&events, usage, iteration, "Turn cancelled.", "cancelled")
                    .await;
            }

            info!(session_id, iteration, "Agent loop iteration");

            let mut messages = vec![json!({"role": "system", "content": system_prompt})];
            messages.extend(conv.wire_messages());

            // Streaming placeholder: holds the invariant that at most one
            // message is mid-stream, and receives the final content.
            let mut placeholder = Message::assistant(session_id, None);
            placeholder.streaming = true;
            let placeholder_id = placeholder.id.clone();
            conv.push(placeholder);

            // Content deltas flow to the client while the call is in flight.
            let (delta_tx, mut delta_rx) = mpsc::channel::<String>(32);
            let delta_events = events.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(delta) = delta_rx.recv().await {
                    if delta_events.send(AgentEvent::Delta(delta)).await.is_err() {
                        break;
                    }
                }
            });

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    forwarder.abort();
                    conv.messages.retain(|m| m.id != placeholder_id);
                    return self
                        .fail(&events, usage, iteration, "Turn cancelled.", "cancelled")
                        .await;
                }
                result = self.call_llm(&messages, &tool_defs, delta_tx) => result,
            };
            // The provider dropped its sender; drain remaining deltas in order.
            let _ = forwarder.await;

            let resp = match result {
                Ok(resp) => resp,
                Err(turn_err) => {
                    conv.messages.retain(|m| m.id != placeholder_id);
                    return self
                        .fail(&events, usage, iteration, &turn_err.message, turn_err.code)
                        .await;
                }
            };

            if let Some(u) = &resp.usage {
                usage.absorb(u);
            }

            conv.finish_streaming(resp.content.clone());
            if resp.tool_calls.is_empty() {
                if resp.content.is_none() {
                    // The model produced nothing at all; keep history clean.
                    conv.messages.retain(|m| m.id != placeholder_id);
                }
                info!(
                    session_id,
                    iteration,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Turn complete"
                );
                let _ = events
                    .send(AgentEvent::Completed {
                        content: resp.content.clone(),
                        usage: Some(usage.clone()),
                    })
                    .await;
                return TurnSummary {
                    reply: resp.content,
                    usage,
                    iterations: iteration,
                    error_code: None,
                };
            }

            if let Some(m) = conv.messages.iter_mut().find(|m| m.id == placeholder_id) {
                m.tool_calls_json = serde_json::to_string(&resp.tool_calls).ok();
            }

            // Sequential execution, in the order the model asked.
            for (pos, call) in resp.tool_calls.iter().enumerate() {
                if cancel.is_cancelled() {
                    // Every id in the assistant's tool_calls must have a tool
                    // result, or the provider rejects the history next turn.
                    // Close out the calls that never ran.
                    for abandoned in &resp.tool_calls[pos..] {
                        let note = json!({
                            "error": {
                                "kind": "cancelled",
                                "message": "The turn was cancelled before this call ran.",
                            }
                        });
                        conv.push(Message::tool_result(session_id, abandoned, note.to_string()));
                    }
                    return self
                        .fail(&events, usage, iteration, "Turn cancelled.", "cancelled")
                        .await;
                }
                let _ = events.send(AgentEvent::ToolCallStarted(call.clone())).await;
                let (result, is_error) = self.execute_tool(call);
                let result_text = result.to_string();
                let _ = events
                    .send(AgentEvent::ToolResult {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        result,
                        is_error,
                    })
                    .await;
                conv.push(Message::tool_result(session_id, call, result_text));
            }
        }

        warn!(session_id, cap, "Iteration cap reached without a final answer");
        self.fail(
            &events,
            usage,
            cap,
            "The model kept requesting functions without settling on an answer.",
            "iteration_cap_exceeded",
        )
        .await
    }

    async fn fail(
        &self,
        events: &mpsc::Sender<AgentEvent>,
        usage: TokenUsage,
        iterations: usize,
        message: &str,
        code: &'static str,
    ) -> TurnSummary {
        let _ = events
            .send(AgentEvent::Failed {
                message: message.to_string(),
                code,
            })
            .await;
        TurnSummary {
            reply: None,
            usage,
            iterations,
            error_code: Some(code),
        }
    }
}
