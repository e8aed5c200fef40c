//! One guarded LLM call: watchdog timeout plus error classification into the
//! stable codes the wire protocol reports.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::providers::ProviderError;
use crate::traits::ProviderResponse;

use super::Agent;

/// A turn-fatal failure with its wire error code.
#[derive(Debug)]
pub(super) struct TurnError {
    pub message: String,
    pub code: &'static str,
}

impl Agent {
    pub(super) async fn call_llm(
        &self,
        messages: &[Value],
        tools: &[Value],
        delta_tx: mpsc::Sender<String>,
    ) -> Result<ProviderResponse, TurnError> {
        let timeout_secs = self.config.llm_timeout_secs;
        let call = self
            .provider
            .chat(&self.model, messages, tools, Some(delta_tx));

        // Zero disables the watchdog.
        let outcome = if timeout_secs == 0 {
            Ok(call.await)
        } else {
            tokio::time::timeout(Duration::from_secs(timeout_secs), call).await
        };
        match outcome {
            Err(_elapsed) => {
                warn!(timeout_secs, "LLM call timed out");
                let err = ProviderError::timeout(timeout_secs);
                Err(TurnError {
                    message: err.user_message(),
                    code: err.code(),
                })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "LLM call failed");
                Err(match e.downcast_ref::<ProviderError>() {
                    Some(provider_err) => TurnError {
                        message: provider_err.user_message(),
                        code: provider_err.code(),
                    },
                    None => TurnError {
                        message: e.to_string(),
                        code: "upstream_error",
                    },
                })
            }
            Ok(Ok(resp)) => Ok(resp),
        }
    }
}
