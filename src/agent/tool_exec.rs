//! Execution of one model-requested function call. A failed call is data for
//! the model (a structured error payload in the tool result), never a turn
//! failure — the model gets a chance to correct itself.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::query::QueryError;
use crate::traits::ToolCall;

use super::Agent;

impl Agent {
    /// Returns the tool-result payload and whether it is an error.
    pub(super) fn execute_tool(&self, call: &ToolCall) -> (Value, bool) {
        debug!(tool = %call.name, args = %call.arguments, "Executing function call");

        let args = match self.registry.validate(&call.name, &call.arguments) {
            Ok(map) => map,
            Err(e) => {
                info!(tool = %call.name, error = %e, "Function call rejected by schema");
                return error_payload("validation", &e.to_string());
            }
        };

        match self.engine.execute(&call.name, &args) {
            Ok(result) => (result, false),
            Err(QueryError::Validation(e)) => error_payload("validation", &e.to_string()),
            Err(e) => {
                info!(tool = %call.name, error = %e, "Function call failed");
                error_payload("execution", &e.to_string())
            }
        }
    }
}

fn error_payload(kind: &str, message: &str) -> (Value, bool) {
    (json!({"error": {"kind": kind, "message": message}}), true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{AgentConfig, FilesConfig};
    use crate::query::QueryEngine;
    use crate::store::FileStore;
    use crate::testing::MockProvider;

    fn agent_with_sales() -> (Agent, String) {
        let store = Arc::new(FileStore::new());
        let record = store
            .upload(b"region,amount\neast,10\nwest,20\neast,30\n", "sales.csv")
            .unwrap();
        let engine = QueryEngine::new(store.clone(), FilesConfig::default());
        let agent = Agent::new(
            Arc::new(MockProvider::new()),
            store,
            engine,
            AgentConfig::default(),
            "mock-model".to_string(),
        );
        (agent, record.id)
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_successful_call_returns_result() {
        let (agent, id) = agent_with_sales();
        let (result, is_error) =
            agent.execute_tool(&call("head", &format!(r#"{{"file_id":"{}","n":2}}"#, id)));
        assert!(!is_error);
        assert_eq!(result["returned"], json!(2));
    }

    #[test]
    fn test_unknown_function_is_validation_error() {
        let (agent, id) = agent_with_sales();
        let (result, is_error) =
            agent.execute_tool(&call("explode", &format!(r#"{{"file_id":"{}"}}"#, id)));
        assert!(is_error);
        assert_eq!(result["error"]["kind"], json!("validation"));
    }

    #[test]
    fn test_malformed_arguments_is_validation_error() {
        let (agent, _) = agent_with_sales();
        let (result, is_error) = agent.execute_tool(&call("head", "not json"));
        assert!(is_error);
        assert_eq!(result["error"]["kind"], json!("validation"));
    }

    #[test]
    fn test_missing_file_is_execution_error() {
        let (agent, _) = agent_with_sales();
        let (result, is_error) =
            agent.execute_tool(&call("head", r#"{"file_id":"ghost"}"#));
        assert!(is_error);
        assert_eq!(result["error"]["kind"], json!("execution"));
    }
}
