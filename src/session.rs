//! In-memory conversation sessions.
//!
//! Each session owns one ordered message history plus the set of file ids
//! attached to it. A turn takes the session's async lock for its whole
//! duration; a second message arriving mid-turn is rejected immediately
//! instead of queued.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::traits::{Message, ToolCall};

#[derive(Debug, Default)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub attached_files: Vec<String>,
}

impl Conversation {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            attached_files: Vec::new(),
        }
    }

    /// Append a message. Duplicate ids are dropped so a retried append can
    /// never double a message, and a new streaming message closes out any
    /// previous one first.
    pub fn push(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        if message.streaming {
            for m in self.messages.iter_mut() {
                m.streaming = false;
            }
        }
        self.messages.push(message);
    }

    /// Mark the streaming message complete, replacing its content with the
    /// provider's accumulated final text.
    pub fn finish_streaming(&mut self, content: Option<String>) {
        if let Some(m) = self.messages.iter_mut().find(|m| m.streaming) {
            m.streaming = false;
            if content.is_some() {
                m.content = content;
            }
        }
    }

    pub fn attach_file(&mut self, file_id: &str) {
        if !self.attached_files.iter().any(|f| f == file_id) {
            self.attached_files.push(file_id.to_string());
        }
    }

    pub fn detach_file(&mut self, file_id: &str) {
        self.attached_files.retain(|f| f != file_id);
    }

    /// Project the history into OpenAI chat wire format.
    pub fn wire_messages(&self) -> Vec<Value> {
        self.messages.iter().map(wire_message).collect()
    }
}

fn wire_message(m: &Message) -> Value {
    let mut obj = json!({
        "role": m.role,
        "content": m.content,
    });
    if let Some(calls_json) = &m.tool_calls_json {
        if let Ok(calls) = serde_json::from_str::<Vec<ToolCall>>(calls_json) {
            let wire: Vec<Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {"name": c.name, "arguments": c.arguments},
                    })
                })
                .collect();
            obj["tool_calls"] = Value::Array(wire);
        }
    }
    if let Some(call_id) = &m.tool_call_id {
        obj["tool_call_id"] = json!(call_id);
    }
    obj
}

/// A turn in progress. Holds the session lock until dropped.
pub type TurnGuard = OwnedMutexGuard<Conversation>;

#[derive(Default)]
pub struct SessionStore {
    sessions: parking_lot::Mutex<HashMap<String, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, session_id: &str) -> Arc<Mutex<Conversation>> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(session_id))))
            .clone()
    }

    /// Claim the session for a turn. Returns `None` when a turn is already
    /// running for this session.
    pub fn begin_turn(&self, session_id: &str) -> Option<TurnGuard> {
        self.entry(session_id).try_lock_owned().ok()
    }

    /// Await exclusive access outside the turn path (file attach, inspection).
    pub async fn open(&self, session_id: &str) -> TurnGuard {
        self.entry(session_id).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_turn_rejects_concurrent_turn() {
        let store = SessionStore::new();
        let guard = store.begin_turn("s1").expect("first turn");
        assert!(store.begin_turn("s1").is_none());
        // Other sessions are unaffected.
        assert!(store.begin_turn("s2").is_some());
        drop(guard);
        assert!(store.begin_turn("s1").is_some());
    }

    #[tokio::test]
    async fn test_push_drops_duplicate_ids() {
        let store = SessionStore::new();
        let mut conv = store.open("s1").await;
        let msg = Message::user("s1", "hello");
        conv.push(msg.clone());
        conv.push(msg);
        assert_eq!(conv.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_at_most_one_streaming_message() {
        let store = SessionStore::new();
        let mut conv = store.open("s1").await;
        let mut first = Message::assistant("s1", None);
        first.streaming = true;
        let mut second = Message::assistant("s1", None);
        second.streaming = true;
        conv.push(first);
        conv.push(second);
        assert_eq!(conv.messages.iter().filter(|m| m.streaming).count(), 1);
    }

    #[tokio::test]
    async fn test_finish_streaming_sets_final_content() {
        let store = SessionStore::new();
        let mut conv = store.open("s1").await;
        let mut msg = Message::assistant("s1", None);
        msg.streaming = true;
        conv.push(msg);
        conv.finish_streaming(Some("Hello".to_string()));
        let last = conv.messages.last().unwrap();
        assert!(!last.streaming);
        assert_eq!(last.content.as_deref(), Some("Hello"));

        // A None finish keeps whatever content the message already had.
        let mut msg = Message::assistant("s1", Some("partial".to_string()));
        msg.streaming = true;
        conv.push(msg);
        conv.finish_streaming(None);
        let last = conv.messages.last().unwrap();
        assert!(!last.streaming);
        assert_eq!(last.content.as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_attach_file_is_idempotent() {
        let store = SessionStore::new();
        let mut conv = store.open("s1").await;
        conv.attach_file("f1");
        conv.attach_file("f1");
        assert_eq!(conv.attached_files, vec!["f1"]);
        conv.detach_file("f1");
        assert!(conv.attached_files.is_empty());
    }

    #[tokio::test]
    async fn test_wire_messages_carry_tool_calls() {
        let store = SessionStore::new();
        let mut conv = store.open("s1").await;
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "head".to_string(),
            arguments: "{\"file_id\":\"f1\"}".to_string(),
        };
        let mut assistant = Message::assistant("s1", None);
        assistant.tool_calls_json =
            Some(serde_json::to_string(&vec![call.clone()]).unwrap());
        conv.push(assistant);
        conv.push(Message::tool_result("s1", &call, "{\"rows\":[]}".to_string()));

        let wire = conv.wire_messages();
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "head");
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_1");
    }
}
