use std::collections::HashMap;

use epistle_core::types::ChatMessage;

/// Shared state threaded through a graph run.
///
/// Two merge policies exist. The message history is append-only: updates
/// concatenate onto it and never replace it. Every other field lives in a
/// string-keyed map with last-writer-wins semantics; an absent key means
/// "not yet set". Values are JSON for flexibility, same as the data the
/// nodes exchange with the model.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    messages: Vec<ChatMessage>,
    fields: HashMap<String, serde_json::Value>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the state with an initial message history.
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Seed the state with a string field.
    pub fn with_str(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_str(key, value);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Merge a partial update into this state.
    ///
    /// New messages are appended in order; fields overwrite the existing
    /// value for their key. Keys absent from the update are untouched.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        for (k, v) in update.fields {
            self.fields.insert(k, v);
        }
    }
}

/// A node's partial state update.
///
/// Carries only the keys the node intends to affect.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) fields: HashMap<String, serde_json::Value>,
}

impl StateUpdate {
    /// An update that touches nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// An update appending a single message.
    pub fn message(message: ChatMessage) -> Self {
        Self {
            messages: vec![message],
            fields: HashMap::new(),
        }
    }

    /// An update appending several messages in order.
    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            fields: HashMap::new(),
        }
    }

    /// An update overwriting a single field.
    pub fn field(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut fields = HashMap::new();
        fields.insert(key.into(), value);
        Self {
            messages: vec![],
            fields,
        }
    }

    /// An update overwriting a single string field.
    pub fn field_str(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::field(key, serde_json::Value::String(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.fields.is_empty()
    }
}
