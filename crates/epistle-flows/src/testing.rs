//! Scripted capability doubles shared by the pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::json;

use epistle_core::config::ModelConfig;
use epistle_core::error::{EpistleError, Result};
use epistle_core::traits::{LanguageModel, MailTransport, Tool};
use epistle_core::types::*;

/// Replays a fixed sequence of assistant messages.
pub struct ScriptedModel {
    responses: Mutex<Vec<ChatMessage>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ChatMessage>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    /// An assistant message carrying one tool-use block.
    pub fn tool_call(name: &str, input: serde_json::Value) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: format!("call_{}", name),
                name: name.to_string(),
                input,
            }],
            timestamp: None,
        }
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
        _tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ChatMessage>> {
        Box::pin(async move {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(EpistleError::LlmRequest("script exhausted".into()));
            }
            Ok(responses.remove(0))
        })
    }
}

/// Returns a canned result for every query and counts invocations.
pub struct CannedSearchTool {
    result: String,
    calls: Arc<AtomicUsize>,
}

impl CannedSearchTool {
    pub fn new(result: &str) -> Self {
        Self {
            result: result.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A counter handle that outlives handing the tool to a registry.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Tool for CannedSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (canned)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]})
    }

    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let query = input["query"].as_str().unwrap_or("");
            Ok(ToolResult::success(format!("{}: {}", self.result, query)))
        })
    }
}

/// Records every delivered mail; optionally fails instead.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundMail>>,
    pub fail_with: Option<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl MailTransport for RecordingMailer {
    fn send(&self, mail: &OutboundMail) -> BoxFuture<'_, Result<()>> {
        let mail = mail.clone();
        Box::pin(async move {
            if let Some(reason) = &self.fail_with {
                return Err(EpistleError::Mail(reason.clone()));
            }
            self.sent.lock().unwrap().push(mail);
            Ok(())
        })
    }
}
