use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Language model capability — one request, one assistant message.
///
/// The returned message may carry tool-use blocks; executing them is the
/// caller's job, never the model's.
pub trait LanguageModel: Send + Sync + 'static {
    fn generate(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ChatMessage>>;
}

/// Tool — extensible tool execution.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input.
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Mail transport capability — delivery backend for the send node.
pub trait MailTransport: Send + Sync + 'static {
    fn send(&self, mail: &OutboundMail) -> BoxFuture<'_, Result<()>>;
}
