use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use epistle_core::config::ModelConfig;
use epistle_core::error::{EpistleError, Result};
use epistle_core::traits::LanguageModel;
use epistle_core::types::*;

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiToolDecl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFnCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFnResp,
    },
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiFnCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiFnResp {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
struct GeminiToolDecl {
    function_declarations: Vec<GeminiFnDecl>,
}

#[derive(Serialize)]
struct GeminiFnDecl {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

// ── Conversion ───────────────────────────────────────────────────

/// Gemini has no tool-call ids of its own; ids are synthesized as
/// `call_{name}` and stripped back off when sending function responses.
fn call_id(name: &str) -> String {
    format!("call_{}", name)
}

fn fn_name(tool_use_id: &str) -> &str {
    tool_use_id.strip_prefix("call_").unwrap_or(tool_use_id)
}

fn convert_messages(messages: Vec<ChatMessage>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system = None;
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::Text { text: msg.text() }],
                });
            }
            Role::User => {
                let mut parts = Vec::new();
                for block in &msg.content {
                    if let ContentBlock::Text { text } = block {
                        parts.push(GeminiPart::Text { text: text.clone() });
                    }
                }
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts,
                    });
                }
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => {
                            if !text.is_empty() {
                                parts.push(GeminiPart::Text { text: text.clone() });
                            }
                        }
                        ContentBlock::ToolUse { name, input, .. } => {
                            parts.push(GeminiPart::FunctionCall {
                                function_call: GeminiFnCall {
                                    name: name.clone(),
                                    args: input.clone(),
                                },
                            });
                        }
                        _ => {}
                    }
                }
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("model".to_string()),
                        parts,
                    });
                }
            }
            Role::Tool => {
                // Tool results sent as user messages with function responses
                let mut parts = Vec::new();
                for block in &msg.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        parts.push(GeminiPart::FunctionResponse {
                            function_response: GeminiFnResp {
                                name: fn_name(tool_use_id).to_string(),
                                response: serde_json::json!({ "result": content }),
                            },
                        });
                    }
                }
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts,
                    });
                }
            }
        }
    }

    (system, contents)
}

fn parse_response(response: GeminiResponse) -> Result<ChatMessage> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| EpistleError::LlmParse("response contains no candidates".into()))?;

    let mut blocks = Vec::new();
    if let Some(content) = candidate.content {
        for part in content.parts {
            match part {
                GeminiPart::Text { text } => {
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text { text });
                    }
                }
                GeminiPart::FunctionCall { function_call } => {
                    blocks.push(ContentBlock::ToolUse {
                        id: call_id(&function_call.name),
                        name: function_call.name,
                        input: function_call.args,
                    });
                }
                GeminiPart::FunctionResponse { .. } => {}
            }
        }
    }

    Ok(ChatMessage {
        role: Role::Assistant,
        content: blocks,
        timestamp: Some(chrono::Utc::now()),
    })
}

impl LanguageModel for GeminiClient {
    fn generate(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ChatMessage>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| EpistleError::Config("Gemini: api_key is required".into()))?;

            let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
            let url = format!(
                "{}/models/{}:generateContent?key={}",
                base, config.model_id, api_key
            );

            debug!(model = %config.model_id, tools = tools.len(), "Gemini generate request");

            let (system_instruction, contents) = convert_messages(messages);

            let gemini_tools = if tools.is_empty() {
                vec![]
            } else {
                vec![GeminiToolDecl {
                    function_declarations: tools
                        .iter()
                        .map(|t| GeminiFnDecl {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        })
                        .collect(),
                }]
            };

            let body = GeminiRequest {
                contents,
                system_instruction,
                tools: gemini_tools,
                generation_config: Some(GenerationConfig {
                    max_output_tokens: Some(config.max_tokens),
                    temperature: if config.temperature > 0.0 {
                        Some(config.temperature)
                    } else {
                        None
                    },
                }),
            };

            let response = self
                .http
                .post(&url)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| EpistleError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(EpistleError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let parsed: GeminiResponse = response
                .json()
                .await
                .map_err(|e| EpistleError::LlmParse(e.to_string()))?;

            parse_response(parsed)
        })
    }
}
