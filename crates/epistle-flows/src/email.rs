//! The email pipeline: research → draft → translate → refine → send.
//!
//! A strict line graph. Each node formats an instruction from prior state
//! fields, makes one model call, and stores its result under one field.
//! Only the sender touches the outside world beyond the model: it parses
//! the refined text into subject and body and hands them to the mail
//! transport, converting every delivery problem into a confirmation
//! string rather than an error.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use epistle_core::config::ModelConfig;
use epistle_core::error::{EpistleError, Result};
use epistle_core::traits::{LanguageModel, MailTransport, Tool};
use epistle_core::types::*;

use crate::graph::{GraphBuilder, GraphNode, GraphState, StateGraph, StateUpdate, END};

/// State field names shared by the email pipeline nodes.
pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const LANGUAGE: &str = "language";
    pub const RECIPIENT_EMAIL: &str = "recipient_email";
    pub const SENDER_NAME: &str = "sender_name";
    pub const RESEARCH_INFO: &str = "research_info";
    pub const DRAFT_EMAIL: &str = "draft_email";
    pub const TRANSLATED_EMAIL: &str = "translated_email";
    pub const FINAL_EMAIL: &str = "final_email";
    pub const CONFIRMATION_MESSAGE: &str = "confirmation_message";
}

use fields::*;

const RESEARCH_SYSTEM: &str =
    "You are a research assistant. Your job is to use the search tool to find information on a given topic.";
const DRAFT_SYSTEM: &str =
    "You are an expert email drafter. Your job is to write a compelling first draft of an email about a given topic, based on the research provided.";
const TRANSLATE_SYSTEM: &str =
    "You are an expert translator. Your job is to translate the given text into the specified language. Default to English if no language is provided.";
const REFINE_SYSTEM: &str =
    "You are an expert email editor. Your job is to refine a draft into a polished, final version, keeping it in its original language. Your output MUST be in the format: Subject: [Your Subject]\n\n[Your Email Body]";

/// One model call: a per-node system message plus one human instruction.
async fn invoke(
    llm: &Arc<dyn LanguageModel>,
    config: &ModelConfig,
    system: &str,
    instruction: String,
    tools: &[ToolDefinition],
) -> Result<ChatMessage> {
    let messages = vec![ChatMessage::system(system), ChatMessage::user(instruction)];
    llm.generate(config, messages, tools).await
}

fn definition_of(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}

/// Researches the topic, executing every search the model requests.
pub struct ResearchNode {
    pub llm: Arc<dyn LanguageModel>,
    pub config: ModelConfig,
    pub search: Arc<dyn Tool>,
}

impl GraphNode for ResearchNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let topic = state.get_str(TOPIC).unwrap_or_default().to_string();
            info!(topic = %topic, "Researching topic");

            let instruction = format!("Find information on the following topic: {}", topic);
            let response = invoke(
                &self.llm,
                &self.config,
                RESEARCH_SYSTEM,
                instruction,
                &[definition_of(self.search.as_ref())],
            )
            .await?;

            let mut outputs = Vec::new();
            for (_id, name, input) in response.tool_uses() {
                let result = self.search.execute(input.clone()).await?;
                info!(tool = name, "Search call complete");
                outputs.push(result.content);
            }
            if outputs.is_empty() {
                warn!("Model requested no searches; research will be empty");
            }

            Ok(StateUpdate::field_str(RESEARCH_INFO, outputs.join("\n")))
        })
    }
}

/// Writes the first draft from topic, sender name, and research.
pub struct DraftNode {
    pub llm: Arc<dyn LanguageModel>,
    pub config: ModelConfig,
}

impl GraphNode for DraftNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            info!("Drafting email");
            let instruction = format!(
                "Based on the following research, write an email about '{}'.\n\
                 Use this name '{}' to sign the email.\n\
                 This is the researched info:\n\n{}",
                state.get_str(TOPIC).unwrap_or_default(),
                state.get_str(SENDER_NAME).unwrap_or_default(),
                state.get_str(RESEARCH_INFO).unwrap_or_default(),
            );
            let response = invoke(&self.llm, &self.config, DRAFT_SYSTEM, instruction, &[]).await?;
            Ok(StateUpdate::field_str(DRAFT_EMAIL, response.text()))
        })
    }
}

/// Translates the draft into the target language.
pub struct TranslateNode {
    pub llm: Arc<dyn LanguageModel>,
    pub config: ModelConfig,
}

impl GraphNode for TranslateNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let language = state.get_str(LANGUAGE).unwrap_or("English").to_string();
            info!(language = %language, "Translating email");

            let instruction = format!(
                "You MUST translate the following email draft into the '{}' language. \
                 Do not respond in English unless the target language is English. \
                 Return only the translated text. Here is the draft:\n\n{}",
                language,
                state.get_str(DRAFT_EMAIL).unwrap_or_default(),
            );
            let response =
                invoke(&self.llm, &self.config, TRANSLATE_SYSTEM, instruction, &[]).await?;
            Ok(StateUpdate::field_str(TRANSLATED_EMAIL, response.text()))
        })
    }
}

/// Polishes the translated draft into the final subject/body shape.
pub struct RefineNode {
    pub llm: Arc<dyn LanguageModel>,
    pub config: ModelConfig,
}

impl GraphNode for RefineNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            info!("Refining email");
            let instruction = format!(
                "You MUST refine the following email draft, keeping it in the '{}' language. \
                 Ensure the final version is polished and professional. \
                 Here is the draft:\n\n{}",
                state.get_str(LANGUAGE).unwrap_or("English"),
                state.get_str(TRANSLATED_EMAIL).unwrap_or_default(),
            );
            let response = invoke(&self.llm, &self.config, REFINE_SYSTEM, instruction, &[]).await?;
            Ok(StateUpdate::field_str(FINAL_EMAIL, response.text()))
        })
    }
}

/// Split refined text on the first blank line into (subject, body).
///
/// A missing boundary degrades to subject "No Subject" with the whole
/// content as body instead of failing the run.
pub fn split_subject_body(content: &str) -> (String, String) {
    match content.split_once("\n\n") {
        Some((head, body)) => {
            let head = head.trim();
            let subject = head.strip_prefix("Subject:").map(str::trim).unwrap_or(head);
            (subject.to_string(), body.to_string())
        }
        None => ("No Subject".to_string(), content.to_string()),
    }
}

/// Delivers the final email.
///
/// All failure modes end up in `confirmation_message`; this node never
/// errors the run. `mailer` is `None` when sender credentials were not
/// configured.
pub struct SendNode {
    pub mailer: Option<Arc<dyn MailTransport>>,
}

impl SendNode {
    fn confirmation(text: impl Into<String>) -> StateUpdate {
        StateUpdate::field_str(CONFIRMATION_MESSAGE, text)
    }
}

impl GraphNode for SendNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            info!("Sending email");

            let recipient = state.get_str(RECIPIENT_EMAIL).unwrap_or_default();
            let content = state.get_str(FINAL_EMAIL).unwrap_or_default();

            let Some(mailer) = &self.mailer else {
                warn!("No mail transport configured");
                return Ok(Self::confirmation(
                    "Error: Missing required information to send email.",
                ));
            };
            if recipient.is_empty() || content.is_empty() {
                warn!("Recipient or final content missing");
                return Ok(Self::confirmation(
                    "Error: Missing required information to send email.",
                ));
            }

            let (subject, body) = split_subject_body(content);
            let mail = OutboundMail {
                to: recipient.to_string(),
                subject,
                body,
            };

            match mailer.send(&mail).await {
                Ok(()) => {
                    let confirmation = format!("Email successfully sent to {}!", recipient);
                    info!(to = %recipient, "Email sent");
                    Ok(Self::confirmation(confirmation))
                }
                Err(e) => {
                    warn!(error = %e, "Email delivery failed");
                    Ok(Self::confirmation(format!("Failed to send email: {}", e)))
                }
            }
        })
    }
}

/// Wire the five nodes into a line.
pub fn build_email_graph(
    llm: Arc<dyn LanguageModel>,
    config: ModelConfig,
    search: Arc<dyn Tool>,
    mailer: Option<Arc<dyn MailTransport>>,
) -> Result<StateGraph> {
    GraphBuilder::new()
        .add_node(
            "researcher",
            ResearchNode {
                llm: llm.clone(),
                config: config.clone(),
                search,
            },
        )
        .add_node(
            "drafter",
            DraftNode {
                llm: llm.clone(),
                config: config.clone(),
            },
        )
        .add_node(
            "translator",
            TranslateNode {
                llm: llm.clone(),
                config: config.clone(),
            },
        )
        .add_node("refiner", RefineNode { llm, config })
        .add_node("sender", SendNode { mailer })
        .set_entry_point("researcher")
        .add_edge("researcher", "drafter")
        .add_edge("drafter", "translator")
        .add_edge("translator", "refiner")
        .add_edge("refiner", "sender")
        .add_edge("sender", END)
        .compile()
}

/// Input for one email pipeline run.
#[derive(Debug, Clone)]
pub struct EmailRequest {
    pub topic: String,
    pub language: String,
    pub recipient_email: String,
    pub sender_name: String,
}

/// Run the pipeline and return the confirmation message.
///
/// Consumes the per-step snapshots: the first one carrying a populated
/// `confirmation_message` wins (the sender always writes one).
pub async fn run_email_flow(graph: &StateGraph, request: EmailRequest) -> Result<String> {
    let initial = GraphState::new()
        .with_str(TOPIC, request.topic)
        .with_str(LANGUAGE, request.language)
        .with_str(RECIPIENT_EMAIL, request.recipient_email)
        .with_str(SENDER_NAME, request.sender_name);

    let result = graph.run(initial).await?;

    for step in &result.steps {
        if let Some(confirmation) = step.state.get_str(CONFIRMATION_MESSAGE) {
            if !confirmation.is_empty() {
                return Ok(confirmation.to_string());
            }
        }
    }

    Err(EpistleError::Graph(
        "email pipeline produced no confirmation".into(),
    ))
}
