//! The role-play pipeline: agent ⇄ action.
//!
//! The agent node asks the model for the next move with the search tool
//! bound; if the reply requests tool calls, the action node executes them
//! and loops back so the model can read the results. The sole branching
//! decision in the system is [`should_continue`], re-evaluated after every
//! agent step.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use epistle_core::config::ModelConfig;
use epistle_core::error::Result;
use epistle_core::traits::LanguageModel;
use epistle_core::types::*;
use epistle_tools::ToolRegistry;

use crate::graph::{GraphBuilder, GraphNode, GraphState, StateGraph, StateUpdate, END};

const NAME_PROMPT: &str =
    "Based on the character I've asked you to play, what is your name? Respond with only the name.";
const INTRO_PROMPT: &str = "Please introduce yourself in character.";

/// Inputs that end the interactive session.
const EXIT_WORDS: &[&str] = &["quit", "exit", "", "goodbye"];

pub fn is_exit_command(input: &str) -> bool {
    EXIT_WORDS.contains(&input.trim().to_lowercase().as_str())
}

/// Route after the agent node: "action" when the last message requests
/// tools, "end" otherwise.
pub fn should_continue(state: &GraphState) -> String {
    match state.last_message() {
        Some(last) if last.requests_tools() => "action".to_string(),
        _ => "end".to_string(),
    }
}

/// Asks the model for the next move. Requests tools, never executes them.
pub struct AgentNode {
    pub llm: Arc<dyn LanguageModel>,
    pub config: ModelConfig,
    pub tools: Arc<ToolRegistry>,
}

impl GraphNode for AgentNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            debug!(history = state.messages().len(), "Agent step");
            let response = self
                .llm
                .generate(
                    &self.config,
                    state.messages().to_vec(),
                    &self.tools.definitions(),
                )
                .await?;
            Ok(StateUpdate::message(response))
        })
    }
}

/// Executes the tool calls requested by the last agent message, one tool
/// message per call, preserving call → result correspondence.
pub struct ActionNode {
    pub tools: Arc<ToolRegistry>,
}

impl GraphNode for ActionNode {
    fn run(&self, state: GraphState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            // Defensive: unreachable given the router, but must not crash.
            let Some(last) = state.last_message() else {
                return Ok(StateUpdate::none());
            };
            let requests: Vec<(String, String, serde_json::Value)> = last
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            if requests.is_empty() {
                return Ok(StateUpdate::none());
            }

            let mut messages = Vec::new();
            for (id, name, input) in requests {
                info!(tool = %name, "Executing tool call");
                let result = self.tools.execute(&name, input).await?;
                messages.push(ChatMessage::tool_result(id, result.content, result.is_error));
            }

            Ok(StateUpdate::messages(messages))
        })
    }
}

/// Wire agent and action into a cycle gated by [`should_continue`].
pub fn build_roleplay_graph(
    llm: Arc<dyn LanguageModel>,
    config: ModelConfig,
    tools: Arc<ToolRegistry>,
) -> Result<StateGraph> {
    GraphBuilder::new()
        .add_node(
            "agent",
            AgentNode {
                llm,
                config,
                tools: tools.clone(),
            },
        )
        .add_node("action", ActionNode { tools })
        .set_entry_point("agent")
        .add_conditional_edges("agent", should_continue, &[("action", "action"), ("end", END)])
        .add_edge("action", "agent")
        .compile()
}

/// A role-played conversation.
///
/// Each turn runs the graph over a fresh state seeded with the condensed
/// history: the persona system message, the human turns, and the final
/// in-character replies. Tool-call intermediates never survive a turn.
pub struct RolePlaySession {
    graph: StateGraph,
    history: Vec<ChatMessage>,
}

impl RolePlaySession {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        config: ModelConfig,
        tools: Arc<ToolRegistry>,
        persona: &str,
    ) -> Result<Self> {
        Ok(Self {
            graph: build_roleplay_graph(llm, config, tools)?,
            history: vec![ChatMessage::system(persona)],
        })
    }

    /// Run one graph invocation over history + `message` and return the
    /// final in-character reply (the last assistant message that requests
    /// no tools).
    async fn run_once(&self, message: ChatMessage) -> Result<Option<ChatMessage>> {
        let mut messages = self.history.clone();
        messages.push(message);

        let result = self
            .graph
            .run(GraphState::new().with_messages(messages))
            .await?;

        Ok(result
            .state
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.requests_tools())
            .cloned())
    }

    /// Ask the character its name without extending the history.
    pub async fn character_name(&self) -> Result<String> {
        let reply = self.probe(NAME_PROMPT).await?;
        let name = reply.trim();
        Ok(if name.is_empty() {
            "AI".to_string()
        } else {
            name.to_string()
        })
    }

    /// One-shot instruction that leaves the history untouched.
    pub async fn probe(&self, instruction: &str) -> Result<String> {
        let reply = self.run_once(ChatMessage::user(instruction)).await?;
        Ok(reply.map(|m| m.text()).unwrap_or_default())
    }

    /// Ask for an in-character introduction; only the reply joins the
    /// history.
    pub async fn introduce(&mut self) -> Result<String> {
        let reply = self.run_once(ChatMessage::user(INTRO_PROMPT)).await?;
        match reply {
            Some(message) => {
                let text = message.text();
                self.history.push(message);
                Ok(text)
            }
            None => Ok(String::new()),
        }
    }

    /// A full conversational turn; extends the history with the human
    /// message and the final reply.
    pub async fn turn(&mut self, user_text: &str) -> Result<String> {
        let human = ChatMessage::user(user_text);
        let reply = self.run_once(human.clone()).await?;

        self.history.push(human);
        match reply {
            Some(message) => {
                let text = message.text();
                self.history.push(message);
                Ok(text)
            }
            None => Ok(String::new()),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::testing::{CannedSearchTool, ScriptedModel};

    use super::*;

    fn registry_with_search(search: CannedSearchTool) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(search);
        Arc::new(registry)
    }

    #[test]
    fn test_should_continue_on_tool_request() {
        let state = GraphState::new().with_messages(vec![
            ChatMessage::user("look it up"),
            ScriptedModel::tool_call("web_search", json!({"query": "moon phase"})),
        ]);
        assert_eq!(should_continue(&state), "action");
    }

    #[test]
    fn test_should_end_on_plain_reply() {
        let state = GraphState::new()
            .with_messages(vec![ChatMessage::assistant_text("A direct answer.")]);
        assert_eq!(should_continue(&state), "end");
    }

    #[test]
    fn test_should_end_on_empty_history() {
        assert_eq!(should_continue(&GraphState::new()), "end");
    }

    #[test]
    fn test_should_end_on_tool_message() {
        let state = GraphState::new().with_messages(vec![ChatMessage::tool_result(
            "call_web_search",
            "results",
            false,
        )]);
        assert_eq!(should_continue(&state), "end");
    }

    #[test]
    fn test_exit_words() {
        assert!(is_exit_command("quit"));
        assert!(is_exit_command("  EXIT "));
        assert!(is_exit_command(""));
        assert!(is_exit_command("goodbye"));
        assert!(!is_exit_command("tell me more"));
    }

    #[tokio::test]
    async fn test_graph_cycles_agent_action_agent_then_ends() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call("web_search", json!({"query": "weather in Orlais"})),
            ChatMessage::assistant_text("The skies over Orlais are clear."),
        ]);
        let search = CannedSearchTool::new("forecast");
        let graph = build_roleplay_graph(
            Arc::new(model),
            ModelConfig::default(),
            registry_with_search(search),
        )
        .unwrap();

        let initial = GraphState::new().with_messages(vec![
            ChatMessage::system("You are an Orlesian bard."),
            ChatMessage::user("How is the weather?"),
        ]);
        let result = graph.run(initial).await.unwrap();

        let visited: Vec<&str> = result.steps.iter().map(|s| s.node.as_str()).collect();
        assert_eq!(visited, vec!["agent", "action", "agent"]);

        // system, human, tool request, tool result, final reply
        let messages = result.state.messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(
            messages[4].text(),
            "The skies over Orlais are clear."
        );
    }

    #[tokio::test]
    async fn test_action_preserves_call_result_correspondence() {
        let request = ChatMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::ToolUse {
                    id: "call_web_search".into(),
                    name: "web_search".into(),
                    input: json!({"query": "first"}),
                },
                ContentBlock::ToolUse {
                    id: "call_web_search_2".into(),
                    name: "web_search".into(),
                    input: json!({"query": "second"}),
                },
            ],
            timestamp: None,
        };
        let node = ActionNode {
            tools: registry_with_search(CannedSearchTool::new("hit")),
        };

        let state = GraphState::new().with_messages(vec![request]);
        let update = node.run(state).await.unwrap();

        let mut merged = GraphState::new();
        merged.apply(update);
        let messages = merged.messages();
        assert_eq!(messages.len(), 2);
        match &messages[0].content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                assert_eq!(tool_use_id, "call_web_search");
                assert_eq!(content, "hit: first");
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        match &messages[1].content[0] {
            ContentBlock::ToolResult { tool_use_id, .. } => {
                assert_eq!(tool_use_id, "call_web_search_2");
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_action_is_noop_without_tool_requests() {
        let search = CannedSearchTool::new("unused");
        let calls = search.counter();
        let node = ActionNode {
            tools: registry_with_search(search),
        };

        let state = GraphState::new()
            .with_messages(vec![ChatMessage::assistant_text("nothing to do")]);
        let update = node.run(state).await.unwrap();
        assert!(update.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_history_stays_condensed() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call("web_search", json!({"query": "dragon sightings"})),
            ChatMessage::assistant_text("Three dragons were seen this week."),
        ]);
        let mut session = RolePlaySession::new(
            Arc::new(model),
            ModelConfig::default(),
            registry_with_search(CannedSearchTool::new("news")),
            "You are a town crier.",
        )
        .unwrap();

        let reply = session.turn("Any dragon news?").await.unwrap();
        assert_eq!(reply, "Three dragons were seen this week.");

        // persona + human + final reply, no tool intermediates
        let history = session.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|m| m.role != Role::Tool));
        assert!(history.iter().all(|m| !m.requests_tools()));
    }

    #[tokio::test]
    async fn test_probe_leaves_history_untouched() {
        let model = ScriptedModel::new(vec![ChatMessage::assistant_text("Garrick")]);
        let session = RolePlaySession::new(
            Arc::new(model),
            ModelConfig::default(),
            registry_with_search(CannedSearchTool::new("unused")),
            "You are Garrick the blacksmith.",
        )
        .unwrap();

        let name = session.character_name().await.unwrap();
        assert_eq!(name, "Garrick");
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_character_name_falls_back() {
        let model = ScriptedModel::new(vec![ChatMessage::assistant_text("   ")]);
        let session = RolePlaySession::new(
            Arc::new(model),
            ModelConfig::default(),
            registry_with_search(CannedSearchTool::new("unused")),
            "You are someone nameless.",
        )
        .unwrap();

        assert_eq!(session.character_name().await.unwrap(), "AI");
    }

    #[tokio::test]
    async fn test_introduce_appends_reply_only() {
        let model = ScriptedModel::new(vec![ChatMessage::assistant_text(
            "I am Garrick, smith of the north road.",
        )]);
        let mut session = RolePlaySession::new(
            Arc::new(model),
            ModelConfig::default(),
            registry_with_search(CannedSearchTool::new("unused")),
            "You are Garrick the blacksmith.",
        )
        .unwrap();

        let intro = session.introduce().await.unwrap();
        assert!(intro.contains("Garrick"));
        // persona + introduction; the instruction itself is not kept
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].role, Role::Assistant);
    }
}
