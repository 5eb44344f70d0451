//! # Agent definitions
//!
//! An [`AgentDefinition`] describes one responder: its name, instructions,
//! model configuration, ordered tools, and the agents it may hand off to.
//! Definitions are built once at the composition root and shared behind
//! `Arc`; the runner only ever holds references.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handoff::{Handoff, HandoffTool};
use crate::items::Message;
use crate::tool::Tool;

/// Tool-invocation policy passed to the reasoning capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    #[default]
    Auto,
    /// The model must call a tool (or hand off).
    Required,
    /// Tools are advertised but may not be called.
    None,
}

/// Sampling parameters and tool policy for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub temperature: Option<f32>,
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: Some(1.0),
            tool_choice: ToolChoice::Auto,
            max_tokens: None,
        }
    }
}

impl ModelSettings {
    pub fn new(temperature: f32, tool_choice: ToolChoice) -> Self {
        Self {
            temperature: Some(temperature),
            tool_choice,
            max_tokens: None,
        }
    }
}

/// Immutable description of a single agent.
///
/// ```rust
/// use finance_agents::agent::{AgentDefinition, ToolChoice};
/// use finance_agents::handoff::Handoff;
///
/// let triage = AgentDefinition::simple("triage_agent", "Route the user's question.")
///     .with_model("gpt-4o-mini")
///     .with_temperature(0.1)
///     .with_tool_choice(ToolChoice::Required)
///     .with_handoffs(vec![Handoff::new("financial_agent", "Transaction analysis")]);
///
/// assert!(triage.can_hand_off_to("financial_agent"));
/// assert!(!triage.can_hand_off_to("wealth_agent"));
/// ```
#[derive(Clone)]
pub struct AgentDefinition {
    name: String,
    instructions: String,
    handoff_description: Option<String>,
    model: String,
    model_settings: ModelSettings,
    tools: Vec<Arc<dyn Tool>>,
    handoffs: Vec<Handoff>,
    reset_tool_choice: bool,
}

impl AgentDefinition {
    /// Creates an agent with a name and instructions; everything else defaults.
    pub fn simple(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: None,
            model: "gpt-4o-mini".to_string(),
            model_settings: ModelSettings::default(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            reset_tool_choice: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.model_settings.temperature = Some(temperature);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.model_settings.tool_choice = tool_choice;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.model_settings.max_tokens = Some(max_tokens);
        self
    }

    /// Description shown to other agents that can hand off to this one.
    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_handoffs(mut self, handoffs: Vec<Handoff>) -> Self {
        self.set_handoffs(handoffs);
        self
    }

    /// Whether a `required` tool policy relaxes to `auto` once this agent has
    /// used a tool in the current turn.
    pub fn with_reset_tool_choice(mut self, reset: bool) -> Self {
        self.reset_tool_choice = reset;
        self
    }

    /// Replace the handoff edges. Used by the graph builder's wiring phase.
    pub(crate) fn set_handoffs(&mut self, handoffs: Vec<Handoff>) {
        self.handoffs = handoffs;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn handoff_description(&self) -> Option<&str> {
        self.handoff_description.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn model_settings(&self) -> &ModelSettings {
        &self.model_settings
    }

    pub fn reset_tool_choice(&self) -> bool {
        self.reset_tool_choice
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn can_hand_off_to(&self, target: &str) -> bool {
        self.handoffs.iter().any(|h| h.target == target)
    }

    /// Tools plus handoff edges, in the form advertised to the model.
    pub fn advertised_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut advertised = self.tools.clone();
        advertised.extend(
            self.handoffs
                .iter()
                .map(|h| Arc::new(HandoffTool::from(h)) as Arc<dyn Tool>),
        );
        advertised
    }

    /// Constructs the system message: instructions followed by the available
    /// tools and handoff targets.
    pub fn build_system_message(&self) -> Message {
        let mut content = self.instructions.clone();

        if !self.tools.is_empty() {
            content.push_str("\n\nYou have access to the following tools:\n");
            for tool in &self.tools {
                content.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
            }
        }

        if !self.handoffs.is_empty() {
            content.push_str("\n\nYou can hand off to the following agents:\n");
            for handoff in &self.handoffs {
                content.push_str(&format!(
                    "- {} (call `{}`): {}\n",
                    handoff.target,
                    handoff.tool_name(),
                    handoff.description
                ));
            }
        }

        Message::system(content)
    }
}

impl std::fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools_count", &self.tools.len())
            .field(
                "handoffs",
                &self.handoffs.iter().map(|h| h.target.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
