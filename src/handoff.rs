//! # Agent Handoffs
//!
//! A handoff transfers the active role of a turn from one agent to another.
//! Each agent owns a list of [`Handoff`] edges naming the agents it may
//! transfer to; the edges reference targets by name so the graph may contain
//! cycles (see [`crate::graph`]).
//!
//! Handoffs are advertised to the reasoning capability as tools named
//! `transfer_to_<agent_name>`. When the model calls one, the runner does not
//! execute anything: it validates the target against the active agent's
//! edges and switches agents.
//!
//! ```rust
//! use finance_agents::handoff::{Handoff, HANDOFF_TOOL_PREFIX};
//!
//! let edge = Handoff::new("financial_agent", "Summarises transaction data");
//! assert_eq!(edge.tool_name(), format!("{HANDOFF_TOOL_PREFIX}financial_agent"));
//! assert_eq!(Handoff::target_of("transfer_to_wealth_agent"), Some("wealth_agent"));
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::items::ToolCall;
use crate::tool::{Tool, ToolResult};

/// Prefix of the tool names used to express handoff directives.
pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

/// An authorized handoff edge from one agent to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    /// Name of the target agent.
    pub target: String,

    /// What the target handles; shown to the model to help it decide when to
    /// delegate.
    pub description: String,
}

impl Handoff {
    pub fn new(target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            description: description.into(),
        }
    }

    /// The tool name under which this edge is advertised.
    pub fn tool_name(&self) -> String {
        Self::tool_name_for(&self.target)
    }

    pub fn tool_name_for(agent_name: &str) -> String {
        format!("{}{}", HANDOFF_TOOL_PREFIX, agent_name)
    }

    /// Extract the target agent name from a handoff tool name.
    pub fn target_of(tool_name: &str) -> Option<&str> {
        tool_name
            .strip_prefix(HANDOFF_TOOL_PREFIX)
            .filter(|target| !target.is_empty())
    }
}

/// A handoff request issued by the reasoning capability.
#[derive(Debug, Clone)]
pub struct HandoffDirective {
    pub call: ToolCall,
    pub target: String,
    pub reason: Option<String>,
}

impl HandoffDirective {
    /// Interpret a tool call as a handoff directive, if it is one.
    pub fn from_call(call: &ToolCall) -> Option<Self> {
        let target = Handoff::target_of(&call.name)?;
        let reason = call
            .arguments
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            call: call.clone(),
            target: target.to_string(),
            reason,
        })
    }

    /// Payload returned to the model as the output of the handoff call.
    pub fn acknowledgement(&self) -> Value {
        serde_json::json!({ "assistant": self.target })
    }
}

/// Adapter that advertises a handoff edge as a tool.
#[derive(Clone, Debug)]
pub struct HandoffTool {
    name: String,
    description: String,
}

impl From<&Handoff> for HandoffTool {
    fn from(h: &Handoff) -> Self {
        Self {
            name: h.tool_name(),
            description: format!(
                "Handoff to the {} agent to handle the request. {}",
                h.target, h.description
            ),
        }
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string", "description": "Why the conversation is being transferred"}
            }
        })
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult> {
        // The runner intercepts handoff calls; this only runs if invoked directly.
        Ok(ToolResult::success(serde_json::json!({"handoff": true})))
    }
}
