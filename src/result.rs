//! Result types for agent execution

use std::sync::Arc;

use crate::agent::AgentDefinition;
use crate::items::{HandoffItem, RunItem, ToolCallItem};
use crate::usage::UsageStats;

/// Outcome of one successful turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Text produced by the agent that ended the turn.
    pub final_output: String,
    /// The agent that produced `final_output`, after every handoff settled.
    /// Callers start the next turn from it.
    pub last_agent: Arc<AgentDefinition>,
    /// Items appended to the history during this turn, user input first.
    pub new_items: Vec<RunItem>,
    /// Number of reasoning steps taken.
    pub steps: usize,
    pub usage: UsageStats,
    pub trace_id: String,
}

impl TurnResult {
    pub fn last_agent_name(&self) -> &str {
        self.last_agent.name()
    }

    /// Handoffs that happened during the turn, in order.
    pub fn handoffs(&self) -> Vec<&HandoffItem> {
        self.new_items
            .iter()
            .filter_map(|item| match item {
                RunItem::Handoff(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    /// Tool calls made during the turn, handoff calls included.
    pub fn tool_calls(&self) -> Vec<&ToolCallItem> {
        self.new_items
            .iter()
            .filter_map(|item| match item {
                RunItem::ToolCall(c) => Some(c),
                _ => None,
            })
            .collect()
    }
}
