//! Items representing messages, tool calls, and model responses
//!
//! `RunItem` is the unit persisted in a session. `Message` is what the
//! reasoning capability consumes; `ItemHelpers::to_messages` converts the
//! former into the latter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

/// A tool call made by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// Response from the reasoning capability for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub id: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ModelResponse {
    pub fn new_message(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: Some("stop".to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn new_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: None,
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// A single persisted record of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunItem {
    Message(MessageItem),
    ToolCall(ToolCallItem),
    ToolOutput(ToolOutputItem),
    Handoff(HandoffItem),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Agent that produced the message; `None` for user input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallItem {
    /// The call id assigned by the reasoning capability.
    pub id: String,
    pub agent: String,
    pub tool_name: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputItem {
    pub id: String,
    pub tool_call_id: String,
    pub output: Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffItem {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunItem {
    pub fn user_message(content: impl Into<String>) -> Self {
        RunItem::Message(MessageItem {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            agent: None,
            created_at: Utc::now(),
        })
    }

    pub fn assistant_message(agent: impl Into<String>, content: impl Into<String>) -> Self {
        RunItem::Message(MessageItem {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            agent: Some(agent.into()),
            created_at: Utc::now(),
        })
    }

    pub fn tool_call(agent: impl Into<String>, call: &ToolCall) -> Self {
        RunItem::ToolCall(ToolCallItem {
            id: call.id.clone(),
            agent: agent.into(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            created_at: Utc::now(),
        })
    }

    pub fn tool_success(tool_call_id: impl Into<String>, output: Value) -> Self {
        RunItem::ToolOutput(ToolOutputItem {
            id: Uuid::new_v4().to_string(),
            tool_call_id: tool_call_id.into(),
            output,
            error: None,
            created_at: Utc::now(),
        })
    }

    pub fn tool_error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        RunItem::ToolOutput(ToolOutputItem {
            id: Uuid::new_v4().to_string(),
            tool_call_id: tool_call_id.into(),
            output: Value::Null,
            error: Some(error.into()),
            created_at: Utc::now(),
        })
    }

    pub fn handoff(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: Option<String>,
    ) -> Self {
        RunItem::Handoff(HandoffItem {
            id: Uuid::new_v4().to_string(),
            from_agent: from.into(),
            to_agent: to.into(),
            reason,
            created_at: Utc::now(),
        })
    }

    /// Storage tag for this item.
    pub fn kind(&self) -> &'static str {
        match self {
            RunItem::Message(_) => "message",
            RunItem::ToolCall(_) => "tool_call",
            RunItem::ToolOutput(_) => "tool_output",
            RunItem::Handoff(_) => "handoff",
        }
    }
}

/// Helper functions for working with items
pub struct ItemHelpers;

impl ItemHelpers {
    /// Convert run items into the message list sent to the reasoning capability.
    ///
    /// Consecutive tool calls are folded into one assistant message (merged
    /// into the assistant text that immediately precedes them, if any), so
    /// every tool message follows the assistant message that requested it.
    /// Handoff items carry no extra content: the handoff call and its output
    /// already describe the transfer.
    pub fn to_messages(items: &[RunItem]) -> Vec<Message> {
        let mut messages: Vec<Message> = Vec::new();
        let mut previous_was_assistant_text = false;

        for item in items {
            match item {
                RunItem::Message(msg) => {
                    messages.push(Message::with_role(msg.role, msg.content.clone()));
                    previous_was_assistant_text = msg.role == Role::Assistant;
                }
                RunItem::ToolCall(call) => {
                    let tool_call = ToolCall {
                        id: call.id.clone(),
                        name: call.tool_name.clone(),
                        arguments: call.arguments.clone(),
                    };
                    match messages.last_mut() {
                        Some(last)
                            if last.role == Role::Assistant
                                && (previous_was_assistant_text || last.tool_calls.is_some()) =>
                        {
                            last.tool_calls.get_or_insert_with(Vec::new).push(tool_call);
                        }
                        _ => messages.push(Message::assistant_with_tool_calls("", vec![tool_call])),
                    }
                    previous_was_assistant_text = false;
                }
                RunItem::ToolOutput(output) => {
                    messages.push(Message::tool(
                        Self::render_tool_output(output),
                        &output.tool_call_id,
                    ));
                    previous_was_assistant_text = false;
                }
                RunItem::Handoff(_) => {}
            }
        }

        messages
    }

    /// Text handed back to the model for a tool output item.
    pub fn render_tool_output(output: &ToolOutputItem) -> String {
        match (&output.error, &output.output) {
            (Some(error), _) => format!("Error: {}", error),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        }
    }

    /// Content of the most recent assistant message, if any.
    pub fn last_assistant_text(items: &[RunItem]) -> Option<&str> {
        items.iter().rev().find_map(|item| match item {
            RunItem::Message(m) if m.role == Role::Assistant && !m.content.is_empty() => {
                Some(m.content.as_str())
            }
            _ => None,
        })
    }
}
