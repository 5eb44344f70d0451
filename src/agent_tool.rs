//! Agents exposed as tools
//!
//! An [`AgentTool`] lets one agent consult another without handing the
//! conversation over: the wrapped agent runs its own bounded loop on a
//! private history and only its final text comes back as the tool output.
//! Handoffs are not followed inside the nested run; the wrapped agent runs
//! with its tools only.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::AgentDefinition;
use crate::error::Result;
use crate::graph::AgentGraphBuilder;
use crate::runner::{RunConfig, Runner};
use crate::tool::{Tool, ToolResult};

#[derive(Debug, Deserialize, JsonSchema)]
struct AgentToolArgs {
    /// The request for the agent.
    input: String,
}

/// A tool whose body is a nested agent run.
#[derive(Debug, Clone)]
pub struct AgentTool {
    name: String,
    description: String,
    agent: Arc<AgentDefinition>,
    runner: Runner,
}

impl AgentTool {
    /// Wraps `agent` under the tool name `name`.
    pub fn new(
        agent: &AgentDefinition,
        name: impl Into<String>,
        description: impl Into<String>,
        config: RunConfig,
    ) -> Result<Self> {
        let detached = agent.clone().with_handoffs(Vec::new());
        let mut builder = AgentGraphBuilder::new();
        builder.add(detached)?;
        let graph = Arc::new(builder.build()?);
        let agent = graph.require(agent.name())?;

        Ok(Self {
            name: name.into(),
            description: description.into(),
            agent,
            runner: Runner::new(graph, config),
        })
    }

    pub fn agent(&self) -> &Arc<AgentDefinition> {
        &self.agent
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(AgentToolArgs).schema)
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult> {
        let args: AgentToolArgs = serde_json::from_value(arguments)?;
        debug!(tool = %self.name, agent = %self.agent.name(), "Running nested agent");

        match self.runner.execute_ephemeral(&self.agent, args.input).await {
            Ok(result) => Ok(ToolResult::success(Value::String(result.final_output))),
            Err(err) => {
                warn!(tool = %self.name, error = %err, "Nested agent run failed");
                Ok(ToolResult::error(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::Handoff;
    use crate::items::ModelResponse;
    use crate::model::ScriptedProvider;
    use crate::tool::FunctionTool;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sql_agent() -> AgentDefinition {
        AgentDefinition::simple("sql_query_agent", "Write SQL")
            .with_tool(Arc::new(FunctionTool::new(
                "execute_sql",
                "Run SQL",
                json!({"type": "object", "properties": {"sql_query": {"type": "string"}}}),
                |_| Ok(json!("   total\n0  42.0")),
            )))
            .with_handoffs(vec![Handoff::new("financial_agent", "back")])
    }

    #[tokio::test]
    async fn test_agent_tool_returns_final_text_only() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_call("sql_query_agent", "execute_sql", json!({"sql_query": "SELECT 1"}))
                .with_reply("sql_query_agent", |req| {
                    ModelResponse::new_message(format!(
                        "Query result:\n{}",
                        req.last_tool_output().unwrap_or_default()
                    ))
                }),
        );
        let tool = AgentTool::new(
            &sql_agent(),
            "sql_query_agent_tool",
            "Answers data questions",
            RunConfig::new(provider.clone()),
        )
        .unwrap();

        assert!(tool.agent().handoffs().is_empty());
        assert_eq!(tool.parameters_schema()["required"], json!(["input"]));

        let result = tool
            .execute(json!({"input": "total groceries 2024"}))
            .await
            .unwrap();
        assert_eq!(result.output, json!("Query result:\n   total\n0  42.0"));

        // Nested run starts from the tool input, not the caller's history
        let first = &provider.requests()[0];
        assert_eq!(first.last_user_input(), Some("total groceries 2024"));
        assert_eq!(first.tool_names(), vec!["execute_sql"]);
    }

    #[tokio::test]
    async fn test_nested_failure_is_reported_in_band() {
        let provider = Arc::new(ScriptedProvider::new().with_default_reply(|_| {
            ModelResponse::new_tool_calls(vec![crate::items::ToolCall::new(
                "execute_sql",
                json!({"sql_query": "SELECT 1"}),
            )])
        }));
        let tool = AgentTool::new(
            &sql_agent(),
            "sql_query_agent_tool",
            "Answers data questions",
            RunConfig::new(provider).with_max_steps(2),
        )
        .unwrap();

        let result = tool.execute(json!({"input": "loop"})).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("Step budget exceeded: 2"));
    }
}
