//! # Runner
//!
//! The `Runner` drives one turn of a conversation: starting from the active
//! agent and the session history, it alternates reasoning steps with tool
//! execution and handoffs until some agent produces text.
//!
//! Per step:
//!
//! 1. the active agent's system message, the history, and its advertised
//!    tools (handoff edges included) go to the [`ModelProvider`];
//! 2. a response without tool calls ends the turn;
//! 3. otherwise a handoff directive, if any, is authorized first. An
//!    unauthorized target aborts the turn before anything of the step is
//!    recorded;
//! 4. regular tool calls run in order. Schema violations, unknown tools and
//!    tool failures become error outputs the agent can read;
//! 5. the handoff, if any, is applied after the tools and the next step runs
//!    with the target agent;
//! 6. the step's items are appended to the session.
//!
//! The user input is appended before the first step, and each completed step
//! is appended on its own, so a failed or cancelled turn leaves a consistent
//! prefix behind. The step budget bounds the number of reasoning calls.

use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::agent::{AgentDefinition, ToolChoice};
use crate::error::{AgentsError, Result};
use crate::graph::AgentGraph;
use crate::handoff::HandoffDirective;
use crate::items::{ItemHelpers, Message, Role, RunItem, ToolCall};
use crate::memory::Session;
use crate::model::{ModelProvider, ModelRequest};
use crate::result::TurnResult;
use crate::usage::UsageStats;

/// Reasoning steps allowed per turn unless configured otherwise.
pub const DEFAULT_MAX_STEPS: usize = 10;

const IGNORED_HANDOFF: &str = "Multiple handoffs requested in one step; only the first was followed.";

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => {
            let mut out = s[..idx].to_string();
            out.push('…');
            out
        }
        None => s.to_string(),
    }
}

fn format_messages_for_log(messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for (idx, m) in messages.iter().enumerate() {
        let line = match m.role {
            Role::User => format!("{:02} USER     | {}", idx, truncate_for_log(&m.content, 160)),
            Role::System => format!("{:02} SYSTEM   | {}", idx, truncate_for_log(&m.content, 160)),
            Role::Assistant => match &m.tool_calls {
                Some(calls) => {
                    let calls: Vec<String> = calls
                        .iter()
                        .map(|tc| format!("id={}, name={}", tc.id, tc.name))
                        .collect();
                    format!(
                        "{:02} ASSIST   | tool_calls=[{}] content=\"{}\"",
                        idx,
                        calls.join(", "),
                        truncate_for_log(&m.content, 120)
                    )
                }
                None => format!("{:02} ASSIST   | {}", idx, truncate_for_log(&m.content, 160)),
            },
            Role::Tool => format!(
                "{:02} TOOL     | tool_call_id={} payload={}",
                idx,
                m.tool_call_id.as_deref().unwrap_or("<missing tool_call_id>"),
                truncate_for_log(&m.content, 120)
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Read-only execution context shared by every turn.
///
/// Built once at startup and passed explicitly to the runner and to
/// agent-backed tools.
#[derive(Clone)]
pub struct RunConfig {
    /// Maximum reasoning steps in one turn, handoffs included.
    pub max_steps: usize,
    pub model_provider: Arc<dyn ModelProvider>,
}

impl RunConfig {
    pub fn new(model_provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            model_provider,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("max_steps", &self.max_steps)
            .field("model_provider", &self.model_provider.name())
            .finish()
    }
}

/// Where a turn's items go besides the in-memory transcript.
enum Sink<'a> {
    Session(&'a Session),
    Ephemeral,
}

impl Sink<'_> {
    async fn append(&self, items: &[RunItem]) -> Result<()> {
        match self {
            Sink::Session(session) => session.append(items.to_vec()).await,
            Sink::Ephemeral => Ok(()),
        }
    }
}

/// Executes turns against an [`AgentGraph`].
///
/// The runner keeps no routing state: the caller passes the active agent in
/// and gets `last_agent` back.
///
/// ```rust
/// use std::sync::Arc;
/// use finance_agents::agent::AgentDefinition;
/// use finance_agents::graph::AgentGraphBuilder;
/// use finance_agents::memory::{InMemorySessionStore, Session};
/// use finance_agents::model::ScriptedProvider;
/// use finance_agents::runner::{RunConfig, Runner};
///
/// # #[tokio::main]
/// # async fn main() -> finance_agents::Result<()> {
/// let mut builder = AgentGraphBuilder::new();
/// builder.add(AgentDefinition::simple("triage_agent", "Route"))?;
/// builder.add(AgentDefinition::simple("wealth_agent", "Advise"))?;
/// builder.connect("triage_agent", &["wealth_agent"])?;
/// let graph = Arc::new(builder.build()?);
///
/// let provider = ScriptedProvider::new()
///     .with_handoff("triage_agent", "wealth_agent")
///     .with_message("wealth_agent", "Diversify.");
/// let runner = Runner::new(graph.clone(), RunConfig::new(Arc::new(provider)));
///
/// let session = Session::open(Arc::new(InMemorySessionStore::new()), "demo").await?;
/// let triage = graph.require("triage_agent")?;
/// let result = runner.execute(&triage, "How should I invest?", &session).await?;
/// assert_eq!(result.last_agent_name(), "wealth_agent");
/// assert_eq!(result.final_output, "Diversify.");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
    graph: Arc<AgentGraph>,
    config: RunConfig,
}

impl Runner {
    pub fn new(graph: Arc<AgentGraph>, config: RunConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &Arc<AgentGraph> {
        &self.graph
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run one turn for `input` starting at `agent`, persisting to `session`.
    ///
    /// Fails with [`AgentsError::InvalidHandoff`],
    /// [`AgentsError::StepBudgetExceeded`], [`AgentsError::StorageUnavailable`]
    /// or a reasoning-capability error; tool failures never escape.
    pub async fn execute(
        &self,
        agent: &Arc<AgentDefinition>,
        input: impl Into<String>,
        session: &Session,
    ) -> Result<TurnResult> {
        let input = input.into();
        let trace_id = format!("trace_{}", uuid::Uuid::new_v4().simple());
        let span = info_span!("turn", trace_id = %trace_id, session_id = %session.id());

        async {
            info!(agent = %agent.name(), "Starting turn");
            let history = session.history(None).await?;
            self.drive(agent.clone(), history, input, Sink::Session(session), trace_id.clone())
                .await
        }
        .instrument(span)
        .await
    }

    /// Run one turn with a private, throwaway history.
    ///
    /// Used for agents exposed as tools: the nested steps never reach the
    /// caller's session.
    pub async fn execute_ephemeral(
        &self,
        agent: &Arc<AgentDefinition>,
        input: impl Into<String>,
    ) -> Result<TurnResult> {
        let trace_id = format!("trace_{}", uuid::Uuid::new_v4().simple());
        let span = info_span!("nested_turn", trace_id = %trace_id, agent = %agent.name());
        self.drive(agent.clone(), Vec::new(), input.into(), Sink::Ephemeral, trace_id)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        mut agent: Arc<AgentDefinition>,
        mut history: Vec<RunItem>,
        input: String,
        sink: Sink<'_>,
        trace_id: String,
    ) -> Result<TurnResult> {
        let mut usage = UsageStats::new();
        let mut new_items = vec![RunItem::user_message(input)];
        sink.append(&new_items).await?;
        history.extend(new_items.iter().cloned());

        // Whether the active agent has executed a tool during this turn
        let mut agent_used_tool = false;

        for step in 1..=self.config.max_steps {
            let request = self.build_request(&agent, &history, agent_used_tool);
            debug!(step, agent = %agent.name(), tool_choice = ?request.settings.tool_choice, "Reasoning step");
            debug!(
                target: "runner::messages",
                "\n=== Sending to provider (agent: {}, model: {}) ===\n{}\n=== end ===",
                agent.name(),
                agent.model(),
                format_messages_for_log(&request.messages)
            );

            let (response, step_usage) = self.config.model_provider.complete(request).await?;
            usage.record(agent.model(), agent.name(), step_usage);

            let content = response.content.clone().unwrap_or_default();

            if !response.has_tool_calls() {
                let item = RunItem::assistant_message(agent.name(), content.clone());
                sink.append(std::slice::from_ref(&item)).await?;
                new_items.push(item);
                info!(agent = %agent.name(), steps = step, "Turn complete");
                return Ok(TurnResult {
                    final_output: content,
                    last_agent: agent,
                    new_items,
                    steps: step,
                    usage,
                    trace_id,
                });
            }

            let (handoffs, calls): (Vec<&ToolCall>, Vec<&ToolCall>) = response
                .tool_calls
                .iter()
                .partition(|call| HandoffDirective::from_call(call).is_some());
            let directives: Vec<HandoffDirective> = handoffs
                .iter()
                .filter_map(|call| HandoffDirective::from_call(call))
                .collect();

            // Authorize before anything of this step is executed or recorded
            let next_agent = match directives.first() {
                Some(directive) => match self.graph.resolve_handoff(&agent, &directive.target) {
                    Ok(target) => Some(target),
                    Err(err) => {
                        warn!(from = %agent.name(), to = %directive.target, "Rejected handoff");
                        return Err(err);
                    }
                },
                None => None,
            };

            let mut step_items = Vec::new();
            if !content.is_empty() {
                step_items.push(RunItem::assistant_message(agent.name(), content));
            }
            for call in &response.tool_calls {
                step_items.push(RunItem::tool_call(agent.name(), call));
            }

            for call in &calls {
                step_items.push(self.invoke_tool(&agent, call).await);
            }
            if !calls.is_empty() {
                agent_used_tool = true;
            }

            if let (Some(target), Some(directive)) = (next_agent, directives.first()) {
                step_items.push(RunItem::tool_success(
                    &directive.call.id,
                    directive.acknowledgement(),
                ));
                for ignored in directives.iter().skip(1) {
                    step_items.push(RunItem::tool_error(&ignored.call.id, IGNORED_HANDOFF));
                }
                step_items.push(RunItem::handoff(
                    agent.name(),
                    target.name(),
                    directive.reason.clone(),
                ));
                info!(from = %agent.name(), to = %target.name(), "Handoff");
                agent = target;
                agent_used_tool = false;
            }

            sink.append(&step_items).await?;
            history.extend(step_items.iter().cloned());
            new_items.extend(step_items);
        }

        warn!(agent = %agent.name(), max_steps = self.config.max_steps, "Step budget exhausted");
        Err(AgentsError::StepBudgetExceeded {
            max_steps: self.config.max_steps,
        })
    }

    fn build_request(
        &self,
        agent: &AgentDefinition,
        history: &[RunItem],
        agent_used_tool: bool,
    ) -> ModelRequest {
        let mut settings = agent.model_settings().clone();
        if settings.tool_choice == ToolChoice::Required && agent.reset_tool_choice() && agent_used_tool {
            settings.tool_choice = ToolChoice::Auto;
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(agent.build_system_message());
        messages.extend(ItemHelpers::to_messages(history));

        ModelRequest {
            agent_name: agent.name().to_string(),
            model: agent.model().to_string(),
            messages,
            tools: agent.advertised_tools(),
            settings,
        }
    }

    /// Run one regular tool call. Every failure mode becomes an error output.
    async fn invoke_tool(&self, agent: &AgentDefinition, call: &ToolCall) -> RunItem {
        let Some(tool) = agent.find_tool(&call.name) else {
            warn!(agent = %agent.name(), tool = %call.name, "Unknown tool requested");
            return RunItem::tool_error(&call.id, format!("Unknown tool '{}'", call.name));
        };

        if let Err(err) = tool.validate(&call.arguments) {
            debug_assert!(!err.is_fatal(), "validation produced {err:?}");
            warn!(tool = %call.name, error = %err, "Rejected tool arguments");
            return RunItem::tool_error(&call.id, err.to_string());
        }

        debug!(agent = %agent.name(), tool = %call.name, "Executing tool");
        match tool.execute(call.arguments.clone()).await {
            Ok(result) => match result.error {
                Some(error) => {
                    debug!(tool = %call.name, error = %error, "Tool reported an error");
                    RunItem::tool_error(&call.id, error)
                }
                None => RunItem::tool_success(&call.id, result.output),
            },
            Err(err) => {
                if err.is_fatal() {
                    error!(tool = %call.name, error = %err, "Tool failed outside its own error channel");
                } else {
                    warn!(tool = %call.name, error = %err, "Tool failed");
                }
                RunItem::tool_error(&call.id, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AgentGraphBuilder;
    use crate::items::ModelResponse;
    use crate::memory::{InMemorySessionStore, SessionStore};
    use crate::model::ScriptedProvider;
    use crate::tool::FunctionTool;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn add_tool() -> Arc<dyn crate::tool::Tool> {
        Arc::new(FunctionTool::new(
            "addition",
            "Add two numbers",
            json!({
                "type": "object",
                "properties": {"x": {"type": "number"}, "y": {"type": "number"}},
                "required": ["x", "y"]
            }),
            |args| {
                let x = args["x"].as_f64().unwrap_or_default();
                let y = args["y"].as_f64().unwrap_or_default();
                Ok(json!(x + y))
            },
        ))
    }

    fn failing_tool() -> Arc<dyn crate::tool::Tool> {
        Arc::new(FunctionTool::new(
            "explode",
            "Always fails",
            json!({"type": "object"}),
            |_| Err(AgentsError::tool("kaboom")),
        ))
    }

    /// triage -> {financial, wealth}; financial -> {wealth}; wealth -> {financial}
    fn graph() -> Arc<AgentGraph> {
        let mut builder = AgentGraphBuilder::new();
        builder
            .add(AgentDefinition::simple("triage_agent", "Route").with_tool_choice(ToolChoice::Required))
            .unwrap();
        builder
            .add(
                AgentDefinition::simple("financial_agent", "Summarise")
                    .with_tool(add_tool())
                    .with_tool(failing_tool()),
            )
            .unwrap();
        builder
            .add(
                AgentDefinition::simple("wealth_agent", "Advise")
                    .with_tool(add_tool())
                    .with_tool_choice(ToolChoice::Required),
            )
            .unwrap();
        builder
            .connect("triage_agent", &["financial_agent", "wealth_agent"])
            .unwrap();
        builder.connect("financial_agent", &["wealth_agent"]).unwrap();
        builder.connect("wealth_agent", &["financial_agent"]).unwrap();
        Arc::new(builder.build().unwrap())
    }

    async fn session() -> Session {
        Session::open(Arc::new(InMemorySessionStore::new()), "test").await.unwrap()
    }

    fn runner(provider: Arc<ScriptedProvider>) -> Runner {
        Runner::new(graph(), RunConfig::new(provider))
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let provider = Arc::new(ScriptedProvider::new().with_message("financial_agent", "Hello"));
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let result = runner.execute(&agent, "hi", &session).await.unwrap();
        assert_eq!(result.final_output, "Hello");
        assert_eq!(result.last_agent_name(), "financial_agent");
        assert_eq!(result.steps, 1);
        assert_eq!(result.usage.total.request_count, 1);
        assert!(result.trace_id.starts_with("trace_"));

        let history = session.history(None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history, result.new_items);

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "hi");
        assert_eq!(
            request.tool_names(),
            vec!["addition", "explode", "transfer_to_wealth_agent"]
        );
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_call("financial_agent", "addition", json!({"x": 2, "y": 3}))
                .with_reply("financial_agent", |req| {
                    ModelResponse::new_message(format!(
                        "Total is {}",
                        req.last_tool_output().unwrap_or("?")
                    ))
                }),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let result = runner.execute(&agent, "add", &session).await.unwrap();
        assert_eq!(result.final_output, "Total is 5.0");
        assert_eq!(result.steps, 2);
        let kinds: Vec<&str> = result.new_items.iter().map(RunItem::kind).collect();
        assert_eq!(kinds, vec!["message", "tool_call", "tool_output", "message"]);
    }

    #[tokio::test]
    async fn test_handoff_chain_switches_agent() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_handoff("triage_agent", "wealth_agent")
                .with_handoff("wealth_agent", "financial_agent")
                .with_message("financial_agent", "Here you go"),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let triage = runner.graph().require("triage_agent").unwrap();

        let result = runner.execute(&triage, "question", &session).await.unwrap();
        assert_eq!(result.last_agent_name(), "financial_agent");
        assert_eq!(result.steps, 3);
        let hops: Vec<(&str, &str)> = result
            .handoffs()
            .iter()
            .map(|h| (h.from_agent.as_str(), h.to_agent.as_str()))
            .collect();
        assert_eq!(
            hops,
            vec![("triage_agent", "wealth_agent"), ("wealth_agent", "financial_agent")]
        );

        // The receiving agent sees why it was called
        let seen = &provider.requests_for("financial_agent")[0];
        assert!(seen
            .messages
            .iter()
            .any(|m| m.role == Role::Tool && m.content.contains("financial_agent")));
        assert_eq!(result.usage.by_agent.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_handoff_keeps_history() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_call("financial_agent", "addition", json!({"x": 1, "y": 1}))
                .with_tool_calls(
                    "financial_agent",
                    vec![
                        ToolCall::new("addition", json!({"x": 1, "y": 2})),
                        ToolCall::new("transfer_to_triage_agent", json!({})),
                    ],
                ),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let err = runner.execute(&agent, "go", &session).await.unwrap_err();
        assert!(matches!(
            err,
            AgentsError::InvalidHandoff { ref from, ref to } if from == "financial_agent" && to == "triage_agent"
        ));
        // user input + first step (call, output); the rejected step left nothing
        assert_eq!(session.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_tool_calls_resolve_before_handoff() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_calls(
                    "financial_agent",
                    vec![
                        ToolCall::new("transfer_to_wealth_agent", json!({"reason": "strategy"})),
                        ToolCall::new("addition", json!({"x": 4, "y": 4})),
                    ],
                )
                .with_message("wealth_agent", "done"),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let result = runner.execute(&agent, "go", &session).await.unwrap();
        assert_eq!(result.last_agent_name(), "wealth_agent");

        let kinds: Vec<&str> = result.new_items.iter().map(RunItem::kind).collect();
        assert_eq!(
            kinds,
            vec!["message", "tool_call", "tool_call", "tool_output", "tool_output", "handoff", "message"]
        );
        match &result.new_items[3] {
            RunItem::ToolOutput(out) => assert_eq!(out.output, json!(8.0)),
            other => panic!("expected addition output, got {other:?}"),
        }
        assert_eq!(result.handoffs()[0].reason.as_deref(), Some("strategy"));
    }

    #[tokio::test]
    async fn test_multiple_handoffs_first_wins() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_calls(
                    "triage_agent",
                    vec![
                        ToolCall::new("transfer_to_wealth_agent", json!({})),
                        ToolCall::new("transfer_to_financial_agent", json!({})),
                    ],
                )
                .with_message("wealth_agent", "wealth here"),
        );
        let runner = runner(provider);
        let session = session().await;
        let triage = runner.graph().require("triage_agent").unwrap();

        let result = runner.execute(&triage, "go", &session).await.unwrap();
        assert_eq!(result.last_agent_name(), "wealth_agent");
        let ignored = result.new_items.iter().any(|item| {
            matches!(item, RunItem::ToolOutput(out) if out.error.as_deref() == Some(IGNORED_HANDOFF))
        });
        assert!(ignored);
    }

    #[tokio::test]
    async fn test_schema_violation_and_tool_errors_stay_in_band() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_calls(
                    "financial_agent",
                    vec![
                        ToolCall::new("addition", json!({"x": "ten"})),
                        ToolCall::new("explode", json!({})),
                        ToolCall::new("web_search", json!({"q": "rates"})),
                    ],
                )
                .with_message("financial_agent", "Sorry, something went wrong"),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let result = runner.execute(&agent, "go", &session).await.unwrap();
        assert_eq!(result.final_output, "Sorry, something went wrong");

        let errors: Vec<String> = result
            .new_items
            .iter()
            .filter_map(|item| match item {
                RunItem::ToolOutput(out) => out.error.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("Schema violation for tool 'addition'"));
        assert!(errors[1].contains("kaboom"));
        assert_eq!(errors[2], "Unknown tool 'web_search'");

        let second = &provider.requests()[1];
        assert!(second
            .messages
            .iter()
            .any(|m| m.role == Role::Tool && m.content.starts_with("Error: Schema violation")));
    }

    /// Fails with a storage error from `execute` instead of a `ToolResult`.
    #[derive(Debug)]
    struct LostLedgerTool;

    #[async_trait]
    impl crate::tool::Tool for LostLedgerTool {
        fn name(&self) -> &str {
            "ledger"
        }

        fn description(&self) -> &str {
            "Reads the ledger"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _arguments: serde_json::Value) -> Result<crate::tool::ToolResult> {
            Err(AgentsError::StorageUnavailable("ledger.db is gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fatal_tool_error_is_still_fed_back() {
        let mut builder = AgentGraphBuilder::new();
        builder
            .add(
                AgentDefinition::simple("financial_agent", "Summarise")
                    .with_tool(Arc::new(LostLedgerTool)),
            )
            .unwrap();
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_call("financial_agent", "ledger", json!({}))
                .with_message("financial_agent", "The ledger is unavailable"),
        );
        let runner = Runner::new(Arc::new(builder.build().unwrap()), RunConfig::new(provider));
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let result = runner.execute(&agent, "balance?", &session).await.unwrap();
        assert_eq!(result.final_output, "The ledger is unavailable");
        let error = result.new_items.iter().find_map(|item| match item {
            RunItem::ToolOutput(out) => out.error.clone(),
            _ => None,
        });
        assert_eq!(error.as_deref(), Some("Storage unavailable: ledger.db is gone"));
    }

    #[tokio::test]
    async fn test_step_budget_is_exact() {
        let provider = Arc::new(ScriptedProvider::new().with_default_reply(|_| {
            ModelResponse::new_tool_calls(vec![ToolCall::new("addition", json!({"x": 1, "y": 1}))])
        }));
        let runner = Runner::new(graph(), RunConfig::new(provider.clone()).with_max_steps(4));
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        let err = runner.execute(&agent, "loop", &session).await.unwrap_err();
        assert!(matches!(err, AgentsError::StepBudgetExceeded { max_steps: 4 }));
        assert_eq!(provider.call_count(), 4);
        // user input + 4 completed steps of (call, output)
        assert_eq!(session.len().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_required_tool_choice_resets_after_tool_use() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_call("wealth_agent", "addition", json!({"x": 1, "y": 2}))
                .with_message("wealth_agent", "3"),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("wealth_agent").unwrap();

        runner.execute(&agent, "go", &session).await.unwrap();
        let choices: Vec<ToolChoice> = provider
            .requests()
            .iter()
            .map(|r| r.settings.tool_choice)
            .collect();
        assert_eq!(choices, vec![ToolChoice::Required, ToolChoice::Auto]);
    }

    #[tokio::test]
    async fn test_history_carries_across_turns() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_message("financial_agent", "first answer")
                .with_message("financial_agent", "second answer"),
        );
        let runner = runner(provider.clone());
        let session = session().await;
        let agent = runner.graph().require("financial_agent").unwrap();

        runner.execute(&agent, "one", &session).await.unwrap();
        runner.execute(&agent, "two", &session).await.unwrap();

        let second = &provider.requests()[1];
        let contents: Vec<&str> = second.messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "first answer", "two"]);
    }

    #[tokio::test]
    async fn test_ephemeral_run_touches_no_session() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_tool_call("financial_agent", "addition", json!({"x": 1, "y": 2}))
                .with_message("financial_agent", "3"),
        );
        let runner = runner(provider);
        let agent = runner.graph().require("financial_agent").unwrap();

        let result = runner.execute_ephemeral(&agent, "1+2").await.unwrap();
        assert_eq!(result.final_output, "3");
        assert_eq!(result.new_items.len(), 4);
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get_or_create(&self, session_id: &str) -> Result<crate::memory::SessionInfo> {
            Ok(crate::memory::SessionInfo {
                session_id: session_id.to_string(),
                created_at: chrono::Utc::now(),
                item_count: 0,
            })
        }

        async fn append(&self, _session_id: &str, _items: Vec<RunItem>) -> Result<()> {
            Err(AgentsError::StorageUnavailable("disk full".to_string()))
        }

        async fn history(&self, _session_id: &str, _limit: Option<usize>) -> Result<Vec<RunItem>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_turn() {
        let provider = Arc::new(ScriptedProvider::new().with_message("financial_agent", "unused"));
        let runner = runner(provider.clone());
        let session = Session::open(Arc::new(BrokenStore), "broken").await.unwrap();
        let agent = runner.graph().require("financial_agent").unwrap();

        let err = runner.execute(&agent, "hi", &session).await.unwrap_err();
        assert!(matches!(err, AgentsError::StorageUnavailable(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("abc", 5), "abc");
        assert_eq!(truncate_for_log("ééééé", 2), "éé…");
    }
}
