//! Model abstraction for LLM interactions
//!
//! [`ModelProvider`] is the seam to the reasoning capability: given an
//! agent's configuration and the conversation so far, it returns either text,
//! tool calls, or a handoff call (a tool call named `transfer_to_<agent>`).
//! [`OpenAIProvider`] talks to chat completions through `async-openai`;
//! [`ScriptedProvider`] replays canned responses for tests and demos.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::agent::{ModelSettings, ToolChoice};
use crate::error::{AgentsError, Result};
use crate::handoff::Handoff;
use crate::items::{Message, ModelResponse, Role, ToolCall};
use crate::tool::Tool;
use crate::usage::Usage;

/// Everything the reasoning capability sees for one step.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub agent_name: String,
    pub model: String,
    /// System message first, then the conversation history.
    pub messages: Vec<Message>,
    /// Tools and handoff edges advertised to the model.
    pub tools: Vec<Arc<dyn Tool>>,
    pub settings: ModelSettings,
}

impl ModelRequest {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Content of the most recent tool message, if the history ends with tool
    /// output.
    pub fn last_tool_output(&self) -> Option<&str> {
        match self.messages.last() {
            Some(m) if m.role == Role::Tool => Some(m.content.as_str()),
            _ => None,
        }
    }

    /// Content of the most recent user message.
    pub fn last_user_input(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for model providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Run one reasoning step.
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// OpenAI chat-completions provider using async-openai
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Provider configured from `OPENAI_API_KEY` and friends.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    fn convert_message(msg: &Message) -> Result<ChatCompletionRequestMessage> {
        let converted = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                let tool_calls = msg.tool_calls.as_deref().unwrap_or_default();
                if !msg.content.is_empty() || tool_calls.is_empty() {
                    builder.content(msg.content.clone());
                }
                if !tool_calls.is_empty() {
                    builder.tool_calls(
                        tool_calls
                            .iter()
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect::<Vec<_>>(),
                    );
                }
                builder.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(msg.content.clone())
                .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(converted)
    }

    fn convert_tools(tools: &[Arc<dyn Tool>]) -> Result<Vec<ChatCompletionTool>> {
        tools
            .iter()
            .map(|tool| {
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name())
                            .description(tool.description())
                            .parameters(tool.parameters_schema())
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }

    fn convert_tool_choice(choice: ToolChoice) -> ChatCompletionToolChoiceOption {
        match choice {
            ToolChoice::Auto => ChatCompletionToolChoiceOption::Auto,
            ToolChoice::Required => ChatCompletionToolChoiceOption::Required,
            ToolChoice::None => ChatCompletionToolChoiceOption::None,
        }
    }

    /// Tool arguments arrive as a JSON string. Unparseable arguments are kept
    /// verbatim so schema validation reports them to the agent.
    fn parse_arguments(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        let messages = request
            .messages
            .iter()
            .map(Self::convert_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model).messages(messages);

        // tool_choice is only accepted together with tools
        if !request.tools.is_empty() {
            args.tools(Self::convert_tools(&request.tools)?);
            args.tool_choice(Self::convert_tool_choice(request.settings.tool_choice));
        }

        if let Some(temp) = request.settings.temperature {
            args.temperature(temp);
        }

        if let Some(max) = request.settings.max_tokens {
            args.max_tokens(max);
        }

        debug!(agent = %request.agent_name, model = %request.model, "Sending chat completion request");
        let response = self.client.chat().create(args.build()?).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AgentsError::ModelBehaviorError {
                message: "No choices in response".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_ref()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: Self::parse_arguments(&tc.function.arguments),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let model_response = ModelResponse {
            id: response.id.clone(),
            content: choice.message.content.clone(),
            tool_calls,
            finish_reason: choice.finish_reason.as_ref().map(|r| format!("{:?}", r)),
            created_at: chrono::Utc::now(),
        };

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or_else(Usage::empty);

        Ok((model_response, usage))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

type ReplyFn = dyn Fn(&ModelRequest) -> ModelResponse + Send + Sync;

#[derive(Clone)]
enum ScriptedReply {
    Fixed(ModelResponse),
    Computed(Arc<ReplyFn>),
}

impl ScriptedReply {
    fn produce(&self, request: &ModelRequest) -> ModelResponse {
        match self {
            ScriptedReply::Fixed(response) => response.clone(),
            ScriptedReply::Computed(f) => f(request),
        }
    }
}

/// Deterministic provider that replays scripted responses per agent.
///
/// Each agent has its own queue, consumed in order. When an agent's queue is
/// empty the default reply is used if one was set; otherwise the step fails
/// with [`AgentsError::ModelBehaviorError`]. Every request is recorded.
///
/// ```rust
/// use finance_agents::model::ScriptedProvider;
///
/// let provider = ScriptedProvider::new()
///     .with_handoff("triage_agent", "financial_agent")
///     .with_message("financial_agent", "You spent 120.50 on groceries.");
/// assert_eq!(provider.call_count(), 0);
/// ```
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    default_reply: Option<ScriptedReply>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(self, agent: &str, reply: ScriptedReply) -> Self {
        Self::lock(&self.scripts)
            .entry(agent.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn with_response(self, agent: &str, response: ModelResponse) -> Self {
        self.push(agent, ScriptedReply::Fixed(response))
    }

    pub fn with_message(self, agent: &str, content: impl Into<String>) -> Self {
        self.with_response(agent, ModelResponse::new_message(content))
    }

    pub fn with_tool_call(self, agent: &str, tool_name: impl Into<String>, args: Value) -> Self {
        self.with_tool_calls(agent, vec![ToolCall::new(tool_name, args)])
    }

    pub fn with_tool_calls(self, agent: &str, calls: Vec<ToolCall>) -> Self {
        self.with_response(agent, ModelResponse::new_tool_calls(calls))
    }

    /// Script a handoff directive from `agent` to `target`.
    pub fn with_handoff(self, agent: &str, target: &str) -> Self {
        self.with_tool_call(
            agent,
            Handoff::tool_name_for(target),
            serde_json::json!({"reason": format!("{agent} delegates to {target}")}),
        )
    }

    /// Script a response computed from the request, e.g. one that quotes the
    /// last tool output.
    pub fn with_reply<F>(self, agent: &str, reply: F) -> Self
    where
        F: Fn(&ModelRequest) -> ModelResponse + Send + Sync + 'static,
    {
        self.push(agent, ScriptedReply::Computed(Arc::new(reply)))
    }

    /// Reply used for any agent whose queue is empty.
    pub fn with_default_reply<F>(mut self, reply: F) -> Self
    where
        F: Fn(&ModelRequest) -> ModelResponse + Send + Sync + 'static,
    {
        self.default_reply = Some(ScriptedReply::Computed(Arc::new(reply)));
        self
    }

    /// All recorded requests, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        Self::lock(&self.requests).clone()
    }

    pub fn requests_for(&self, agent: &str) -> Vec<ModelRequest> {
        Self::lock(&self.requests)
            .iter()
            .filter(|r| r.agent_name == agent)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        Self::lock(&self.requests).len()
    }

    /// Scripted responses not yet consumed, across all agents.
    pub fn remaining(&self) -> usize {
        Self::lock(&self.scripts).values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: ModelRequest) -> Result<(ModelResponse, Usage)> {
        Self::lock(&self.requests).push(request.clone());

        let scripted = Self::lock(&self.scripts)
            .get_mut(&request.agent_name)
            .and_then(VecDeque::pop_front);

        let reply = match scripted.or_else(|| self.default_reply.clone()) {
            Some(reply) => reply,
            None => {
                warn!(agent = %request.agent_name, "Script exhausted");
                return Err(AgentsError::ModelBehaviorError {
                    message: format!("no scripted response for agent '{}'", request.agent_name),
                });
            }
        };

        Ok((reply.produce(&request), Usage::new(10, 5)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("remaining", &self.remaining())
            .field("calls", &self.call_count())
            .finish()
    }
}
