//! Error types for the finance agents crate

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AgentsError>;

/// Main error type for agent orchestration
#[derive(Debug, Error)]
pub enum AgentsError {
    /// Tool arguments did not conform to the tool's declared schema.
    /// Recovered in-band: the runner turns it into a tool output item.
    #[error("Schema violation for tool '{tool}': {message}")]
    SchemaViolation { tool: String, message: String },

    /// A tool body failed. Recovered in-band like `SchemaViolation`.
    #[error("Tool execution error: {message}")]
    ToolExecutionError { message: String },

    /// An agent tried to hand off to a target it is not authorized for
    #[error("Invalid handoff from '{from}' to '{to}'")]
    InvalidHandoff { from: String, to: String },

    /// Too many reasoning steps in a single turn
    #[error("Step budget exceeded: {max_steps}")]
    StepBudgetExceeded { max_steps: usize },

    /// Session storage could not be read or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Two agents registered under the same name
    #[error("Duplicate agent name: {name}")]
    DuplicateAgent { name: String },

    /// An agent name that the graph does not know about
    #[error("Unknown agent: {name}")]
    UnknownAgent { name: String },

    /// A tool name missing from the registry
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// The reasoning capability returned something unusable
    #[error("Model behavior error: {message}")]
    ModelBehaviorError { message: String },

    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    /// The transactions dataset failed validation or could not be loaded
    #[error("Invalid dataset: {message}")]
    InvalidDataset { message: String },

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentsError {
    /// Whether this error aborts the turn when raised by the runner itself.
    /// Schema violations and tool execution errors are expected from tools;
    /// any other kind coming out of a tool is still fed back but logged as an error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AgentsError::SchemaViolation { .. } | AgentsError::ToolExecutionError { .. }
        )
    }

    pub(crate) fn tool(message: impl Into<String>) -> Self {
        AgentsError::ToolExecutionError {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for AgentsError {
    fn from(err: sqlx::Error) -> Self {
        AgentsError::StorageUnavailable(err.to_string())
    }
}

impl From<toml::de::Error> for AgentsError {
    fn from(err: toml::de::Error) -> Self {
        AgentsError::ConfigError(err.to_string())
    }
}
