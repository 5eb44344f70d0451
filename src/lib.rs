//! # Finance agents
//!
//! Multi-agent routing for natural-language personal finance questions.
//! A small graph of specialised agents (triage, financial analysis, SQL
//! over transactions, investments, wealth strategy) hands a conversation
//! around until one of them produces a final answer.
//!
//! ## Core concepts
//!
//! - **Agent**: an immutable [`AgentDefinition`] with instructions, model
//!   settings, ordered tools and handoff edges
//! - **Graph**: the [`AgentGraph`] of authorized handoffs, built in two phases
//!   so cycles are allowed
//! - **Runner**: drives one turn, resolving tool calls and handoffs within a
//!   step budget
//! - **Session**: ordered conversation history behind a [`SessionStore`]
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use finance_agents::config::AppConfig;
//! use finance_agents::finance::bootstrap;
//! use finance_agents::memory::Session;
//! use finance_agents::model::OpenAIProvider;
//! use finance_agents::sqlite_session::SqliteSessionStore;
//!
//! # #[tokio::main]
//! # async fn main() -> finance_agents::Result<()> {
//! let config = AppConfig::from_env()?;
//! let app = bootstrap(&config, Arc::new(OpenAIProvider::new())).await?;
//!
//! let store = Arc::new(SqliteSessionStore::new(&config.session_db).await?);
//! let session = Session::open(store, &config.session_name).await?;
//!
//! let triage = app.entry_agent()?;
//! let result = app.runner.execute(&triage, "How much did I spend on groceries in 2024?", &session).await?;
//! println!("{} response: {}", result.last_agent_name(), result.final_output);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_tool;
pub mod config;
pub mod error;
pub mod finance;
pub mod graph;
pub mod handoff;
pub mod items;
pub mod memory;
pub mod model;
pub mod result;
pub mod runner;
pub mod sqlite_session;
pub mod tool;
pub mod usage;

pub use agent::{AgentDefinition, ModelSettings, ToolChoice};
pub use agent_tool::AgentTool;
pub use config::{AppConfig, ValidationMode};
pub use error::{AgentsError, Result};
pub use graph::{AgentGraph, AgentGraphBuilder};
pub use handoff::Handoff;
pub use items::{ModelResponse, RunItem, ToolCall};
pub use memory::{InMemorySessionStore, Session, SessionStore};
pub use model::{ModelProvider, OpenAIProvider, ScriptedProvider};
pub use result::TurnResult;
pub use runner::{RunConfig, Runner};
pub use sqlite_session::SqliteSessionStore;
pub use tool::{FunctionTool, Tool, ToolRegistry, ToolResult};
pub use usage::{Usage, UsageStats};
