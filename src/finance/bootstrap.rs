//! Composition root for the finance assistant
//!
//! Everything shared across turns is built here exactly once: the
//! transaction dataset, the document store, the tool registry and the agent
//! graph. The graph is cyclic (financial and investment hand off to each
//! other) which the two-phase builder allows.

use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{AgentDefinition, ModelSettings, ToolChoice};
use crate::agent_tool::AgentTool;
use crate::config::AppConfig;
use crate::error::Result;
use crate::graph::{AgentGraph, AgentGraphBuilder};
use crate::model::ModelProvider;
use crate::runner::{RunConfig, Runner};
use crate::tool::{Tool, ToolRegistry};

use super::arithmetic::arithmetic_tools;
use super::data::TransactionData;
use super::documents::{DocumentStore, FileSearchTool, LocalDocumentStore, StoreInfo};
use super::prompts;
use super::query::{ColumnsTool, ExecuteSqlTool, MetadataTool};

pub const TRIAGE_AGENT: &str = "triage_agent";
pub const FINANCIAL_AGENT: &str = "financial_agent";
pub const SQL_QUERY_AGENT: &str = "sql_query_agent";
pub const INVESTMENT_AGENT: &str = "investment_agent";
pub const WEALTH_AGENT: &str = "wealth_agent";

pub const SQL_AGENT_TOOL: &str = "sql_query_agent_tool";
pub const WEALTH_STORE_NAME: &str = "wealth-advice";

const ARITHMETIC: [&str; 5] = [
    "addition",
    "subtraction",
    "multiplication",
    "division",
    "percent_change",
];

/// Handoff edges of the finance graph.
pub const EDGES: [(&str, &[&str]); 4] = [
    (TRIAGE_AGENT, &[FINANCIAL_AGENT, INVESTMENT_AGENT, WEALTH_AGENT]),
    (FINANCIAL_AGENT, &[INVESTMENT_AGENT]),
    (INVESTMENT_AGENT, &[FINANCIAL_AGENT, WEALTH_AGENT]),
    (WEALTH_AGENT, &[FINANCIAL_AGENT]),
];

/// The wired assistant.
#[derive(Debug, Clone)]
pub struct FinanceApp {
    pub graph: Arc<AgentGraph>,
    pub registry: ToolRegistry,
    pub runner: Runner,
    pub data: Arc<TransactionData>,
    /// Document store created at startup, if one is configured.
    pub store: Option<StoreInfo>,
}

impl FinanceApp {
    /// Agent every conversation starts with.
    pub fn entry_agent(&self) -> Result<Arc<AgentDefinition>> {
        self.graph.require(TRIAGE_AGENT)
    }
}

/// Load every resource named by `config` and wire the agents.
pub async fn bootstrap(config: &AppConfig, provider: Arc<dyn ModelProvider>) -> Result<FinanceApp> {
    let data = Arc::new(load_transactions(config).await?);
    let (store, file_search) = prepare_documents(config).await?;
    let run_config = config.run_config(provider);

    let registry = build_registry(&data, file_search, config, run_config.clone())?;
    let graph = Arc::new(build_graph(config, &registry)?);
    info!(agents = graph.len(), tools = registry.len(), "Finance assistant ready");

    Ok(FinanceApp {
        runner: Runner::new(graph.clone(), run_config),
        graph,
        registry,
        data,
        store,
    })
}

async fn load_transactions(config: &AppConfig) -> Result<TransactionData> {
    match &config.transactions_path {
        Some(path) => TransactionData::from_path(path, config.validation).await,
        None => {
            warn!("No transactions file configured; the dataset is empty");
            TransactionData::from_records(Vec::new(), config.validation).await
        }
    }
}

async fn prepare_documents(config: &AppConfig) -> Result<(Option<StoreInfo>, Option<Arc<dyn Tool>>)> {
    let Some(root) = &config.documents_dir else {
        return Ok((None, None));
    };

    let store: Arc<dyn DocumentStore> = Arc::new(LocalDocumentStore::new(root));
    let info = store.create_store(WEALTH_STORE_NAME).await?;
    if let Some(pdf) = &config.pdf_path {
        let outcome = store.upload(pdf, &info.id).await;
        if !outcome.is_success() {
            warn!(file = %outcome.file, "Wealth agent will run without its reference document");
        }
    }

    let tool = FileSearchTool::new(store, vec![info.id.clone()]);
    Ok((Some(info), Some(Arc::new(tool))))
}

fn sql_query_agent(config: &AppConfig, registry: &ToolRegistry) -> Result<AgentDefinition> {
    Ok(AgentDefinition::simple(
        SQL_QUERY_AGENT,
        prompts::with_handoff_prefix(prompts::SQL_QUERY_INSTRUCTIONS),
    )
    .with_model(&config.model)
    .with_model_settings(ModelSettings::new(0.0, ToolChoice::Required))
    .with_tools(registry.select(&["get_metadata_from_table", "get_table_columns", "execute_sql"])?))
}

/// Every tool the agents may use, keyed by name.
pub fn build_registry(
    data: &Arc<TransactionData>,
    file_search: Option<Arc<dyn Tool>>,
    config: &AppConfig,
    run_config: RunConfig,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(MetadataTool::new(data.clone())));
    registry.register(Arc::new(ColumnsTool::new(data.clone())));
    registry.register(Arc::new(ExecuteSqlTool::new(data.clone())));
    for tool in arithmetic_tools() {
        registry.register(tool);
    }
    if let Some(tool) = file_search {
        registry.register(tool);
    }

    let sql_agent = sql_query_agent(config, &registry)?;
    registry.register(Arc::new(AgentTool::new(
        &sql_agent,
        SQL_AGENT_TOOL,
        "Pulls data from the transactions table and aggregates it with SQL.",
        run_config,
    )?));
    Ok(registry)
}

fn with_arithmetic<'a>(first: &[&'a str]) -> Vec<&'a str> {
    first.iter().copied().chain(ARITHMETIC).collect()
}

/// Register the five agents and wire their handoffs.
pub fn build_graph(config: &AppConfig, registry: &ToolRegistry) -> Result<AgentGraph> {
    let model = config.model.as_str();

    let financial = AgentDefinition::simple(
        FINANCIAL_AGENT,
        prompts::with_handoff_prefix(prompts::FINANCIAL_INSTRUCTIONS),
    )
    .with_model(model)
    .with_model_settings(ModelSettings::new(0.2, ToolChoice::Auto))
    .with_handoff_description("Analyses the user's transactions: totals, trends and budgets.")
    .with_tools(registry.select(&with_arithmetic(&[SQL_AGENT_TOOL]))?);

    let investment = AgentDefinition::simple(
        INVESTMENT_AGENT,
        prompts::with_handoff_prefix(prompts::INVESTMENT_INSTRUCTIONS),
    )
    .with_model(model)
    .with_model_settings(ModelSettings::new(0.2, ToolChoice::Required))
    .with_handoff_description("Covers markets, securities and fund performance.")
    .with_tools(registry.select(&ARITHMETIC)?);

    let wealth_tools = if registry.get("file_search").is_some() {
        with_arithmetic(&["file_search"])
    } else {
        ARITHMETIC.to_vec()
    };
    let wealth = AgentDefinition::simple(
        WEALTH_AGENT,
        prompts::with_handoff_prefix(prompts::WEALTH_INSTRUCTIONS),
    )
    .with_model(model)
    .with_model_settings(ModelSettings::new(0.2, ToolChoice::Required))
    .with_handoff_description("Long-term wealth strategy grounded in economic moats.")
    .with_tools(registry.select(&wealth_tools)?);

    let triage = AgentDefinition::simple(
        TRIAGE_AGENT,
        prompts::with_handoff_prefix(prompts::TRIAGE_INSTRUCTIONS),
    )
    .with_model(model)
    .with_model_settings(ModelSettings::new(0.1, ToolChoice::Required));

    let mut builder = AgentGraphBuilder::new();
    builder
        .add(triage)?
        .add(financial)?
        .add(sql_query_agent(config, registry)?)?
        .add(investment)?
        .add(wealth)?;
    for (from, targets) in EDGES {
        builder.connect(from, targets)?;
    }
    builder.build()
}
