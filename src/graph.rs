//! Directed handoff graph between agents
//!
//! The graph is built in two phases so that agents may hand off to each
//! other in cycles without any construction-order constraints:
//!
//! 1. register every [`AgentDefinition`] (nodes),
//! 2. wire handoff edges by name ([`AgentGraphBuilder::connect`]).
//!
//! [`AgentGraphBuilder::build`] checks that names are unique and that every
//! edge points at a registered agent, then freezes the definitions behind
//! `Arc`. After that the graph is read-only and shared by every turn.
//!
//! ```rust
//! use finance_agents::agent::AgentDefinition;
//! use finance_agents::graph::AgentGraphBuilder;
//!
//! # fn main() -> finance_agents::Result<()> {
//! let mut builder = AgentGraphBuilder::new();
//! builder.add(AgentDefinition::simple("financial_agent", "Summarise"))?;
//! builder.add(AgentDefinition::simple("investment_agent", "Markets"))?;
//! builder.connect("financial_agent", &["investment_agent"])?;
//! builder.connect("investment_agent", &["financial_agent"])?;
//! let graph = builder.build()?;
//!
//! let financial = graph.require("financial_agent")?;
//! assert!(graph.resolve_handoff(&financial, "investment_agent").is_ok());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::agent::AgentDefinition;
use crate::error::{AgentsError, Result};
use crate::handoff::Handoff;

/// Two-phase builder for an [`AgentGraph`].
#[derive(Debug, Default)]
pub struct AgentGraphBuilder {
    agents: Vec<AgentDefinition>,
    index: HashMap<String, usize>,
}

impl AgentGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase one: register a node. Names must be unique.
    pub fn add(&mut self, agent: AgentDefinition) -> Result<&mut Self> {
        if self.index.contains_key(agent.name()) {
            return Err(AgentsError::DuplicateAgent {
                name: agent.name().to_string(),
            });
        }
        self.index.insert(agent.name().to_string(), self.agents.len());
        self.agents.push(agent);
        Ok(self)
    }

    /// Phase two: assign the handoff targets of `from`, replacing any
    /// previously assigned edges. Each edge is described by the target's
    /// handoff description.
    pub fn connect(&mut self, from: &str, targets: &[&str]) -> Result<&mut Self> {
        let mut edges = Vec::with_capacity(targets.len());
        for target in targets {
            let node = self.node(target)?;
            let description = node
                .handoff_description()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Handles requests for {}", node.name()));
            edges.push(Handoff::new(*target, description));
        }

        let idx = *self.index.get(from).ok_or_else(|| AgentsError::UnknownAgent {
            name: from.to_string(),
        })?;
        debug!(from = %from, targets = ?targets, "Wiring handoff edges");
        self.agents[idx].set_handoffs(edges);
        Ok(self)
    }

    fn node(&self, name: &str) -> Result<&AgentDefinition> {
        self.index
            .get(name)
            .map(|&i| &self.agents[i])
            .ok_or_else(|| AgentsError::UnknownAgent {
                name: name.to_string(),
            })
    }

    /// Validate every edge and freeze the graph.
    pub fn build(self) -> Result<AgentGraph> {
        for agent in &self.agents {
            for edge in agent.handoffs() {
                if !self.index.contains_key(&edge.target) {
                    return Err(AgentsError::UnknownAgent {
                        name: edge.target.clone(),
                    });
                }
            }
        }

        let order = self.agents.iter().map(|a| a.name().to_string()).collect();
        let agents = self
            .agents
            .into_iter()
            .map(|a| (a.name().to_string(), Arc::new(a)))
            .collect();
        Ok(AgentGraph { agents, order })
    }
}

/// Frozen set of agents and their authorized handoff edges.
#[derive(Debug, Clone)]
pub struct AgentGraph {
    agents: HashMap<String, Arc<AgentDefinition>>,
    order: Vec<String>,
}

impl AgentGraph {
    pub fn get(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.agents.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<AgentDefinition>> {
        self.get(name).ok_or_else(|| AgentsError::UnknownAgent {
            name: name.to_string(),
        })
    }

    /// Resolve a handoff directive issued by `from`.
    ///
    /// Fails with [`AgentsError::InvalidHandoff`] unless `target` is one of
    /// `from`'s edges; never redirects to a different agent.
    pub fn resolve_handoff(
        &self,
        from: &AgentDefinition,
        target: &str,
    ) -> Result<Arc<AgentDefinition>> {
        if !from.can_hand_off_to(target) {
            return Err(AgentsError::InvalidHandoff {
                from: from.name().to_string(),
                to: target.to_string(),
            });
        }
        self.agents
            .get(target)
            .cloned()
            .ok_or_else(|| AgentsError::InvalidHandoff {
                from: from.name().to_string(),
                to: target.to_string(),
            })
    }

    /// Agent names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Every `(from, to)` edge in the graph.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .filter_map(|name| self.agents.get(name))
            .flat_map(|agent| {
                agent
                    .handoffs()
                    .iter()
                    .map(move |h| (agent.name(), h.target.as_str()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
