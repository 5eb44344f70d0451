//! # Token usage accounting
//!
//! [`Usage`] is what one reasoning step reports; [`UsageStats`] aggregates a
//! whole turn with breakdowns by model and by agent, so a turn that hops
//! from triage to the financial agent shows what each of them consumed.
//!
//! ```rust
//! use finance_agents::usage::{Usage, UsageStats};
//!
//! let mut stats = UsageStats::new();
//! stats.record("gpt-4o-mini", "triage_agent", Usage::new(120, 8));
//! stats.record("gpt-4o-mini", "financial_agent", Usage::new(900, 60));
//!
//! assert_eq!(stats.total.total_tokens, 1088);
//! assert_eq!(stats.total.request_count, 2);
//! assert_eq!(stats.by_model["gpt-4o-mini"].request_count, 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;

/// Token usage of one or more reasoning calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    /// Number of reasoning calls folded into this value.
    pub request_count: usize,
}

impl Usage {
    /// Usage of a single call.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_usage(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.add_usage(&other);
        self
    }
}

/// Usage aggregated over a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub total: Usage,
    pub by_model: BTreeMap<String, Usage>,
    pub by_agent: BTreeMap<String, Usage>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one call, updating the total and both breakdowns.
    pub fn record(&mut self, model: &str, agent: &str, usage: Usage) {
        self.total.add_usage(&usage);
        self.by_model
            .entry(model.to_string())
            .or_default()
            .add_usage(&usage);
        self.by_agent
            .entry(agent.to_string())
            .or_default()
            .add_usage(&usage);
    }

    /// One-line summary suitable for a log field.
    pub fn summary(&self) -> String {
        let agents: Vec<String> = self
            .by_agent
            .iter()
            .map(|(agent, usage)| format!("{agent}={}", usage.total_tokens))
            .collect();
        format!(
            "{} tokens over {} requests [{}]",
            self.total.total_tokens,
            self.total.request_count,
            agents.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_usage_addition() {
        let total = Usage::new(100, 50) + Usage::new(200, 75);
        assert_eq!(total.prompt_tokens, 300);
        assert_eq!(total.completion_tokens, 125);
        assert_eq!(total.total_tokens, 425);
        assert_eq!(total.request_count, 2);
        assert_eq!(Usage::empty().request_count, 0);
    }

    #[test]
    fn test_usage_stats_breakdowns() {
        let mut stats = UsageStats::new();
        stats.record("gpt-4o-mini", "triage_agent", Usage::new(10, 5));
        stats.record("gpt-4o", "sql_query_agent", Usage::new(20, 10));
        stats.record("gpt-4o-mini", "triage_agent", Usage::new(1, 1));

        assert_eq!(stats.total.total_tokens, 47);
        assert_eq!(stats.by_model.len(), 2);
        assert_eq!(stats.by_agent["triage_agent"].total_tokens, 17);
        assert_eq!(stats.by_agent["triage_agent"].request_count, 2);
        assert_eq!(
            stats.summary(),
            "47 tokens over 3 requests [sql_query_agent=30, triage_agent=17]"
        );
    }
}
