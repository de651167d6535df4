//! Tool usage tracking.
//!
//! Counts successful invocations per tool and remembers the most recent one.
//! Failed, timed-out and handshake requests are never recorded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

/// The most recent successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Tool name
    pub tool: String,
    /// Parameters it was called with
    pub parameters: Map<String, Value>,
    /// Completion time
    pub at: DateTime<Utc>,
}

/// Invocation count for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolUsage {
    /// Tool name
    pub tool: String,
    /// Successful invocations
    pub count: u64,
}

#[derive(Debug, Default)]
struct UsageState {
    counts: HashMap<String, u64>,
    last: Option<ToolInvocation>,
}

/// Passive per-tool counters.
#[derive(Debug, Default)]
pub struct ToolUsageTracker {
    state: RwLock<UsageState>,
}

impl ToolUsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful invocation and return its record.
    pub fn record(&self, tool: &str, parameters: Map<String, Value>) -> ToolInvocation {
        let invocation = ToolInvocation {
            tool: tool.to_string(),
            parameters,
            at: Utc::now(),
        };

        let mut state = self.state.write();
        *state.counts.entry(tool.to_string()).or_insert(0) += 1;
        state.last = Some(invocation.clone());
        invocation
    }

    /// Successful invocations of `tool`.
    pub fn count(&self, tool: &str) -> u64 {
        self.state.read().counts.get(tool).copied().unwrap_or(0)
    }

    /// Successful invocations across all tools.
    pub fn total(&self) -> u64 {
        self.state.read().counts.values().sum()
    }

    /// Counts sorted by count descending, then name.
    pub fn snapshot(&self) -> Vec<ToolUsage> {
        let mut usage: Vec<ToolUsage> = self
            .state
            .read()
            .counts
            .iter()
            .map(|(tool, count)| ToolUsage {
                tool: tool.clone(),
                count: *count,
            })
            .collect();
        usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
        usage
    }

    /// The most recent successful invocation.
    pub fn last_invocation(&self) -> Option<ToolInvocation> {
        self.state.read().last.clone()
    }
}
