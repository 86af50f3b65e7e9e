// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Kinds
//!
//! The fixed set of specialized handlers a task can be routed to. The
//! declaration order of [`AgentKind`] is significant: it is the tie-break
//! order used by the classifier, so identical inputs always select the same
//! agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Research,
    Navigation,
    Shopping,
    Communication,
    Automation,
    Analysis,
}

impl AgentKind {
    /// Every agent, in tie-break order.
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Research,
        AgentKind::Navigation,
        AgentKind::Shopping,
        AgentKind::Communication,
        AgentKind::Automation,
        AgentKind::Analysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Research => "research",
            AgentKind::Navigation => "navigation",
            AgentKind::Shopping => "shopping",
            AgentKind::Communication => "communication",
            AgentKind::Automation => "automation",
            AgentKind::Analysis => "analysis",
        }
    }

    /// Position in [`AgentKind::ALL`].
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Ordered actions this agent performs for a routed task.
    ///
    /// Handlers may use the playbook to drive their own step sequence; the
    /// engine only carries it on the assignment.
    pub fn playbook(&self) -> &'static [&'static str] {
        match self {
            AgentKind::Research => &["create_tabs", "extract_data", "generate_report"],
            AgentKind::Navigation => &["navigate_to_url", "perform_search"],
            AgentKind::Shopping => &["create_retailer_tabs", "compare_prices", "analyze_deals"],
            AgentKind::Communication => &["create_template", "format_content"],
            AgentKind::Automation => &["create_workflow", "schedule_tasks"],
            AgentKind::Analysis => &["extract_content", "perform_analysis", "generate_insights"],
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown agent kind: '{0}'")]
pub struct UnknownAgentKind(pub String);

impl FromStr for AgentKind {
    type Err = UnknownAgentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        AgentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or(UnknownAgentKind(s.to_string()))
    }
}
