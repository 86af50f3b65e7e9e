// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Health Registry
//!
//! Owns one [`AgentHealthRecord`] per agent that has reported at least one
//! outcome. Written only by the scheduler's completion path; read by the
//! classifier and by the scheduler when computing effective priority.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Rolling per-agent health with synchronous status updates

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::agent::AgentKind;
use crate::domain::events::HealthEvent;
use crate::domain::health::{AgentHealthRecord, AgentHealthView, HealthStatus, HealthThresholds, OutcomeSample};
use crate::infrastructure::event_bus::EventBus;

/// Read-only summary of one agent's health, as exposed by reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealthSummary {
    pub agent: AgentKind,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub samples: usize,
}

impl From<&AgentHealthRecord> for AgentHealthSummary {
    fn from(record: &AgentHealthRecord) -> Self {
        Self {
            agent: record.agent,
            status: record.status(),
            consecutive_failures: record.consecutive_failures(),
            success_rate: record.success_rate(),
            avg_duration_ms: record.avg_duration_ms(),
            samples: record.samples(),
        }
    }
}

pub struct HealthRegistry {
    thresholds: HealthThresholds,
    records: RwLock<HashMap<AgentKind, AgentHealthRecord>>,
    event_bus: Option<Arc<EventBus>>,
}

impl HealthRegistry {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            records: RwLock::new(HashMap::new()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(thresholds: HealthThresholds, event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus: Some(event_bus),
            ..Self::new(thresholds)
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Push an outcome into the agent's window and recompute its status.
    /// Returns the status after the update.
    pub fn record_outcome(&self, agent: AgentKind, success: bool, duration_ms: u64) -> HealthStatus {
        let sample = OutcomeSample {
            success,
            duration_ms,
            at: Utc::now(),
        };

        let (previous, summary) = {
            let mut records = self.records.write();
            let record = records
                .entry(agent)
                .or_insert_with(|| AgentHealthRecord::new(agent, self.thresholds.window_size));
            let previous = record.record(sample, &self.thresholds);
            (previous, AgentHealthSummary::from(&*record))
        };

        metrics::gauge!("kairo_agent_health", "agent" => agent.as_str()).set(summary.status.level() as f64);

        if previous != summary.status {
            if summary.status == HealthStatus::Healthy {
                info!(
                    agent = %agent,
                    previous = %previous,
                    success_rate = summary.success_rate,
                    "Agent recovered"
                );
            } else {
                warn!(
                    agent = %agent,
                    previous = %previous,
                    current = %summary.status,
                    success_rate = summary.success_rate,
                    avg_duration_ms = summary.avg_duration_ms,
                    consecutive_failures = summary.consecutive_failures,
                    "Agent health changed"
                );
            }

            if let Some(bus) = &self.event_bus {
                bus.publish_health_event(HealthEvent::HealthChanged {
                    agent,
                    previous,
                    current: summary.status,
                    success_rate: summary.success_rate,
                    consecutive_failures: summary.consecutive_failures,
                    changed_at: Utc::now(),
                });
            }
        }

        summary.status
    }

    /// Snapshot of an agent's record, `None` until its first outcome.
    pub fn status(&self, agent: AgentKind) -> Option<AgentHealthRecord> {
        self.records.read().get(&agent).cloned()
    }

    /// Summaries for every agent with history, in agent order.
    pub fn summaries(&self) -> Vec<AgentHealthSummary> {
        let records = self.records.read();
        AgentKind::ALL
            .iter()
            .filter_map(|agent| records.get(agent).map(AgentHealthSummary::from))
            .collect()
    }

    /// Current status of every agent, defaulting to Healthy.
    pub fn statuses(&self) -> HashMap<AgentKind, HealthStatus> {
        AgentKind::ALL.iter().map(|agent| (*agent, self.health_of(*agent))).collect()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

impl AgentHealthView for HealthRegistry {
    fn health_of(&self, agent: AgentKind) -> HealthStatus {
        self.records
            .read()
            .get(&agent)
            .map(|r| r.status())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_bus::EngineEvent;

    #[test]
    fn test_unknown_agent_is_healthy() {
        let registry = HealthRegistry::default();
        assert!(registry.status(AgentKind::Shopping).is_none());
        assert_eq!(registry.health_of(AgentKind::Shopping), HealthStatus::Healthy);
        assert!(registry.summaries().is_empty());
    }

    #[test]
    fn test_failure_streak_and_recovery() {
        let registry = HealthRegistry::default();
        for _ in 0..20 {
            registry.record_outcome(AgentKind::Research, false, 100);
        }
        assert_eq!(registry.health_of(AgentKind::Research), HealthStatus::Failing);
        assert_eq!(registry.status(AgentKind::Research).unwrap().consecutive_failures(), 20);

        for _ in 0..20 {
            registry.record_outcome(AgentKind::Research, true, 100);
        }
        assert_eq!(registry.health_of(AgentKind::Research), HealthStatus::Healthy);
        assert_eq!(registry.status(AgentKind::Research).unwrap().consecutive_failures(), 0);
    }

    #[test]
    fn test_agents_are_independent() {
        let registry = HealthRegistry::default();
        for _ in 0..10 {
            registry.record_outcome(AgentKind::Analysis, false, 10);
            registry.record_outcome(AgentKind::Navigation, true, 10);
        }
        let statuses = registry.statuses();
        assert_eq!(statuses[&AgentKind::Analysis], HealthStatus::Failing);
        assert_eq!(statuses[&AgentKind::Navigation], HealthStatus::Healthy);
        assert_eq!(statuses[&AgentKind::Shopping], HealthStatus::Healthy);

        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].agent, AgentKind::Navigation);
        assert_eq!(summaries[1].agent, AgentKind::Analysis);
        assert_eq!(summaries[1].samples, 10);
    }

    #[tokio::test]
    async fn test_status_change_publishes_event() {
        let bus = Arc::new(EventBus::new(16));
        let mut receiver = bus.subscribe();
        let registry = HealthRegistry::with_event_bus(HealthThresholds::default(), bus);

        for _ in 0..5 {
            registry.record_outcome(AgentKind::Communication, false, 10);
        }

        match receiver.recv().await.unwrap() {
            EngineEvent::Health(HealthEvent::HealthChanged { agent, previous, current, .. }) => {
                assert_eq!(agent, AgentKind::Communication);
                assert_eq!(previous, HealthStatus::Healthy);
                assert_eq!(current, HealthStatus::Failing);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // No change, no second event.
        assert!(receiver.try_recv().is_err());
    }
}
