// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Outcome Sink Interface
//!
//! Optional durable-store collaborator called by the coordinator after a task
//! reaches a terminal state. Persistence is a fire-and-forget side effect: a
//! failing sink is logged and never affects scheduling or accounting.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `OutcomeSink` | `TaskRecord` | `InMemoryOutcomeSink` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentKind;
use crate::domain::task::{ScheduledTask, TaskFailure, TaskId, TaskStatus};

/// Terminal summary of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub agent: AgentKind,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    /// Zero for tasks cancelled before they were admitted.
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Build a record from a terminal task. Returns `None` while the task is
    /// still live.
    pub fn from_task(task: &ScheduledTask) -> Option<Self> {
        if !task.is_terminal() {
            return None;
        }
        Some(Self {
            task_id: task.id,
            agent: task.agent,
            status: task.status(),
            result: task.result().cloned(),
            error: task.error().cloned(),
            duration_ms: task
                .elapsed()
                .map(|d| d.num_milliseconds().max(0) as u64)
                .unwrap_or(0),
            finished_at: task.completed_at().unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn persist(&self, record: TaskRecord) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::ResourceRequirement;

    fn task() -> ScheduledTask {
        ScheduledTask::new(
            TaskId::new(),
            AgentKind::Communication,
            5,
            5,
            ResourceRequirement::new(1, 1),
            "compose email",
        )
    }

    #[test]
    fn test_record_only_for_terminal_tasks() {
        let mut t = task();
        assert!(TaskRecord::from_task(&t).is_none());

        t.transition(TaskStatus::Running).unwrap();
        assert!(TaskRecord::from_task(&t).is_none());

        t.complete(serde_json::json!({"sent": true})).unwrap();
        let record = TaskRecord::from_task(&t).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.agent, AgentKind::Communication);
        assert_eq!(record.result, Some(serde_json::json!({"sent": true})));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_record_for_cancelled_before_start() {
        let mut t = task();
        t.transition(TaskStatus::Cancelled).unwrap();
        let record = TaskRecord::from_task(&t).unwrap();
        assert_eq!(record.duration_ms, 0);
        assert_eq!(record.status, TaskStatus::Cancelled);
    }
}
