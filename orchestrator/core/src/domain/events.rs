// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentKind;
use crate::domain::health::HealthStatus;
use crate::domain::task::{TaskFailure, TaskId};

/// Task lifecycle events emitted by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskSubmitted {
        task_id: TaskId,
        agent: AgentKind,
        priority: u8,
        requested_priority: u8,
        submitted_at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        agent: AgentKind,
        started_at: DateTime<Utc>,
    },
    TaskProgress {
        task_id: TaskId,
        progress: u8,
        reported_at: DateTime<Utc>,
    },
    TaskPaused {
        task_id: TaskId,
        paused_at: DateTime<Utc>,
    },
    TaskResumed {
        task_id: TaskId,
        resumed_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        agent: AgentKind,
        result: serde_json::Value,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        agent: AgentKind,
        error: TaskFailure,
        duration_ms: u64,
        failed_at: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: TaskId,
        agent: AgentKind,
        cancelled_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::TaskSubmitted { task_id, .. }
            | TaskEvent::TaskStarted { task_id, .. }
            | TaskEvent::TaskProgress { task_id, .. }
            | TaskEvent::TaskPaused { task_id, .. }
            | TaskEvent::TaskResumed { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskFailed { task_id, .. }
            | TaskEvent::TaskCancelled { task_id, .. } => *task_id,
        }
    }

    /// Completed, Failed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::TaskCompleted { .. } | TaskEvent::TaskFailed { .. } | TaskEvent::TaskCancelled { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HealthEvent {
    HealthChanged {
        agent: AgentKind,
        previous: HealthStatus,
        current: HealthStatus,
        success_rate: f64,
        consecutive_failures: u32,
        changed_at: DateTime<Utc>,
    },
}

/// Accounting faults that were absorbed instead of crashing the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvariantEvent {
    InvariantViolation {
        task_id: Option<TaskId>,
        description: String,
        detected_at: DateTime<Utc>,
    },
}
