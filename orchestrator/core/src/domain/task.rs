// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Aggregate
//!
//! [`ScheduledTask`] is the mutable unit of work owned by the scheduler. Its
//! status moves only along the lifecycle edges below; every mutator goes
//! through [`ScheduledTask::transition`] so timestamps stay consistent.
//!
//! ```text
//! Queued ──▶ Running ──▶ Completed | Failed
//!   │          │  ▲
//!   │          ▼  │
//!   │        Paused
//!   ▼          │
//! Cancelled ◀──┴── (from Queued, Running or Paused)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentKind;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A caller's free-text request. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
    /// Opaque caller data, only used for logging and telemetry.
    #[serde(default)]
    pub caller_context: HashMap<String, String>,
}

impl TaskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            text: text.into(),
            submitted_at: Utc::now(),
            caller_context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.caller_context.insert(key.into(), value.into());
        self
    }
}

/// Resources a task holds while it is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub memory_bytes: u64,
    pub cpu_percent: u32,
}

impl ResourceRequirement {
    pub fn new(memory_bytes: u64, cpu_percent: u32) -> Self {
        Self { memory_bytes, cpu_percent }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Whether `self → next` is a lifecycle edge.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Paused, Running)
                | (Queued, Cancelled)
                | (Running, Cancelled)
                | (Paused, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Why a task ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    /// True when the handler panicked rather than returning an error.
    #[serde(default)]
    pub panicked: bool,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), panicked: false }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self { message: message.into(), panicked: true }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub agent: AgentKind,
    /// Effective priority after any health penalty, 1 (lowest) to 10.
    pub priority: u8,
    /// Priority the submitter asked for.
    pub requested_priority: u8,
    pub requirement: ResourceRequirement,
    status: TaskStatus,
    progress: u8,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    error: Option<TaskFailure>,
    /// Free-form label for logs, usually the request text.
    pub label: String,
}

impl ScheduledTask {
    pub fn new(
        id: TaskId,
        agent: AgentKind,
        requested_priority: u8,
        priority: u8,
        requirement: ResourceRequirement,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id,
            agent,
            priority,
            requested_priority,
            requirement,
            status: TaskStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            label: label.into(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&TaskFailure> {
        self.error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time spent since admission, frozen once the task is terminal.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some(end - started)
    }

    /// Move to `next`, stamping `started_at` on first admission and
    /// `completed_at` on entering a terminal state.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError { from: self.status, to: next });
        }

        let now = Utc::now();
        if next == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 100;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, failure: TaskFailure) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    /// Record progress reported by the handler. Only applies while running;
    /// lower values than the current progress are ignored.
    pub fn set_progress(&mut self, percent: u8) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        let percent = percent.min(100);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }
}
