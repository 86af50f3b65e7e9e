// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Contract
//!
//! The engine never performs agent work itself. Callers supply a
//! [`TaskHandler`]; the scheduler invokes it once per admitted task with a
//! [`TaskContext`] carrying the cancellation signal, the pause signal and a
//! progress hook.
//!
//! Cancellation and pausing are cooperative. A handler that never awaits
//! [`TaskContext::checkpoint`] (or selects on [`TaskContext::cancelled`])
//! keeps running until it returns on its own; its result is then discarded
//! if the task was cancelled in the meantime.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::agent::AgentKind;
use crate::domain::task::{ScheduledTask, TaskId};

/// Receives progress reports from running handlers.
pub trait ProgressReporter: Send + Sync {
    /// Returns whether the report was applied.
    fn report_progress(&self, task_id: TaskId, percent: u8) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Task {0} was cancelled")]
pub struct TaskCancelled(pub TaskId);

#[derive(Clone)]
pub struct TaskContext {
    task: ScheduledTask,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    reporter: Arc<dyn ProgressReporter>,
}

impl TaskContext {
    pub fn new(
        task: ScheduledTask,
        cancel: CancellationToken,
        paused: watch::Receiver<bool>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self { task, cancel, paused, reporter }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id
    }

    pub fn agent(&self) -> AgentKind {
        self.task.agent
    }

    /// Snapshot of the task taken at admission.
    pub fn task(&self) -> &ScheduledTask {
        &self.task
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task is cancelled or the engine shuts down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn set_progress(&self, percent: u8) -> bool {
        self.reporter.report_progress(self.task.id, percent)
    }

    /// Block while the task is paused. Fails if the task is cancelled first.
    pub async fn wait_while_paused(&self) -> Result<(), TaskCancelled> {
        let mut paused = self.paused.clone();
        loop {
            if self.cancel.is_cancelled() {
                return Err(TaskCancelled(self.task.id));
            }
            if !*paused.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TaskCancelled(self.task.id)),
                changed = paused.changed() => {
                    // Sender dropped: the scheduler has forgotten this task.
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Cooperative yield point: returns `Err` if cancelled, waits out a pause.
    pub async fn checkpoint(&self) -> Result<(), TaskCancelled> {
        self.wait_while_paused().await
    }
}

/// Caller-supplied execution callback.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, ctx: TaskContext) -> anyhow::Result<serde_json::Value>;
}

/// Adapts an async closure into a [`TaskHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    async fn execute(&self, ctx: TaskContext) -> anyhow::Result<serde_json::Value> {
        (self.f)(ctx).await
    }
}

/// Shorthand for `Arc::new(FnHandler::new(f))`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}
