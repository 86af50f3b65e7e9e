// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scheduler (Shadow Workspace)
//!
//! Admits queued tasks into the [`ResourcePool`] and runs their handlers on
//! independent tokio tasks.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Priority queue, dispatch loop, task lifecycle commands
//!
//! # Locking
//!
//! Three independent lock scopes, never nested except where noted:
//!
//! | Structure | Lock |
//! |-----------|------|
//! | task arena (`TaskId → TaskSlot`) | `RwLock`, held only for lookup/insert |
//! | priority queue | `Mutex` |
//! | pool counters | `Mutex` inside [`ResourcePool`] |
//! | one task's status/progress | per-slot `Mutex` |
//!
//! Admission claims a task by flipping its status to `Running` and setting
//! `claimed` under that task's lock. `cancel` takes the same lock, so a
//! cancel racing with admission either wins (the dispatcher hands back the
//! reservation it just made) or loses (the task is `Running` and `cancel`
//! releases it).
//!
//! Every reservation owned by a task is released exactly once, guarded by
//! the slot's `released` flag.
//!
//! Lifecycle events are published while the task's lock is held, so each
//! task's events reach the bus in the order its status changed.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::health_registry::HealthRegistry;
use crate::domain::agent::AgentKind;
use crate::domain::config::SchedulerConfig;
use crate::domain::events::{InvariantEvent, TaskEvent};
use crate::domain::execution::{ProgressReporter, TaskContext, TaskHandler};
use crate::domain::health::{AgentHealthView, HealthStatus};
use crate::domain::resource_pool::{AdmissionDenial, PoolLimits, PoolSnapshot, ResourcePool};
use crate::domain::task::{
    ResourceRequirement, ScheduledTask, TaskFailure, TaskId, TaskStatus, TransitionError, MAX_PRIORITY,
    MIN_PRIORITY,
};
use crate::infrastructure::event_bus::{EventBus, EventBusError, TaskEventReceiver};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Invalid priority {0}: must be between 1 and 10")]
    InvalidPriority(u8),

    #[error(
        "Requirement of {} bytes / {}% cpu can never fit pool limits of {} bytes / {}% cpu",
        .requirement.memory_bytes, .requirement.cpu_percent, .limits.max_memory_bytes, .limits.max_cpu_percent
    )]
    Unschedulable {
        requirement: ResourceRequirement,
        limits: PoolLimits,
    },

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    fn transition(task_id: TaskId, err: TransitionError) -> Self {
        SchedulerError::InvalidTransition {
            task_id,
            from: err.from,
            to: err.to,
        }
    }
}

/// What to run.
pub struct TaskDefinition {
    pub id: TaskId,
    pub agent: AgentKind,
    pub label: String,
    pub handler: Arc<dyn TaskHandler>,
}

impl TaskDefinition {
    pub fn new(agent: AgentKind, label: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            id: TaskId::new(),
            agent,
            label: label.into(),
            handler,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }
}

/// How to run it.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    /// 1 (lowest) to 10.
    pub priority: u8,
    pub requirement: ResourceRequirement,
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Queued => self.queued += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Paused => self.paused += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.paused + self.completed + self.failed + self.cancelled
    }
}

/// Priority descending, then submission order.
type QueueKey = (Reverse<u8>, u64);

struct TaskSlot {
    id: TaskId,
    queue_key: QueueKey,
    requirement: ResourceRequirement,
    task: Mutex<ScheduledTask>,
    handler: Arc<dyn TaskHandler>,
    /// Set under the task lock when admission moves the task to Running.
    claimed: AtomicBool,
    released: AtomicBool,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    pool: ResourcePool,
    health: Arc<HealthRegistry>,
    event_bus: Arc<EventBus>,
    tasks: RwLock<HashMap<TaskId, Arc<TaskSlot>>>,
    queue: Mutex<BTreeMap<QueueKey, TaskId>>,
    seq: AtomicU64,
    nudge: Notify,
    /// Stops the dispatch loop and every handler's cancellation token.
    shutdown: CancellationToken,
    /// Cancelled once shutdown has finished cancelling live tasks.
    stopped: CancellationToken,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        limits: PoolLimits,
        health: Arc<HealthRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                pool: ResourcePool::new(limits),
                health,
                event_bus,
                tasks: RwLock::new(HashMap::new()),
                queue: Mutex::new(BTreeMap::new()),
                seq: AtomicU64::new(0),
                nudge: Notify::new(),
                shutdown: CancellationToken::new(),
                stopped: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the dispatch loop. It runs until [`Scheduler::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run().await;
        })
    }

    /// Queue a task. Never waits for admission.
    pub fn submit(&self, def: TaskDefinition, opts: SubmitOptions) -> Result<TaskId, SchedulerError> {
        self.inner.submit(def, opts)
    }

    pub fn status(&self, task_id: TaskId) -> Result<ScheduledTask, SchedulerError> {
        let slot = self.inner.slot(task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        let task = slot.task.lock().clone();
        Ok(task)
    }

    /// Snapshots of every known task, oldest first, optionally filtered.
    pub fn list(&self, filter: Option<TaskStatus>) -> Vec<ScheduledTask> {
        let slots: Vec<Arc<TaskSlot>> = self.inner.tasks.read().values().cloned().collect();
        let mut tasks: Vec<ScheduledTask> = slots
            .iter()
            .map(|slot| slot.task.lock().clone())
            .filter(|task| filter.map_or(true, |status| task.status() == status))
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }

    pub fn pause(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        self.inner.pause(task_id)
    }

    pub fn resume(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        self.inner.resume(task_id)
    }

    pub fn cancel(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        self.inner.cancel(task_id)
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let slots: Vec<Arc<TaskSlot>> = self.inner.tasks.read().values().cloned().collect();
        let mut counts = StatusCounts::default();
        for slot in slots {
            counts.add(slot.task.lock().status());
        }
        counts
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.inner.pool.snapshot()
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.inner.health
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    /// Stream of one task's lifecycle events.
    pub fn subscribe_task(&self, task_id: TaskId) -> Result<TaskEventReceiver, SchedulerError> {
        let receiver = self.inner.event_bus.subscribe_task(task_id);
        // Subscribe before the existence check so no event is missed.
        self.inner.slot(task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        Ok(receiver)
    }

    /// Resolves with the task's final snapshot once it is terminal.
    pub async fn wait_for_terminal(&self, task_id: TaskId) -> Result<ScheduledTask, SchedulerError> {
        let mut receiver = self.subscribe_task(task_id)?;
        loop {
            let task = self.status(task_id)?;
            if task.is_terminal() {
                return Ok(task);
            }
            match receiver.recv_terminal().await {
                Ok(_) | Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return self.status(task_id),
            }
        }
    }

    /// Drop terminal tasks that finished more than `max_age` ago from the
    /// arena. Returns how many were removed.
    pub fn purge_finished(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut tasks = self.inner.tasks.write();
        let before = tasks.len();
        tasks.retain(|_, slot| {
            let task = slot.task.lock();
            !(task.is_terminal() && task.completed_at().is_some_and(|at| at <= cutoff))
        });
        before - tasks.len()
    }

    /// Stop dispatching and cancel every non-terminal task.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!("Scheduler shutting down");
        self.inner.shutdown.cancel();

        let live: Vec<TaskId> = self
            .list(None)
            .into_iter()
            .filter(|task| !task.is_terminal())
            .map(|task| task.id)
            .collect();
        for task_id in live {
            if let Err(e) = self.inner.cancel(task_id) {
                debug!(task_id = %task_id, "Skipping cancel during shutdown: {}", e);
            }
        }
        self.inner.stopped.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fires after [`Scheduler::shutdown`] has published its final events.
    pub fn stopped(&self) -> CancellationToken {
        self.inner.stopped.clone()
    }

    /// Accounting faults absorbed so far, as counted by the pool.
    pub fn invariant_violations(&self) -> u64 {
        self.inner.pool.invariant_violations()
    }
}

impl SchedulerInner {
    async fn run(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.dispatch_interval_ms.max(1));
        info!(
            dispatch_interval_ms = period.as_millis() as u64,
            max_concurrent_tasks = self.pool.limits().max_concurrent_tasks,
            "Starting scheduler dispatch loop"
        );

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Scheduler dispatch loop stopped");
                    break;
                }
                _ = tick.tick() => {}
                _ = self.nudge.notified() => {}
            }
            self.dispatch_once();
        }
    }

    fn slot(&self, task_id: TaskId) -> Option<Arc<TaskSlot>> {
        self.tasks.read().get(&task_id).cloned()
    }

    fn effective_priority(&self, requested: u8, health: HealthStatus) -> u8 {
        let penalty = match health {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => self.config.degraded_priority_penalty,
            HealthStatus::Failing => self.config.failing_priority_penalty,
        };
        requested.saturating_sub(penalty).max(MIN_PRIORITY)
    }

    fn submit(&self, def: TaskDefinition, opts: SubmitOptions) -> Result<TaskId, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&opts.priority) {
            return Err(SchedulerError::InvalidPriority(opts.priority));
        }
        let limits = self.pool.limits();
        if !limits.can_ever_fit(&opts.requirement) {
            return Err(SchedulerError::Unschedulable {
                requirement: opts.requirement,
                limits,
            });
        }

        let health = self.health.health_of(def.agent);
        let priority = self.effective_priority(opts.priority, health);
        let queue_key = (Reverse(priority), self.seq.fetch_add(1, Ordering::SeqCst));

        let task = ScheduledTask::new(def.id, def.agent, opts.priority, priority, opts.requirement, def.label);
        let (paused, _) = watch::channel(false);
        let slot = Arc::new(TaskSlot {
            id: def.id,
            queue_key,
            requirement: opts.requirement,
            task: Mutex::new(task),
            handler: def.handler,
            claimed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            cancel: self.shutdown.child_token(),
            paused,
        });

        self.tasks.write().insert(def.id, slot);
        let depth = {
            let mut queue = self.queue.lock();
            queue.insert(queue_key, def.id);
            queue.len()
        };

        if priority != opts.priority {
            info!(
                task_id = %def.id,
                agent = %def.agent,
                requested_priority = opts.priority,
                priority,
                health = %health,
                "Lowered priority for unhealthy agent"
            );
        }
        info!(task_id = %def.id, agent = %def.agent, priority, queue_depth = depth, "Task queued");

        metrics::counter!("kairo_tasks_submitted_total", "agent" => def.agent.as_str()).increment(1);
        metrics::gauge!("kairo_queue_depth").set(depth as f64);

        self.event_bus.publish_task_event(TaskEvent::TaskSubmitted {
            task_id: def.id,
            agent: def.agent,
            priority,
            requested_priority: opts.priority,
            submitted_at: Utc::now(),
        });

        self.nudge.notify_one();
        Ok(def.id)
    }

    /// One scan of the queue in priority order. Tasks that do not fit the
    /// current free capacity stay queued; smaller ones behind them may run.
    fn dispatch_once(self: &Arc<Self>) -> usize {
        if self.shutdown.is_cancelled() {
            return 0;
        }

        let candidates: Vec<(QueueKey, TaskId)> = self.queue.lock().iter().map(|(k, id)| (*k, *id)).collect();
        let mut admitted = 0;

        for (key, task_id) in candidates {
            if !self.pool.has_spare_concurrency() {
                break;
            }

            let Some(slot) = self.slot(task_id) else {
                self.queue.lock().remove(&key);
                continue;
            };

            if slot.task.lock().status() != TaskStatus::Queued {
                self.queue.lock().remove(&key);
                continue;
            }

            if let Err(denial) = self.pool.try_reserve(&slot.requirement) {
                debug!(task_id = %task_id, reason = %denial, "Admission deferred");
                metrics::counter!("kairo_admission_deferred_total").increment(1);
                if matches!(denial, AdmissionDenial::Concurrency { .. }) {
                    break;
                }
                continue;
            }

            if self.admit_reserved(slot) {
                admitted += 1;
            }
        }

        metrics::gauge!("kairo_queue_depth").set(self.queue.lock().len() as f64);
        admitted
    }

    /// Claim a task whose reservation was just granted and start its worker.
    /// A task cancelled since the queue scan gets the reservation handed back.
    fn admit_reserved(self: &Arc<Self>, slot: Arc<TaskSlot>) -> bool {
        let started = {
            let mut task = slot.task.lock();
            if task.status() == TaskStatus::Queued && !slot.claimed.swap(true, Ordering::SeqCst) {
                match task.transition(TaskStatus::Running) {
                    Ok(()) => {
                        self.event_bus.publish_task_event(TaskEvent::TaskStarted {
                            task_id: slot.id,
                            agent: task.agent,
                            started_at: task.started_at().unwrap_or_else(Utc::now),
                        });
                        Some(task.clone())
                    }
                    Err(e) => {
                        error!(critical = true, task_id = %slot.id, "Admission transition rejected: {}", e);
                        None
                    }
                }
            } else {
                None
            }
        };
        self.queue.lock().remove(&slot.queue_key);

        match started {
            Some(snapshot) => {
                self.record_pool_gauges();
                info!(
                    task_id = %slot.id,
                    agent = %snapshot.agent,
                    priority = snapshot.priority,
                    "Task admitted"
                );
                self.spawn_worker(slot, snapshot);
                true
            }
            None => {
                // Lost the race with cancel; hand the fresh reservation back.
                debug!(task_id = %slot.id, "Returning reservation of a task cancelled during admission");
                if !self.pool.release(&slot.requirement) {
                    self.publish_invariant(Some(slot.id), "pool counters clamped returning an unclaimed reservation");
                }
                self.record_pool_gauges();
                false
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, slot: Arc<TaskSlot>, snapshot: ScheduledTask) {
        let inner = self.clone();
        tokio::spawn(async move {
            let reporter: Arc<dyn ProgressReporter> = inner.clone();
            let ctx = TaskContext::new(snapshot, slot.cancel.clone(), slot.paused.subscribe(), reporter);
            let handler = slot.handler.clone();
            let started = Instant::now();

            // Nested spawn so a panicking handler surfaces as a JoinError.
            let joined = tokio::spawn(async move { handler.execute(ctx).await }).await;
            let outcome = match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskFailure::new(format!("{:#}", e))),
                Err(join_err) if join_err.is_panic() => {
                    let payload = join_err.into_panic();
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "handler panicked".to_string());
                    Err(TaskFailure::panicked(message))
                }
                Err(join_err) => Err(TaskFailure::new(format!("handler aborted: {}", join_err))),
            };

            inner.finish(&slot, outcome, started.elapsed()).await;
        });
    }

    async fn finish(&self, slot: &TaskSlot, outcome: Result<serde_json::Value, TaskFailure>, elapsed: Duration) {
        let duration_ms = elapsed.as_millis() as u64;
        let mut paused = slot.paused.subscribe();

        let committed = loop {
            {
                let mut task = slot.task.lock();
                match task.status() {
                    TaskStatus::Running => break self.commit_outcome(slot, &mut task, outcome, duration_ms),
                    TaskStatus::Paused => {}
                    _ => break false,
                }
            }

            // Handler returned while paused: commit only after resume.
            while *paused.borrow_and_update() {
                tokio::select! {
                    _ = slot.cancel.cancelled() => break,
                    changed = paused.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            if slot.cancel.is_cancelled() && slot.task.lock().status() == TaskStatus::Paused {
                // Shutdown token fired without a status change; nothing to commit.
                break false;
            }
        };

        if !committed {
            debug!(task_id = %slot.id, "Discarding handler result for cancelled task");
        }
        self.nudge.notify_one();
    }

    /// Apply a handler outcome to a Running task. Called with the task lock
    /// held; releases the reservation and records health before the terminal
    /// event goes out.
    fn commit_outcome(
        &self,
        slot: &TaskSlot,
        task: &mut ScheduledTask,
        outcome: Result<serde_json::Value, TaskFailure>,
        duration_ms: u64,
    ) -> bool {
        let applied = match &outcome {
            Ok(value) => task.complete(value.clone()),
            Err(failure) => task.fail(failure.clone()),
        };
        if let Err(e) = applied {
            error!(critical = true, task_id = %slot.id, "Completion transition rejected: {}", e);
            return false;
        }

        let agent = task.agent;
        self.release_once(slot);
        self.health.record_outcome(agent, outcome.is_ok(), duration_ms);

        let now = Utc::now();
        match outcome {
            Ok(result) => {
                info!(task_id = %slot.id, agent = %agent, duration_ms, "Task completed");
                metrics::counter!("kairo_tasks_finished_total", "outcome" => "completed").increment(1);
                self.event_bus.publish_task_event(TaskEvent::TaskCompleted {
                    task_id: slot.id,
                    agent,
                    result,
                    duration_ms,
                    completed_at: now,
                });
            }
            Err(failure) => {
                warn!(
                    task_id = %slot.id,
                    agent = %agent,
                    duration_ms,
                    panicked = failure.panicked,
                    "Task failed: {}",
                    failure
                );
                metrics::counter!("kairo_tasks_finished_total", "outcome" => "failed").increment(1);
                self.event_bus.publish_task_event(TaskEvent::TaskFailed {
                    task_id: slot.id,
                    agent,
                    error: failure,
                    duration_ms,
                    failed_at: now,
                });
            }
        }
        true
    }

    fn pause(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        let slot = self.slot(task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        {
            let mut task = slot.task.lock();
            task.transition(TaskStatus::Paused)
                .map_err(|e| SchedulerError::transition(task_id, e))?;
            slot.paused.send_replace(true);
            self.event_bus.publish_task_event(TaskEvent::TaskPaused {
                task_id,
                paused_at: Utc::now(),
            });
        }
        info!(task_id = %task_id, "Task paused");
        Ok(())
    }

    fn resume(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        let slot = self.slot(task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        {
            let mut task = slot.task.lock();
            if task.status() != TaskStatus::Paused {
                return Err(SchedulerError::InvalidTransition {
                    task_id,
                    from: task.status(),
                    to: TaskStatus::Running,
                });
            }
            task.transition(TaskStatus::Running)
                .map_err(|e| SchedulerError::transition(task_id, e))?;
            slot.paused.send_replace(false);
            self.event_bus.publish_task_event(TaskEvent::TaskResumed {
                task_id,
                resumed_at: Utc::now(),
            });
        }
        info!(task_id = %task_id, "Task resumed");
        Ok(())
    }

    fn cancel(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        let slot = self.slot(task_id).ok_or(SchedulerError::TaskNotFound(task_id))?;
        let (previous, agent) = {
            let mut task = slot.task.lock();
            let previous = task.status();
            task.transition(TaskStatus::Cancelled)
                .map_err(|e| SchedulerError::transition(task_id, e))?;

            match previous {
                TaskStatus::Queued => {
                    let depth = {
                        let mut queue = self.queue.lock();
                        queue.remove(&slot.queue_key);
                        queue.len()
                    };
                    metrics::gauge!("kairo_queue_depth").set(depth as f64);
                }
                _ => {
                    slot.cancel.cancel();
                    if slot.claimed.load(Ordering::SeqCst) {
                        self.release_once(&slot);
                    }
                }
            }

            self.event_bus.publish_task_event(TaskEvent::TaskCancelled {
                task_id,
                agent: task.agent,
                cancelled_at: Utc::now(),
            });
            (previous, task.agent)
        };

        info!(task_id = %task_id, agent = %agent, from = %previous, "Task cancelled");
        metrics::counter!("kairo_tasks_finished_total", "outcome" => "cancelled").increment(1);

        self.nudge.notify_one();
        Ok(())
    }

    fn release_once(&self, slot: &TaskSlot) {
        if slot.released.swap(true, Ordering::SeqCst) {
            self.pool.record_violation();
            error!(critical = true, task_id = %slot.id, "Invariant violation: second release of a task reservation suppressed");
            self.publish_invariant(Some(slot.id), "second release of a task reservation suppressed");
            return;
        }
        // The pool logs and counts a clamped release itself.
        if !self.pool.release(&slot.requirement) {
            self.publish_invariant(Some(slot.id), "pool counters clamped at zero on release");
        }
        self.record_pool_gauges();
    }

    fn publish_invariant(&self, task_id: Option<TaskId>, description: &str) {
        metrics::counter!("kairo_invariant_violations_total").increment(1);
        self.event_bus.publish_invariant_event(InvariantEvent::InvariantViolation {
            task_id,
            description: description.to_string(),
            detected_at: Utc::now(),
        });
    }

    fn record_pool_gauges(&self) {
        let reserved = self.pool.reserved();
        metrics::gauge!("kairo_pool_reserved_memory_bytes").set(reserved.memory_bytes as f64);
        metrics::gauge!("kairo_pool_reserved_cpu_percent").set(reserved.cpu_percent as f64);
        metrics::gauge!("kairo_pool_reserved_tasks").set(reserved.tasks as f64);
    }
}

impl ProgressReporter for SchedulerInner {
    fn report_progress(&self, task_id: TaskId, percent: u8) -> bool {
        let Some(slot) = self.slot(task_id) else {
            return false;
        };
        let mut task = slot.task.lock();
        if !task.set_progress(percent) {
            return false;
        }
        self.event_bus.publish_task_event(TaskEvent::TaskProgress {
            task_id,
            progress: task.progress(),
            reported_at: Utc::now(),
        });
        true
    }
}
