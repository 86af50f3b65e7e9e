// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordinator
//!
//! Entry point for callers: classifies a request, turns the classification
//! into a priority and a resource budget, and hands the task to the
//! [`Scheduler`]. Lifecycle commands pass straight through.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Submit/status/cancel/pause/resume/report facade
//!
//! # Priority
//!
//! `priority = 1 + round(confidence × 9 / 100)`, so a fully confident
//! classification runs at 10 and a fallback at the default confidence of 20
//! runs at 3. The scheduler may lower it further for an unhealthy agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::health_registry::{AgentHealthSummary, HealthRegistry};
use crate::application::scheduler::{
    Scheduler, SchedulerError, StatusCounts, SubmitOptions, TaskDefinition,
};
use crate::domain::classifier::{AffinityClassifier, AgentAssignment, Classification};
use crate::domain::config::{EngineConfigSpec, ResourceBudgets};
use crate::domain::execution::TaskHandler;
use crate::domain::repository::{OutcomeSink, TaskRecord};
use crate::domain::resource_pool::PoolSnapshot;
use crate::domain::task::{ResourceRequirement, ScheduledTask, TaskId, TaskRequest, TaskStatus, MAX_PRIORITY, MIN_PRIORITY};
use crate::infrastructure::event_bus::{EngineEvent, EventBus, EventBusError, TaskEventReceiver};

/// Everything decided about a request at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub task_id: TaskId,
    pub classification: Classification,
    pub priority: u8,
    pub requirement: ResourceRequirement,
}

/// Aggregate observability snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReport {
    pub generated_at: DateTime<Utc>,
    /// Tasks waiting for admission.
    pub queue_depth: usize,
    pub tasks: StatusCounts,
    pub pool: PoolSnapshot,
    /// Agents with at least one recorded outcome.
    pub agents: Vec<AgentHealthSummary>,
    pub invariant_violations: u64,
}

pub fn priority_for_confidence(confidence: u8) -> u8 {
    let confidence = f64::from(confidence.min(100));
    let priority = 1.0 + (confidence * 9.0 / 100.0).round();
    (priority as u8).clamp(MIN_PRIORITY, MAX_PRIORITY)
}

#[derive(Clone)]
pub struct Coordinator {
    classifier: Arc<AffinityClassifier>,
    scheduler: Scheduler,
    budgets: ResourceBudgets,
}

impl Coordinator {
    /// Wire a classifier, health registry, event bus and scheduler from one
    /// config spec. Call [`Coordinator::start`] inside a tokio runtime to
    /// begin dispatching.
    pub fn new(spec: EngineConfigSpec) -> Self {
        let event_bus = Arc::new(EventBus::new(spec.scheduler.event_capacity));
        let health = Arc::new(HealthRegistry::with_event_bus(spec.health.clone(), event_bus.clone()));
        let scheduler = Scheduler::new(spec.scheduler.clone(), spec.pool, health, event_bus);
        Self {
            classifier: Arc::new(AffinityClassifier::new(spec.classifier)),
            scheduler,
            budgets: spec.budgets,
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        self.scheduler.start()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        self.scheduler.health()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.scheduler.event_bus()
    }

    /// Classify against current agent health without submitting.
    pub fn classify(&self, text: &str) -> Classification {
        self.classifier.classify_with_health(text, self.health().as_ref())
    }

    /// Classify `text` and queue it. Returns as soon as the task is queued.
    pub fn submit(
        &self,
        text: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(TaskId, AgentAssignment), SchedulerError> {
        let submission = self.submit_request(TaskRequest::new(text), handler)?;
        Ok((submission.task_id, submission.classification.assignment))
    }

    pub fn submit_request(
        &self,
        request: TaskRequest,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Submission, SchedulerError> {
        let classification = self.classify(&request.text);
        let assignment = &classification.assignment;
        let affinity = &classification.affinity;

        if assignment.fallback {
            info!(
                task_id = %request.id,
                agent = %assignment.primary,
                confidence = affinity.confidence,
                "No agent met the admission threshold, using default agent"
            );
        }

        let priority = priority_for_confidence(affinity.confidence);
        let requirement = self.budgets.for_complexity(affinity.complexity);

        let definition = TaskDefinition::new(assignment.primary, request.text.clone(), handler).with_id(request.id);
        let task_id = self.scheduler.submit(definition, SubmitOptions { priority, requirement })?;

        info!(
            task_id = %task_id,
            agent = %assignment.primary,
            supporting = ?assignment.supporting,
            confidence = affinity.confidence,
            complexity = %affinity.complexity,
            priority,
            caller_context = ?request.caller_context,
            "Request routed"
        );

        Ok(Submission {
            task_id,
            classification,
            priority,
            requirement,
        })
    }

    pub fn status(&self, task_id: TaskId) -> Result<ScheduledTask, SchedulerError> {
        self.scheduler.status(task_id)
    }

    pub fn list(&self, filter: Option<TaskStatus>) -> Vec<ScheduledTask> {
        self.scheduler.list(filter)
    }

    pub fn cancel(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        self.scheduler.cancel(task_id)
    }

    pub fn pause(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        self.scheduler.pause(task_id)
    }

    pub fn resume(&self, task_id: TaskId) -> Result<(), SchedulerError> {
        self.scheduler.resume(task_id)
    }

    /// Completion notification for one task.
    pub fn subscribe_task(&self, task_id: TaskId) -> Result<TaskEventReceiver, SchedulerError> {
        self.scheduler.subscribe_task(task_id)
    }

    pub async fn wait_for_terminal(&self, task_id: TaskId) -> Result<ScheduledTask, SchedulerError> {
        self.scheduler.wait_for_terminal(task_id).await
    }

    pub fn report(&self) -> EngineReport {
        EngineReport {
            generated_at: Utc::now(),
            queue_depth: self.scheduler.queue_depth(),
            tasks: self.scheduler.status_counts(),
            pool: self.scheduler.pool_snapshot(),
            agents: self.health().summaries(),
            invariant_violations: self.scheduler.invariant_violations(),
        }
    }

    /// Forward every terminal task to `sink` from a background listener.
    /// The scheduler never waits on the sink; persist failures are logged
    /// and otherwise ignored. The listener drains pending records and exits
    /// after [`Coordinator::shutdown`].
    pub fn attach_sink(&self, sink: Arc<dyn OutcomeSink>) -> JoinHandle<()> {
        let mut receiver = self.event_bus().subscribe();
        let scheduler = self.scheduler.clone();
        let stopped = scheduler.stopped();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => {
                        while let Ok(event) = receiver.try_recv() {
                            forward_to_sink(&scheduler, sink.as_ref(), event).await;
                        }
                        debug!("Outcome sink listener stopped");
                        break;
                    }
                    event = receiver.recv() => match event {
                        Ok(event) => forward_to_sink(&scheduler, sink.as_ref(), event).await,
                        Err(EventBusError::Lagged(n)) => {
                            warn!(skipped = n, "Outcome sink listener lagged, records were not persisted");
                        }
                        Err(_) => break,
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

async fn forward_to_sink(scheduler: &Scheduler, sink: &dyn OutcomeSink, event: EngineEvent) {
    let EngineEvent::Task(event) = event else {
        return;
    };
    if !event.is_terminal() {
        return;
    }
    let Some(record) = scheduler.status(event.task_id()).ok().as_ref().and_then(TaskRecord::from_task) else {
        return;
    };

    let task_id = record.task_id;
    if let Err(e) = sink.persist(record).await {
        warn!(task_id = %task_id, "Failed to persist task outcome: {}", e);
    }
}
