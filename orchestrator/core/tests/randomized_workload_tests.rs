// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Random submit/cancel/complete/pause/resume sequences against a live
//! coordinator, checking pool accounting and lifecycle legality.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{gated, settle, MIB};
use kairo_core::application::coordinator::Coordinator;
use kairo_core::application::scheduler::{SubmitOptions, TaskDefinition};
use kairo_core::domain::agent::AgentKind;
use kairo_core::domain::config::EngineConfigSpec;
use kairo_core::domain::events::TaskEvent;
use kairo_core::domain::resource_pool::PoolLimits;
use kairo_core::domain::task::{ResourceRequirement, TaskId, TaskStatus};
use kairo_core::infrastructure::event_bus::{EngineEvent, EventReceiver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;

const LIMITS: PoolLimits = PoolLimits {
    max_memory_bytes: 1024 * MIB,
    max_cpu_percent: 100,
    max_concurrent_tasks: 3,
};

struct Workload {
    coordinator: Coordinator,
    tasks: Vec<(TaskId, Arc<Semaphore>)>,
    events: EventReceiver,
}

fn assert_within_limits(c: &Coordinator) {
    let pool = c.report().pool;
    assert!(pool.reserved.memory_bytes <= LIMITS.max_memory_bytes, "memory over limit: {:?}", pool);
    assert!(pool.reserved.cpu_percent <= LIMITS.max_cpu_percent, "cpu over limit: {:?}", pool);
    assert!(pool.reserved.tasks <= LIMITS.max_concurrent_tasks, "tasks over limit: {:?}", pool);
    assert!(pool.releases <= pool.reservations_granted, "more releases than grants: {:?}", pool);
}

async fn run_workload(seed: u64, steps: usize) -> Workload {
    let mut spec = EngineConfigSpec::default();
    spec.pool = LIMITS;
    spec.scheduler.dispatch_interval_ms = 2;
    spec.scheduler.event_capacity = 16 * 1024;
    let coordinator = Coordinator::new(spec);
    let events = coordinator.event_bus().subscribe();
    coordinator.start();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut tasks: Vec<(TaskId, Arc<Semaphore>)> = Vec::new();

    for _ in 0..steps {
        match rng.random_range(0..6) {
            0 | 1 => {
                let agent = AgentKind::ALL[rng.random_range(0..AgentKind::ALL.len())];
                let gate = Arc::new(Semaphore::new(0));
                let opts = SubmitOptions {
                    priority: rng.random_range(1..=10),
                    requirement: ResourceRequirement::new(
                        rng.random_range(1..=400u64) * MIB,
                        rng.random_range(1..=60),
                    ),
                };
                let id = coordinator
                    .scheduler()
                    .submit(TaskDefinition::new(agent, "workload", gated(gate.clone())), opts)
                    .unwrap();
                tasks.push((id, gate));
            }
            2 if !tasks.is_empty() => {
                let (_, gate) = &tasks[rng.random_range(0..tasks.len())];
                gate.add_permits(1);
            }
            3 if !tasks.is_empty() => {
                let (id, _) = &tasks[rng.random_range(0..tasks.len())];
                let _ = coordinator.cancel(*id);
            }
            4 if !tasks.is_empty() => {
                let (id, _) = &tasks[rng.random_range(0..tasks.len())];
                if rng.random_bool(0.5) {
                    let _ = coordinator.pause(*id);
                } else {
                    let _ = coordinator.resume(*id);
                }
            }
            _ => tokio::time::sleep(Duration::from_millis(1)).await,
        }
        assert_within_limits(&coordinator);
    }

    // Drain: let every handler finish and un-pause whatever is parked.
    for (id, gate) in &tasks {
        gate.add_permits(1);
        let _ = coordinator.resume(*id);
    }
    for (id, _) in &tasks {
        let task = settle(coordinator.wait_for_terminal(*id)).await.unwrap();
        assert!(task.is_terminal());
        assert_within_limits(&coordinator);
    }

    Workload { coordinator, tasks, events }
}

fn status_after(event: &TaskEvent) -> Option<TaskStatus> {
    match event {
        TaskEvent::TaskSubmitted { .. } => Some(TaskStatus::Queued),
        TaskEvent::TaskStarted { .. } | TaskEvent::TaskResumed { .. } => Some(TaskStatus::Running),
        TaskEvent::TaskPaused { .. } => Some(TaskStatus::Paused),
        TaskEvent::TaskCompleted { .. } => Some(TaskStatus::Completed),
        TaskEvent::TaskFailed { .. } => Some(TaskStatus::Failed),
        TaskEvent::TaskCancelled { .. } => Some(TaskStatus::Cancelled),
        TaskEvent::TaskProgress { .. } => None,
    }
}

#[tokio::test]
async fn test_pool_accounting_under_random_operations() {
    for seed in [7, 42, 1337] {
        let workload = run_workload(seed, 300).await;
        let report = workload.coordinator.report();

        assert_eq!(report.pool.reserved.memory_bytes, 0, "seed {seed}");
        assert_eq!(report.pool.reserved.cpu_percent, 0, "seed {seed}");
        assert_eq!(report.pool.reserved.tasks, 0, "seed {seed}");
        assert_eq!(report.pool.reservations_granted, report.pool.releases, "seed {seed}");
        assert_eq!(report.invariant_violations, 0, "seed {seed}");
        assert_eq!(report.pool.invariant_violations, 0, "seed {seed}");
        assert_eq!(report.queue_depth, 0, "seed {seed}");
        assert_eq!(report.tasks.total(), workload.tasks.len(), "seed {seed}");

        workload.coordinator.shutdown();
    }
}

#[tokio::test]
async fn test_every_observed_transition_is_legal() {
    let mut workload = run_workload(2026, 250).await;

    let mut history: HashMap<TaskId, Vec<TaskStatus>> = HashMap::new();
    while let Ok(event) = workload.events.try_recv() {
        let event = match event {
            EngineEvent::Task(event) => event,
            EngineEvent::Invariant(violation) => panic!("invariant violation: {:?}", violation),
            EngineEvent::Health(_) => continue,
        };
        if let Some(status) = status_after(&event) {
            history.entry(event.task_id()).or_default().push(status);
        }
    }

    assert_eq!(history.len(), workload.tasks.len());
    for (id, _) in &workload.tasks {
        let states = &history[id];
        assert_eq!(states[0], TaskStatus::Queued, "task {id} did not start queued");
        for pair in states.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "task {id} moved {} -> {}",
                pair[0],
                pair[1]
            );
        }
        let last = *states.last().unwrap();
        assert!(last.is_terminal());
        assert_eq!(workload.coordinator.status(*id).unwrap().status(), last);
        // Exactly one terminal state per task.
        assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
    }

    workload.coordinator.shutdown();
}
