// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::sync::Arc;

use common::{coordinator, eventually, failing, gated, settle, MIB};
use kairo_core::application::scheduler::{SchedulerError, SubmitOptions, TaskDefinition};
use kairo_core::domain::agent::AgentKind;
use kairo_core::domain::classifier::Complexity;
use kairo_core::domain::config::ResourceBudgets;
use kairo_core::domain::events::TaskEvent;
use kairo_core::domain::health::HealthStatus;
use kairo_core::domain::resource_pool::PoolLimits;
use kairo_core::domain::task::{TaskRequest, TaskStatus};
use kairo_core::infrastructure::event_bus::EngineEvent;
use tokio::sync::Semaphore;

#[tokio::test]
async fn test_direct_navigation_request() {
    let c = coordinator(PoolLimits::new(1024 * MIB, 100, 4));
    let gate = Arc::new(Semaphore::new(1));

    let submission = c.submit_request(TaskRequest::new("go to example.com"), gated(gate)).unwrap();
    let affinity = &submission.classification.affinity;
    assert_eq!(submission.classification.assignment.primary, AgentKind::Navigation);
    assert!(affinity.confidence >= 80);
    assert_eq!(affinity.complexity, Complexity::Low);
    assert!(!submission.classification.assignment.needs_multiple_agents);

    let task = settle(c.wait_for_terminal(submission.task_id)).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result().unwrap()["agent"], "navigation");
}

#[tokio::test]
async fn test_comprehensive_request_gets_high_budget() {
    let c = coordinator(PoolLimits::new(1024 * MIB, 100, 4));
    let gate = Arc::new(Semaphore::new(0));
    let text = "research comprehensive, detailed developments across multiple AI topics and compare with several sources";

    let submission = c.submit_request(TaskRequest::new(text), gated(gate.clone())).unwrap();
    assert_eq!(submission.classification.affinity.complexity, Complexity::High);
    assert!(submission.classification.assignment.needs_multiple_agents);
    assert!(!submission.classification.assignment.supporting.is_empty());
    assert_eq!(submission.requirement, ResourceBudgets::default().high);

    eventually(|| c.status(submission.task_id).unwrap().status() == TaskStatus::Running).await;
    assert_eq!(c.report().pool.reserved.memory_bytes, ResourceBudgets::default().high.memory_bytes);

    gate.add_permits(1);
    settle(c.wait_for_terminal(submission.task_id)).await.unwrap();
    assert_eq!(c.report().pool.reserved.memory_bytes, 0);
}

#[tokio::test]
async fn test_concurrency_limit_holds_third_task() {
    let c = coordinator(PoolLimits::new(1024 * MIB, 100, 2));
    let gate = Arc::new(Semaphore::new(0));

    let ids: Vec<_> = ["research AI news", "research chip prices", "research solar cells"]
        .into_iter()
        .map(|text| c.submit(text, gated(gate.clone())).unwrap().0)
        .collect();

    eventually(|| c.list(Some(TaskStatus::Running)).len() == 2).await;
    let queued = c.list(Some(TaskStatus::Queued));
    assert_eq!(queued.len(), 1);
    let third = queued[0].id;
    assert!(ids.contains(&third));
    assert_eq!(c.report().queue_depth, 1);
    assert_eq!(c.report().pool.reserved.tasks, 2);

    gate.add_permits(1);
    eventually(|| c.status(third).unwrap().status() == TaskStatus::Running).await;
    let counts = c.report().tasks;
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.running, 2);
    assert_eq!(counts.queued, 0);

    gate.add_permits(2);
    for id in ids {
        assert_eq!(settle(c.wait_for_terminal(id)).await.unwrap().status(), TaskStatus::Completed);
    }
    let report = c.report();
    assert_eq!(report.pool.reserved.tasks, 0);
    assert_eq!(report.pool.reservations_granted, 3);
    assert_eq!(report.pool.releases, 3);
}

#[tokio::test]
async fn test_cancelled_queued_task_never_starts() {
    let c = coordinator(PoolLimits::new(1024 * MIB, 100, 1));
    let gate = Arc::new(Semaphore::new(0));
    let mut events = c.event_bus().subscribe();

    let (blocker, _) = c.submit("find best laptop deals", gated(gate.clone())).unwrap();
    eventually(|| c.status(blocker).unwrap().status() == TaskStatus::Running).await;

    let (waiting, _) = c.submit("compare prices for headphones", gated(gate.clone())).unwrap();
    tokio_test::assert_ok!(c.cancel(waiting));
    assert!(matches!(
        c.cancel(waiting),
        Err(SchedulerError::InvalidTransition { from: TaskStatus::Cancelled, .. })
    ));

    gate.add_permits(2);
    settle(c.wait_for_terminal(blocker)).await.unwrap();

    let task = c.status(waiting).unwrap();
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert!(task.started_at().is_none());

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::Task(TaskEvent::TaskStarted { task_id, .. }) = event {
            started.push(task_id);
        }
    }
    assert_eq!(started, vec![blocker]);
    assert_eq!(c.report().pool.reservations_granted, 1);
}

#[tokio::test]
async fn test_failing_agent_loses_routing() {
    let c = coordinator(PoolLimits::new(1024 * MIB, 100, 4));
    let text = "research and summarize the topic";
    assert_eq!(c.classify(text).assignment.primary, AgentKind::Research);

    // Pin the agent: routing itself shifts away from Research once it degrades.
    for _ in 0..10 {
        let id = c
            .scheduler()
            .submit(
                TaskDefinition::new(AgentKind::Research, "research the latest papers", failing()),
                SubmitOptions {
                    priority: 5,
                    requirement: ResourceBudgets::default().low,
                },
            )
            .unwrap();
        assert_eq!(settle(c.wait_for_terminal(id)).await.unwrap().status(), TaskStatus::Failed);
    }

    let report = c.report();
    let research = report.agents.iter().find(|a| a.agent == AgentKind::Research).unwrap();
    assert_eq!(research.status, HealthStatus::Failing);
    assert_eq!(research.consecutive_failures, 10);

    let rerouted = c.classify(text);
    assert_eq!(rerouted.assignment.primary, AgentKind::Analysis);
    assert!(rerouted.affinity.raw_scores[&AgentKind::Research] >= rerouted.affinity.raw_scores[&AgentKind::Analysis]);
}
