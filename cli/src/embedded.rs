// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded engine
//!
//! Builds the coordinator in-process from the discovered configuration and
//! renders engine events for the terminal.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use kairo_core::application::coordinator::{Coordinator, EngineReport};
use kairo_core::domain::config::EngineConfigManifest;
use kairo_core::domain::events::{HealthEvent, InvariantEvent, TaskEvent};
use kairo_core::domain::health::HealthStatus;
use kairo_core::domain::repository::OutcomeSink;
use kairo_core::infrastructure::event_bus::EngineEvent;

pub struct EmbeddedEngine {
    coordinator: Coordinator,
    dispatch: JoinHandle<()>,
    sink_listener: Option<JoinHandle<()>>,
}

impl EmbeddedEngine {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = EngineConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        config.validate().context("Configuration validation failed")?;
        Ok(Self::from_manifest(config))
    }

    pub fn from_manifest(config: EngineConfigManifest) -> Self {
        let coordinator = Coordinator::new(config.spec);
        let dispatch = coordinator.start();
        Self {
            coordinator,
            dispatch,
            sink_listener: None,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn attach_sink(&mut self, sink: Arc<dyn OutcomeSink>) {
        self.sink_listener = Some(self.coordinator.attach_sink(sink));
    }

    /// Stop dispatching, cancel live work and wait for the background loops.
    pub async fn shutdown(self) -> Result<EngineReport> {
        self.coordinator.shutdown();
        self.dispatch.await.context("Dispatch loop panicked")?;
        if let Some(listener) = self.sink_listener {
            listener.await.context("Outcome sink listener panicked")?;
        }
        Ok(self.coordinator.report())
    }
}

pub fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Task(task_event) => match task_event {
            TaskEvent::TaskSubmitted {
                task_id,
                agent,
                priority,
                requested_priority,
                ..
            } => {
                let lowered = if priority != requested_priority {
                    format!(" (requested {})", requested_priority).yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "{} {} → {} priority {}{}",
                    "queued   ".dimmed(),
                    short(task_id),
                    agent.as_str().cyan(),
                    priority,
                    lowered
                );
            }
            TaskEvent::TaskStarted { task_id, agent, .. } => {
                println!("{} {} → {}", "started  ".bold(), short(task_id), agent.as_str().cyan());
            }
            TaskEvent::TaskProgress { task_id, progress, .. } => {
                println!("{} {} {}%", "progress ".dimmed(), short(task_id), progress);
            }
            TaskEvent::TaskPaused { task_id, .. } => {
                println!("{} {}", "paused   ".yellow(), short(task_id));
            }
            TaskEvent::TaskResumed { task_id, .. } => {
                println!("{} {}", "resumed  ".yellow(), short(task_id));
            }
            TaskEvent::TaskCompleted { task_id, duration_ms, .. } => {
                println!("{} {} in {}ms", "completed".bold().green(), short(task_id), duration_ms);
            }
            TaskEvent::TaskFailed { task_id, error, duration_ms, .. } => {
                println!(
                    "{} {} after {}ms - {}",
                    "failed   ".bold().red(),
                    short(task_id),
                    duration_ms,
                    error
                );
            }
            TaskEvent::TaskCancelled { task_id, .. } => {
                println!("{} {}", "cancelled".bold().yellow(), short(task_id));
            }
        },
        EngineEvent::Health(HealthEvent::HealthChanged {
            agent,
            previous,
            current,
            success_rate,
            ..
        }) => {
            println!(
                "{} {} {} → {} (success rate {:.0}%)",
                "health   ".magenta(),
                agent.as_str().cyan(),
                previous,
                colored_status(*current),
                success_rate * 100.0
            );
        }
        EngineEvent::Invariant(InvariantEvent::InvariantViolation { description, .. }) => {
            println!("{} {}", "INVARIANT".bold().red(), description);
        }
    }
}

pub fn print_report(report: &EngineReport) {
    println!();
    println!("{}", "Engine report:".bold());
    println!("  Queue depth: {}", report.queue_depth);
    println!(
        "  Tasks: {} completed, {} failed, {} cancelled, {} running, {} paused, {} queued",
        report.tasks.completed.to_string().green(),
        report.tasks.failed.to_string().red(),
        report.tasks.cancelled.to_string().yellow(),
        report.tasks.running,
        report.tasks.paused,
        report.tasks.queued
    );
    println!(
        "  Pool: {:.0}% memory, {:.0}% cpu, {}/{} slots ({} reservations, {} releases)",
        report.pool.memory_utilization,
        report.pool.cpu_utilization,
        report.pool.reserved.tasks,
        report.pool.limits.max_concurrent_tasks,
        report.pool.reservations_granted,
        report.pool.releases
    );
    if report.invariant_violations > 0 {
        println!("  {} {}", "Invariant violations:".bold().red(), report.invariant_violations);
    }

    if !report.agents.is_empty() {
        println!();
        println!("{}", "Agents:".bold());
        for agent in &report.agents {
            println!(
                "  {:<14} {:<9} success {:>5.1}%  avg {:>6.0}ms  streak {}  samples {}",
                agent.agent.as_str(),
                colored_status(agent.status),
                agent.success_rate * 100.0,
                agent.avg_duration_ms,
                agent.consecutive_failures,
                agent.samples
            );
        }
    }
}

fn colored_status(status: HealthStatus) -> colored::ColoredString {
    match status {
        HealthStatus::Healthy => status.as_str().green(),
        HealthStatus::Degraded => status.as_str().yellow(),
        HealthStatus::Failing => status.as_str().red(),
    }
}

fn short(task_id: &kairo_core::domain::task::TaskId) -> String {
    task_id.to_string().chars().take(8).collect()
}
