// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod health_registry;
pub mod scheduler;
pub mod coordinator;

// Re-export use cases for convenience
pub use coordinator::{Coordinator, EngineReport, Submission};
pub use health_registry::{AgentHealthSummary, HealthRegistry};
pub use scheduler::{Scheduler, SchedulerError, StatusCounts, SubmitOptions, TaskDefinition};
