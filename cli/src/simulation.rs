// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Simulated agent handler for `kairo run`.
//!
//! Walks the assigned agent's playbook, sleeping a random step time per
//! action and reporting progress after each one. Fails a configurable share
//! of tasks so health tracking has something to react to.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use kairo_core::domain::execution::{handler_fn, TaskContext, TaskHandler};

#[derive(Debug, Clone, Copy)]
pub struct SimulationProfile {
    /// Probability in `[0, 1]` that a task fails at a random step.
    pub fail_rate: f64,
    pub min_step_ms: u64,
    pub max_step_ms: u64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            fail_rate: 0.0,
            min_step_ms: 50,
            max_step_ms: 250,
        }
    }
}

struct Plan {
    steps: Vec<Duration>,
    fail_at: Option<usize>,
}

impl SimulationProfile {
    fn plan(&self, step_count: usize) -> Plan {
        let mut rng = rand::rng();
        let (lo, hi) = (self.min_step_ms.min(self.max_step_ms), self.max_step_ms.max(self.min_step_ms));
        let steps = (0..step_count)
            .map(|_| Duration::from_millis(rng.random_range(lo..=hi)))
            .collect();
        let fail_at = (step_count > 0 && rng.random_bool(self.fail_rate.clamp(0.0, 1.0)))
            .then(|| rng.random_range(0..step_count));
        Plan { steps, fail_at }
    }
}

pub fn simulated_handler(profile: SimulationProfile) -> Arc<dyn TaskHandler> {
    handler_fn(move |ctx: TaskContext| async move {
        let playbook = ctx.agent().playbook();
        let plan = profile.plan(playbook.len());
        let mut done = Vec::with_capacity(playbook.len());

        for (index, (action, step)) in playbook.iter().zip(plan.steps).enumerate() {
            ctx.checkpoint().await?;
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = ctx.cancelled() => anyhow::bail!("cancelled during {}", action),
            }
            if plan.fail_at == Some(index) {
                anyhow::bail!("{} failed during {}", ctx.agent(), action);
            }
            done.push(*action);
            ctx.set_progress((((index + 1) * 100) / playbook.len()) as u8);
        }

        Ok::<_, anyhow::Error>(serde_json::json!({
            "agent": ctx.agent().as_str(),
            "request": ctx.task().label,
            "actions": done,
        }))
    })
}
