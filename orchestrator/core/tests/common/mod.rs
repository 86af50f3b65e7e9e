// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kairo_core::application::coordinator::Coordinator;
use kairo_core::domain::config::EngineConfigSpec;
use kairo_core::domain::execution::{handler_fn, TaskContext, TaskHandler};
use kairo_core::domain::resource_pool::PoolLimits;
use tokio::sync::Semaphore;

pub const MIB: u64 = 1024 * 1024;

/// Coordinator with a fast dispatch tick and the given pool, already started.
pub fn coordinator(limits: PoolLimits) -> Coordinator {
    let mut spec = EngineConfigSpec::default();
    spec.pool = limits;
    spec.scheduler.dispatch_interval_ms = 5;
    let coordinator = Coordinator::new(spec);
    coordinator.start();
    coordinator
}

pub async fn eventually<F: Fn() -> bool>(check: F) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

pub async fn settle<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), f).await.expect("timed out")
}

/// Blocks until a permit is added to `gate` or the task is cancelled.
pub fn gated(gate: Arc<Semaphore>) -> Arc<dyn TaskHandler> {
    handler_fn(move |ctx: TaskContext| {
        let gate = gate.clone();
        async move {
            tokio::select! {
                permit = gate.acquire() => permit?.forget(),
                _ = ctx.cancelled() => anyhow::bail!("cancelled"),
            }
            Ok::<_, anyhow::Error>(serde_json::json!({ "agent": ctx.agent().as_str() }))
        }
    })
}

pub fn failing() -> Arc<dyn TaskHandler> {
    handler_fn(|ctx: TaskContext| async move {
        Err::<serde_json::Value, _>(anyhow::anyhow!("{} agent unavailable", ctx.agent()))
    })
}
