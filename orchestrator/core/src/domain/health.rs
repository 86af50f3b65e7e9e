// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Health
//!
//! Per-agent rolling outcome windows and the status derived from them.
//!
//! | Window evidence | Status |
//! |-----------------|--------|
//! | fewer than `min_observations` samples | `Healthy` |
//! | success rate < `failing_success_rate`, or avg duration > 2 × ceiling | `Failing` |
//! | success rate < `degraded_success_rate`, or avg duration > ceiling | `Degraded` |
//! | otherwise | `Healthy` |
//!
//! Status is recomputed on every recorded outcome; there is no timer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::domain::agent::AgentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Failing,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Failing => "failing",
        }
    }

    /// Numeric encoding for gauges: 0 healthy, 1 degraded, 2 failing.
    pub fn level(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Failing => 2,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Ring buffer capacity per agent.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Samples required before a non-healthy status can be assigned.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_failing_success_rate")]
    pub failing_success_rate: f64,
    #[serde(default = "default_degraded_success_rate")]
    pub degraded_success_rate: f64,
    #[serde(default = "default_duration_ceiling_ms")]
    pub duration_ceiling_ms: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_observations: default_min_observations(),
            failing_success_rate: default_failing_success_rate(),
            degraded_success_rate: default_degraded_success_rate(),
            duration_ceiling_ms: default_duration_ceiling_ms(),
        }
    }
}

fn default_window_size() -> usize {
    20
}

fn default_min_observations() -> usize {
    5
}

fn default_failing_success_rate() -> f64 {
    0.5
}

fn default_degraded_success_rate() -> f64 {
    0.8
}

fn default_duration_ceiling_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub success: bool,
    pub duration_ms: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthRecord {
    pub agent: AgentKind,
    window: VecDeque<OutcomeSample>,
    capacity: usize,
    status: HealthStatus,
    consecutive_failures: u32,
}

impl AgentHealthRecord {
    pub fn new(agent: AgentKind, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            agent,
            window: VecDeque::with_capacity(capacity),
            capacity,
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn window(&self) -> impl Iterator<Item = &OutcomeSample> {
        self.window.iter()
    }

    pub fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 1.0;
        }
        let successes = self.window.iter().filter(|s| s.success).count();
        successes as f64 / self.window.len() as f64
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let total: u64 = self.window.iter().map(|s| s.duration_ms).sum();
        total as f64 / self.window.len() as f64
    }

    /// Push a sample, evicting the oldest when full, and recompute the
    /// status. Returns the previous status.
    pub fn record(&mut self, sample: OutcomeSample, thresholds: &HealthThresholds) -> HealthStatus {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        self.consecutive_failures = self
            .window
            .iter()
            .rev()
            .take_while(|s| !s.success)
            .count() as u32;

        let previous = self.status;
        self.status = self.derive_status(thresholds);
        previous
    }

    fn derive_status(&self, thresholds: &HealthThresholds) -> HealthStatus {
        if self.window.len() < thresholds.min_observations {
            return HealthStatus::Healthy;
        }

        let success_rate = self.success_rate();
        let avg_duration = self.avg_duration_ms();
        let ceiling = thresholds.duration_ceiling_ms as f64;

        if success_rate < thresholds.failing_success_rate || avg_duration > 2.0 * ceiling {
            HealthStatus::Failing
        } else if success_rate < thresholds.degraded_success_rate || avg_duration > ceiling {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Read access to agent health for routing and scheduling decisions.
pub trait AgentHealthView: Send + Sync {
    fn health_of(&self, agent: AgentKind) -> HealthStatus;
}

/// Treats every agent as healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllHealthy;

impl AgentHealthView for AllHealthy {
    fn health_of(&self, _agent: AgentKind) -> HealthStatus {
        HealthStatus::Healthy
    }
}

impl AgentHealthView for HashMap<AgentKind, HealthStatus> {
    fn health_of(&self, agent: AgentKind) -> HealthStatus {
        self.get(&agent).copied().unwrap_or_default()
    }
}
