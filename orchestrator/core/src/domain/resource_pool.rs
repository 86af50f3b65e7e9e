// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Pool
//!
//! Capacity accounting for admitted tasks across three dimensions: memory,
//! CPU share and concurrent task count. The pool never retries or queues;
//! admission policy lives in the scheduler.
//!
//! # Invariants
//!
//! - `reserved.memory_bytes <= limits.max_memory_bytes`
//! - `reserved.cpu_percent <= limits.max_cpu_percent`
//! - `reserved.tasks <= limits.max_concurrent_tasks`
//!
//! A release that would drive a counter below zero is clamped and counted as
//! an invariant violation instead of panicking.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

use crate::domain::task::ResourceRequirement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: u32,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,
}

impl PoolLimits {
    pub fn new(max_memory_bytes: u64, max_cpu_percent: u32, max_concurrent_tasks: u32) -> Self {
        Self { max_memory_bytes, max_cpu_percent, max_concurrent_tasks }
    }

    /// Whether `req` could be admitted into an otherwise empty pool.
    pub fn can_ever_fit(&self, req: &ResourceRequirement) -> bool {
        self.max_concurrent_tasks > 0
            && req.memory_bytes <= self.max_memory_bytes
            && req.cpu_percent <= self.max_cpu_percent
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: default_max_memory_bytes(),
            max_cpu_percent: default_max_cpu_percent(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

fn default_max_memory_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_max_cpu_percent() -> u32 {
    100
}

fn default_max_concurrent_tasks() -> u32 {
    4
}

/// Currently reserved amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolUsage {
    pub memory_bytes: u64,
    pub cpu_percent: u32,
    pub tasks: u32,
}

/// Which limit refused a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenial {
    Concurrency { reserved: u32, limit: u32 },
    Memory { requested: u64, available: u64 },
    Cpu { requested: u32, available: u32 },
}

impl fmt::Display for AdmissionDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionDenial::Concurrency { reserved, limit } => {
                write!(f, "concurrency limit reached ({reserved}/{limit} tasks)")
            }
            AdmissionDenial::Memory { requested, available } => {
                write!(f, "insufficient memory (requested {requested} bytes, {available} available)")
            }
            AdmissionDenial::Cpu { requested, available } => {
                write!(f, "insufficient cpu (requested {requested}%, {available}% available)")
            }
        }
    }
}

/// Point-in-time view of the pool for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub limits: PoolLimits,
    pub reserved: PoolUsage,
    pub memory_utilization: f64,
    pub cpu_utilization: f64,
    pub concurrency_utilization: f64,
    pub reservations_granted: u64,
    pub releases: u64,
    pub invariant_violations: u64,
}

pub struct ResourcePool {
    limits: PoolLimits,
    reserved: Mutex<PoolUsage>,
    granted: AtomicU64,
    released: AtomicU64,
    violations: AtomicU64,
}

impl ResourcePool {
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            limits,
            reserved: Mutex::new(PoolUsage::default()),
            granted: AtomicU64::new(0),
            released: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn reserved(&self) -> PoolUsage {
        *self.reserved.lock()
    }

    /// Whether another task slot is free, regardless of its size.
    pub fn has_spare_concurrency(&self) -> bool {
        self.reserved.lock().tasks < self.limits.max_concurrent_tasks
    }

    /// Reserve `req` against all three limits at once. Nothing is reserved
    /// unless every dimension fits.
    pub fn try_reserve(&self, req: &ResourceRequirement) -> Result<(), AdmissionDenial> {
        let mut reserved = self.reserved.lock();

        if reserved.tasks >= self.limits.max_concurrent_tasks {
            return Err(AdmissionDenial::Concurrency {
                reserved: reserved.tasks,
                limit: self.limits.max_concurrent_tasks,
            });
        }

        let memory_available = self.limits.max_memory_bytes.saturating_sub(reserved.memory_bytes);
        if req.memory_bytes > memory_available {
            return Err(AdmissionDenial::Memory {
                requested: req.memory_bytes,
                available: memory_available,
            });
        }

        let cpu_available = self.limits.max_cpu_percent.saturating_sub(reserved.cpu_percent);
        if req.cpu_percent > cpu_available {
            return Err(AdmissionDenial::Cpu {
                requested: req.cpu_percent,
                available: cpu_available,
            });
        }

        reserved.memory_bytes += req.memory_bytes;
        reserved.cpu_percent += req.cpu_percent;
        reserved.tasks += 1;
        self.granted.fetch_add(1, Ordering::SeqCst);

        debug!(
            memory_bytes = req.memory_bytes,
            cpu_percent = req.cpu_percent,
            reserved_tasks = reserved.tasks,
            "Reserved pool capacity"
        );
        Ok(())
    }

    /// Return `req` to the pool. Returns `false` if any counter had to be
    /// clamped at zero, which means the reserve/release pairing was broken.
    pub fn release(&self, req: &ResourceRequirement) -> bool {
        let mut reserved = self.reserved.lock();
        let mut clean = true;

        if reserved.memory_bytes < req.memory_bytes {
            clean = false;
            reserved.memory_bytes = 0;
        } else {
            reserved.memory_bytes -= req.memory_bytes;
        }

        if reserved.cpu_percent < req.cpu_percent {
            clean = false;
            reserved.cpu_percent = 0;
        } else {
            reserved.cpu_percent -= req.cpu_percent;
        }

        if reserved.tasks == 0 {
            clean = false;
        } else {
            reserved.tasks -= 1;
        }

        self.released.fetch_add(1, Ordering::SeqCst);

        if !clean {
            self.violations.fetch_add(1, Ordering::SeqCst);
            error!(
                critical = true,
                memory_bytes = req.memory_bytes,
                cpu_percent = req.cpu_percent,
                "Invariant violation: pool release exceeded reserved capacity, counters clamped at zero"
            );
        }
        clean
    }

    /// Count an accounting fault caught before it reached the counters,
    /// such as a second release of the same reservation.
    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn invariant_violations(&self) -> u64 {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let reserved = self.reserved();
        PoolSnapshot {
            limits: self.limits,
            reserved,
            memory_utilization: percent(reserved.memory_bytes as f64, self.limits.max_memory_bytes as f64),
            cpu_utilization: percent(reserved.cpu_percent as f64, self.limits.max_cpu_percent as f64),
            concurrency_utilization: percent(reserved.tasks as f64, self.limits.max_concurrent_tasks as f64),
            reservations_granted: self.granted.load(Ordering::SeqCst),
            releases: self.released.load(Ordering::SeqCst),
            invariant_violations: self.violations.load(Ordering::SeqCst),
        }
    }
}

fn percent(used: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        (used / limit * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ResourcePool {
        ResourcePool::new(PoolLimits::new(1000, 100, 2))
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let pool = pool();
        pool.try_reserve(&ResourceRequirement::new(900, 10)).unwrap();

        let denial = pool.try_reserve(&ResourceRequirement::new(200, 10)).unwrap_err();
        assert_eq!(denial, AdmissionDenial::Memory { requested: 200, available: 100 });

        let reserved = pool.reserved();
        assert_eq!(reserved.memory_bytes, 900);
        assert_eq!(reserved.cpu_percent, 10);
        assert_eq!(reserved.tasks, 1);
    }

    #[test]
    fn test_concurrency_limit() {
        let pool = pool();
        let req = ResourceRequirement::new(1, 1);
        pool.try_reserve(&req).unwrap();
        pool.try_reserve(&req).unwrap();
        assert!(!pool.has_spare_concurrency());
        assert!(matches!(
            pool.try_reserve(&req),
            Err(AdmissionDenial::Concurrency { reserved: 2, limit: 2 })
        ));
    }

    #[test]
    fn test_cpu_limit() {
        let pool = pool();
        pool.try_reserve(&ResourceRequirement::new(0, 80)).unwrap();
        assert_eq!(
            pool.try_reserve(&ResourceRequirement::new(0, 30)),
            Err(AdmissionDenial::Cpu { requested: 30, available: 20 })
        );
    }

    #[test]
    fn test_release_restores_capacity() {
        let pool = pool();
        let req = ResourceRequirement::new(500, 50);
        pool.try_reserve(&req).unwrap();
        assert!(pool.release(&req));
        assert_eq!(pool.reserved(), PoolUsage::default());
        assert_eq!(pool.invariant_violations(), 0);
    }

    #[test]
    fn test_unpaired_release_clamps_and_counts_violation() {
        let pool = pool();
        assert!(!pool.release(&ResourceRequirement::new(10, 10)));
        assert_eq!(pool.reserved(), PoolUsage::default());
        assert_eq!(pool.invariant_violations(), 1);
    }

    #[test]
    fn test_snapshot_percentages() {
        let pool = pool();
        pool.try_reserve(&ResourceRequirement::new(250, 50)).unwrap();
        let snap = pool.snapshot();
        assert_eq!(snap.memory_utilization, 25.0);
        assert_eq!(snap.cpu_utilization, 50.0);
        assert_eq!(snap.concurrency_utilization, 50.0);
        assert_eq!(snap.reservations_granted, 1);
        assert_eq!(snap.releases, 0);
    }

    #[test]
    fn test_can_ever_fit() {
        let limits = PoolLimits::new(1000, 100, 2);
        assert!(limits.can_ever_fit(&ResourceRequirement::new(1000, 100)));
        assert!(!limits.can_ever_fit(&ResourceRequirement::new(1001, 1)));
        assert!(!PoolLimits::new(1000, 100, 0).can_ever_fit(&ResourceRequirement::new(1, 1)));
    }
}
