// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! KAiro Core
//!
//! Adaptive task coordination with resource-bounded execution.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Classify requests to specialist agents, admit them against
//!   a bounded resource pool and track per-agent health
//!
//! The usual entry point is [`application::coordinator::Coordinator`].

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
