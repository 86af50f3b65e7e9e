// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entities, value objects and contracts of the engine. Nothing in here
//! spawns tasks or owns a runtime.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod agent;
pub mod task;
pub mod classifier;
pub mod resource_pool;
pub mod health;
pub mod execution;
pub mod events;
pub mod repository;
pub mod config;
