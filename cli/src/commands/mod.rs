// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the KAiro CLI

pub mod classify;
pub mod config;
pub mod run;

pub use self::classify::ClassifyArgs;
pub use self::config::ConfigCommand;
pub use self::run::RunArgs;
