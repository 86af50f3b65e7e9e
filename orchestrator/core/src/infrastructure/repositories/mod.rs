// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outcome Sink Implementations
//!
//! Infrastructure implementations of [`OutcomeSink`] defined in the domain
//! layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist terminal task summaries
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryOutcomeSink** - Thread-safe Vec-backed storage for tests and demos
//! - **JsonLinesOutcomeSink** - Appends one JSON object per record to a file

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::repository::{OutcomeSink, SinkError, TaskRecord};
use crate::domain::task::TaskId;

#[derive(Clone, Default)]
pub struct InMemoryOutcomeSink {
    records: Arc<RwLock<Vec<TaskRecord>>>,
}

impl InMemoryOutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.records.read().clone()
    }

    pub fn find(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.records.read().iter().find(|r| r.task_id == task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl OutcomeSink for InMemoryOutcomeSink {
    async fn persist(&self, record: TaskRecord) -> Result<(), SinkError> {
        self.records.write().push(record);
        Ok(())
    }
}

pub struct JsonLinesOutcomeSink {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl JsonLinesOutcomeSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutcomeSink for JsonLinesOutcomeSink {
    async fn persist(&self, record: TaskRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(&line)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        file.flush().await.map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
