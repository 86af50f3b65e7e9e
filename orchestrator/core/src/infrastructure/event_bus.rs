// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Engine Events
//
// In-memory event streaming over a tokio broadcast channel. Feeds the CLI,
// the outcome sink listener and per-task completion waiters.
//
// Events are not persisted; a slow receiver that falls more than `capacity`
// events behind observes `EventBusError::Lagged` and skips ahead.

use crate::domain::events::{HealthEvent, InvariantEvent, TaskEvent};
use crate::domain::task::TaskId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified engine event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Task(TaskEvent),
    Health(HealthEvent),
    Invariant(InvariantEvent),
}

/// Event bus for publishing and subscribing to engine events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<EngineEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    pub fn publish_task_event(&self, event: TaskEvent) {
        self.publish(EngineEvent::Task(event));
    }

    pub fn publish_health_event(&self, event: HealthEvent) {
        self.publish(EngineEvent::Health(event));
    }

    pub fn publish_invariant_event(&self, event: InvariantEvent) {
        self.publish(EngineEvent::Invariant(event));
    }

    fn publish(&self, event: EngineEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all engine events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe and filter for a single task's lifecycle events
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        let receiver = self.sender.subscribe();
        TaskEventReceiver { receiver, task_id }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all engine events
pub struct EventReceiver {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<EngineEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<EngineEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for a single task's events (filtered)
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<EngineEvent>,
    task_id: TaskId,
}

impl TaskEventReceiver {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Receive the next event for this task, skipping everything else
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let EngineEvent::Task(task_event) = event {
                if task_event.task_id() == self.task_id {
                    return Ok(task_event);
                }
            }
        }
    }

    /// Wait for this task's Completed, Failed or Cancelled event
    pub async fn recv_terminal(&mut self) -> Result<TaskEvent, EventBusError> {
        loop {
            let event = self.recv().await?;
            if event.is_terminal() {
                return Ok(event);
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
