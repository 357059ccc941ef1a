//! Long-running operation tracking.
//!
//! Batch generation reports progress through lightweight task records.
//! Observers never poll; every change is broadcast as a
//! [`TaskProgress`](crate::events::EngineEvent::TaskProgress) event.
//! Updating a task that has already been deleted is a benign no-op, since
//! progress callbacks can race task cleanup.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::events::{EngineEvent, EventBus};
use crate::sync::{read_lock, write_lock};

/// Lifecycle state of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A tracked long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Percentage in 0..=100.
    pub progress: u8,
    pub status: TaskStatus,
}

/// Registry of in-flight and finished tasks.
pub struct TaskTracker {
    tasks: RwLock<HashMap<Uuid, Task>>,
    events: EventBus,
}

impl TaskTracker {
    pub fn new(events: EventBus) -> Self {
        TaskTracker {
            tasks: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register a new pending task and announce it.
    pub fn create_task(&self) -> Task {
        let task = Task {
            id: Uuid::new_v4(),
            progress: 0,
            status: TaskStatus::Pending,
        };
        write_lock(&self.tasks).insert(task.id, task);
        self.events.emit(EngineEvent::TaskProgress {
            task: task.id,
            progress: task.progress,
            status: task.status,
        });
        task
    }

    /// Update a task's progress and status, announcing the change. Progress
    /// is clamped to 100. Unknown ids are ignored.
    pub fn update_task(&self, id: Uuid, progress: u8, status: TaskStatus) {
        let progress = progress.min(100);
        {
            let mut tasks = write_lock(&self.tasks);
            let Some(task) = tasks.get_mut(&id) else {
                debug!(task = %id, "update for unknown task ignored");
                return;
            };
            task.progress = progress;
            task.status = status;
        }
        self.events.emit(EngineEvent::TaskProgress {
            task: id,
            progress,
            status,
        });
    }

    /// Drop a task record. Unknown ids are ignored.
    pub fn delete_task(&self, id: Uuid) {
        write_lock(&self.tasks).remove(&id);
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        read_lock(&self.tasks).get(&id).copied()
    }

    pub fn tasks(&self) -> Vec<Task> {
        read_lock(&self.tasks).values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TaskTracker {
        TaskTracker::new(EventBus::new())
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let tracker = tracker();
        let task = tracker.create_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);

        tracker.update_task(task.id, 40, TaskStatus::InProgress);
        let updated = tracker.task(task.id).unwrap();
        assert_eq!(updated.progress, 40);
        assert_eq!(updated.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_noop() {
        let tracker = tracker();
        tracker.update_task(Uuid::new_v4(), 50, TaskStatus::InProgress);
        assert!(tracker.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_progress_clamped_to_100() {
        let tracker = tracker();
        let task = tracker.create_task();
        tracker.update_task(task.id, 250, TaskStatus::InProgress);
        assert_eq!(tracker.task(task.id).unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let tracker = TaskTracker::new(bus);

        let task = tracker.create_task();
        tracker.update_task(task.id, 100, TaskStatus::Completed);

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::TaskProgress {
                task: task.id,
                progress: 0,
                status: TaskStatus::Pending,
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::TaskProgress {
                task: task.id,
                progress: 100,
                status: TaskStatus::Completed,
            }
        );
    }

    #[tokio::test]
    async fn test_delete_task() {
        let tracker = tracker();
        let task = tracker.create_task();
        tracker.delete_task(task.id);
        assert!(tracker.task(task.id).is_none());

        // Racing update after deletion is benign.
        tracker.update_task(task.id, 80, TaskStatus::InProgress);
        assert!(tracker.task(task.id).is_none());
    }
}
