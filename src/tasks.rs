use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::{Progress, Report, Task, TaskStatus};

/// Process-wide task-id → Task mapping.
///
/// Each running task is written only by its owning scan worker; readers get a
/// cloned snapshot of the whole record, never a half-updated progress block.
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh task in the running state.
    pub async fn create(&self, task_id: &str) {
        let task = Task {
            status: TaskStatus::Running,
            result: None,
            progress: Progress {
                percent: 0,
                log: "初始化审计引擎".to_string(),
            },
            error: None,
        };
        self.inner.write().await.insert(task_id.to_string(), task);
    }

    pub async fn update_progress(&self, task_id: &str, percent: u8, log: impl Into<String>) {
        let mut guard = self.inner.write().await;
        if let Some(task) = guard.get_mut(task_id) {
            task.progress = Progress {
                percent,
                log: log.into(),
            };
        }
    }

    /// Terminal transition: running → completed.
    pub async fn complete(&self, task_id: &str, report: Report) {
        let mut guard = self.inner.write().await;
        if let Some(task) = guard.get_mut(task_id) {
            task.status = TaskStatus::Completed;
            task.result = Some(report);
            task.progress = Progress {
                percent: 100,
                log: "审计完成".to_string(),
            };
            task.error = None;
        }
    }

    /// Terminal transition: running → failed. The task id stays queryable.
    pub async fn fail(&self, task_id: &str, error: impl Into<String>) {
        let mut guard = self.inner.write().await;
        if let Some(task) = guard.get_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.error = Some(error.into());
        }
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.read().await.get(task_id).cloned()
    }
}
