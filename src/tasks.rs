//! Fire-and-forget background work.
//!
//! Cache population after a response has already been returned (insert,
//! full refetch after a partial response) runs here. The foreground path
//! never awaits these tasks; their outcome is only logged and counted, and
//! [`BackgroundTasks::settle`] lets tests and shutdown wait for them.

use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TaskStats {
    completed: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    stats: Arc<TaskStats>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lanza una tarea desacoplada. Su error se registra y nunca llega al llamador.
    pub fn spawn<F, E>(&self, name: &'static str, key: impl Into<String>, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let stats = self.stats.clone();
        let key = key.into();

        self.tracker.spawn(async move {
            match task.await {
                Ok(()) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    debug!("✅ Tarea '{}' completada: {}", name, key);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️ Tarea '{}' falló para {}: {}", name, key, e);
                    *stats.last_error.lock() = Some(format!("{}: {}", name, e));
                }
            }
        })
    }

    /// Espera a que terminen todas las tareas lanzadas hasta ahora.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            running: self.tracker.len(),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            last_error: self.stats.last_error.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let tasks = BackgroundTasks::new();

        tasks.spawn("insert", "a", async { Ok::<(), String>(()) });
        tasks.spawn("insert", "b", async { Err::<(), _>("disk full".to_string()) });
        tasks.settle().await;

        assert_eq!(
            tasks.snapshot(),
            TaskSnapshot {
                running: 0,
                completed: 1,
                failed: 1,
                last_error: Some("insert: disk full".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_tracker_accepts_work_after_settle() {
        let tasks = BackgroundTasks::new();
        tasks.settle().await;

        tasks.spawn("refetch", "c", async { Ok::<(), String>(()) });
        tasks.settle().await;
        assert_eq!(tasks.snapshot().completed, 1);
    }
}
