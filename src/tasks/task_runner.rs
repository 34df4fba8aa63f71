use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinHandle;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Collects the long-running background tasks and spawns them together.
pub struct TaskRunner {
    tasks: Vec<(&'static str, BoxedTask)>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn add_task<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, Box::pin(task)));
    }

    pub fn start_all(self) -> RunningTasks {
        let handles = self
            .tasks
            .into_iter()
            .map(|(name, task)| {
                tracing::debug!("Starting task {}", name);
                (name, tokio::spawn(task))
            })
            .collect();
        RunningTasks { handles }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunningTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl RunningTasks {
    /// Waits for the named task and removes it from the set.
    pub async fn join(&mut self, name: &str) {
        let Some(index) = self.handles.iter().position(|(n, _)| *n == name) else {
            return;
        };
        let (name, handle) = self.handles.remove(index);
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                tracing::error!("Task {} failed: {:?}", name, e);
            }
        }
    }

    /// Aborts whatever is still running.
    pub fn abort_all(self) {
        for (name, handle) in self.handles {
            tracing::debug!("Aborting task {}", name);
            handle.abort();
        }
    }
}
