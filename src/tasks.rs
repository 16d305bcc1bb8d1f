use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Detached best-effort jobs (image fetches, rebalance requests).
///
/// Failures and panics end up in the log and never reach the caller. Jobs
/// keep running when the set is dropped; [`BackgroundTasks::join_all`] lets
/// callers wait for them instead.
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a job on the current tokio runtime.
    pub fn spawn<F, E>(&mut self, name: &str, job: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            match job.await {
                Ok(()) => debug!(task = %task_name, "Background task finished"),
                Err(e) => error!(task = %task_name, "Background task failed: {}", e),
            }
        });
        self.handles.retain(|(_, h)| !h.is_finished());
        self.handles.push((name.to_string(), handle));
    }

    /// Jobs that have not finished yet.
    pub fn pending(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Wait for every spawned job. Returns how many completed without panicking.
    pub async fn join_all(&mut self) -> usize {
        let mut completed = 0;
        for (name, handle) in self.handles.drain(..) {
            match handle.await {
                Ok(()) => completed += 1,
                Err(e) => error!(task = %name, "Background task panicked: {}", e),
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn failures_are_swallowed() {
        let mut tasks = BackgroundTasks::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        tasks.spawn("ok", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        tasks.spawn("fails", async { Err::<(), String>("network down".to_string()) });

        assert_eq!(tasks.join_all().await, 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let mut tasks = BackgroundTasks::new();
        tasks.spawn("panics", async {
            if true {
                panic!("bad job");
            }
            Ok::<(), String>(())
        });
        tasks.spawn("ok", async { Ok::<(), String>(()) });
        assert_eq!(tasks.join_all().await, 1);
    }
}
