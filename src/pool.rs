use std::future::Future;

use tokio::task::JoinHandle;

/// A fixed-size pool of worker tasks. `worker_fn` is called once per slot to
/// produce that worker's future; workers decide for themselves when to exit
/// (shutdown signal or closed input queue). Crashed workers are not restarted.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<F, Fut>(size: u32, worker_fn: F) -> Self
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handles = (0..size).map(|id| tokio::spawn(worker_fn(id))).collect();
        Self { handles }
    }

    /// Block until every worker has exited.
    pub async fn stop(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn runs_the_requested_number_of_workers() {
        let started = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::spawn(4, |_worker_id| {
            let started = Arc::clone(&started);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
            }
        });
        pool.stop().await;
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stop_waits_for_shutdown_signal() {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let exited = Arc::new(AtomicU32::new(0));

        let pool = WorkerPool::spawn(3, |_worker_id| {
            let mut shutdown = shutdown_tx.subscribe();
            let exited = Arc::clone(&exited);
            async move {
                let _ = shutdown.recv().await;
                exited.fetch_add(1, Ordering::SeqCst);
            }
        });

        shutdown_tx.send(()).unwrap();
        pool.stop().await;
        assert_eq!(exited.load(Ordering::SeqCst), 3);
    }
}
