// ABOUTME: Bounded-latency FIFO work queue drained by a fixed pool of worker tasks
// ABOUTME: The async analogue of spec.md §4.C's thread-pool-backed IO runtime, permitted by spec.md §5

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A thread-safe FIFO of closures. `post` enqueues; a fixed pool of worker
/// tasks spawned by `spawn_workers` dequeue and run them, so the thread (or
/// task) that accepts a connection never itself blocks running user code
/// (spec.md §4.C).
pub struct IoRuntime {
    sender: mpsc::UnboundedSender<Task>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl IoRuntime {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            stop: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a unit of work. Silently dropped if every worker has already
    /// exited (the queue's receiving end is gone).
    pub fn post<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _ = self.sender.send(Box::pin(task));
    }

    /// Spawn `worker_count` tasks, each repeatedly dequeuing and running
    /// queued work until `stop()` is called.
    pub fn spawn_workers(&self, worker_count: usize) -> Vec<JoinHandle<()>> {
        (0..worker_count)
            .map(|_| {
                let receiver = self.receiver.clone();
                let stop = self.stop.clone();
                let stopped = self.stopped.clone();
                tokio::spawn(async move { worker_loop(receiver, stop, stopped).await })
            })
            .collect()
    }

    /// Stop all workers. Idempotent and safe to call from any task.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop.notify_waiters();
        }
    }
}

impl Default for IoRuntime {
    fn default() -> Self {
        Self::new()
    }
}

async fn worker_loop(
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
) {
    loop {
        // Register for the stop notification before checking the flag so a
        // `stop()` that lands between the check and the `select!` below is
        // never missed.
        let notified = stop.notified();
        if stopped.load(Ordering::Acquire) {
            break;
        }

        let task = {
            let mut guard = receiver.lock().await;
            tokio::select! {
                _ = notified => None,
                maybe_task = guard.recv() => maybe_task,
            }
        };

        match task {
            Some(task) => task.await,
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn workers_drain_posted_tasks() {
        let runtime = IoRuntime::new();
        let handles = runtime.spawn_workers(2);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            runtime.post(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Give workers a moment to drain; then stop and join.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        runtime.stop();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let runtime = IoRuntime::new();
        let handles = runtime.spawn_workers(1);
        runtime.stop();
        runtime.stop();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
