//! Bounded worker pool with submission-ordered results
//!
//! A fixed number of workers pull from one shared queue whose capacity equals
//! the worker count, so [`TaskScheduler::submit`] suspends once every worker
//! is busy and the queue is full. Task functions report their outcome as a
//! `Result`; an `Err` is recorded on the task and the worker moves on. A panic
//! is not recorded: the remaining workers are aborted and the panic is resumed
//! on whoever joins the scheduler.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::types::{Task, TaskHandle, TaskId, TaskReport};
use crate::error::{IngestError, Result, TaskError};

struct Queued<P> {
    id: TaskId,
    payload: P,
}

type SharedReceiver<P> = Arc<AsyncMutex<mpsc::Receiver<Queued<P>>>>;
type Completed<T> = Arc<Mutex<Vec<Task<T>>>>;

/// Worker pool executing one task function over submitted payloads
pub struct TaskScheduler<P, T> {
    name: &'static str,
    sender: mpsc::Sender<Queued<P>>,
    workers: JoinSet<()>,
    completed: Completed<T>,
    next_id: u64,
    cancel: CancellationToken,
}

impl<P, T> TaskScheduler<P, T>
where
    P: Send + 'static,
    T: Send + 'static,
{
    /// Spawn `workers` workers running `func`.
    ///
    /// Once `cancel` fires, submissions are refused and queued tasks that have
    /// not started are marked failed with [`TaskError::Cancelled`]. Running
    /// tasks are never interrupted.
    pub fn start<F, Fut>(
        name: &'static str,
        workers: usize,
        cancel: CancellationToken,
        func: F,
    ) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, TaskError>> + Send + 'static,
    {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(workers);
        let receiver: SharedReceiver<P> = Arc::new(AsyncMutex::new(receiver));
        let completed: Completed<T> = Arc::new(Mutex::new(Vec::new()));
        let func = Arc::new(func);

        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(run_worker(
                name,
                worker,
                receiver.clone(),
                func.clone(),
                completed.clone(),
                cancel.clone(),
            ));
        }

        debug!(scheduler = name, workers, "Task scheduler started");

        Self {
            name,
            sender,
            workers: set,
            completed,
            next_id: 0,
            cancel,
        }
    }

    /// Queue a payload, waiting while the queue is full.
    ///
    /// The task id is assigned only once a queue slot is secured, so a
    /// submission abandoned while waiting leaves no gap in the ids.
    pub async fn submit(&mut self, payload: P) -> Result<TaskHandle> {
        let reserved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
            reserved = self.sender.reserve() => reserved,
        };

        match reserved {
            Ok(permit) => {
                let id = TaskId(self.next_id);
                self.next_id += 1;
                permit.send(Queued { id, payload });
                Ok(TaskHandle::new(id))
            },
            Err(_) => {
                // Workers only exit early by panicking
                reap_workers(self.name, &mut self.workers).await;
                Err(IngestError::SchedulerClosed(self.name))
            },
        }
    }

    /// Number of tasks submitted so far
    pub fn submitted(&self) -> usize {
        self.next_id as usize
    }

    /// Close the queue and wait until every submitted task is terminal.
    pub async fn join(mut self) -> TaskReport<T> {
        drop(self.sender);
        reap_workers(self.name, &mut self.workers).await;

        let tasks = std::mem::take(
            &mut *self.completed.lock().unwrap_or_else(PoisonError::into_inner),
        );
        debug!(scheduler = self.name, tasks = tasks.len(), "Task scheduler drained");
        TaskReport::new(tasks)
    }
}

async fn reap_workers(name: &'static str, workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(()) => {},
            Err(err) if err.is_panic() => {
                error!(scheduler = name, "Worker panicked, aborting remaining workers");
                workers.abort_all();
                std::panic::resume_unwind(err.into_panic());
            },
            Err(err) => {
                warn!(scheduler = name, error = %err, "Worker cancelled");
            },
        }
    }
}

async fn run_worker<P, T, F, Fut>(
    name: &'static str,
    worker: usize,
    receiver: SharedReceiver<P>,
    func: Arc<F>,
    completed: Completed<T>,
    cancel: CancellationToken,
) where
    F: Fn(P) -> Fut,
    Fut: Future<Output = std::result::Result<T, TaskError>>,
{
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(Queued { id, payload }) = next else {
            break;
        };

        let mut task = Task::pending(id);
        if cancel.is_cancelled() {
            debug!(scheduler = name, worker, task_id = %id, "Skipping task after cancellation");
            task.finish(Err(TaskError::Cancelled));
        } else {
            task.start();
            let started = Instant::now();
            debug!(scheduler = name, worker, task_id = %id, "Task started");

            let outcome = func(payload).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                Ok(_) => debug!(scheduler = name, worker, task_id = %id, duration_ms, "Task done"),
                Err(err) => warn!(
                    scheduler = name,
                    worker,
                    task_id = %id,
                    duration_ms,
                    error = %err,
                    "Task failed"
                ),
            }
            task.finish(outcome);
        }

        completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::types::TaskStatus;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_submission_order() {
        let mut scheduler = TaskScheduler::start("order", 4, CancellationToken::new(), |n: u64| async move {
            // Completion order differs from submission order
            tokio::time::sleep(Duration::from_millis((20 - n) * 13 % 97)).await;
            Ok(n * 10)
        });

        for n in 0..20 {
            scheduler.submit(n).await.unwrap();
        }

        let report = scheduler.join().await;
        assert_eq!(report.into_results(), (0..20).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_worker() {
        let mut scheduler = TaskScheduler::start("errors", 1, CancellationToken::new(), |n: u32| async move {
            if n == 1 {
                Err(TaskError::Failed(format!("task {n} rejected")))
            } else {
                Ok(n)
            }
        });

        for n in 0..3 {
            scheduler.submit(n).await.unwrap();
        }

        let report = scheduler.join().await;
        assert_eq!(report.results(false), vec![Some(&0), None, Some(&2)]);
        assert_eq!(report.results(true), vec![Some(&0), Some(&2)]);

        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, TaskId(1));
        assert_eq!(failed[0].status, TaskStatus::Failed);
        assert!(failed[0].started_at.is_some() && failed[0].finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_blocks_when_pool_and_queue_are_full() {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();

        let task_gate = gate.clone();
        let mut scheduler = TaskScheduler::start("backpressure", 2, CancellationToken::new(), move |n: u32| {
            let gate = task_gate.clone();
            let started = started_tx.clone();
            async move {
                let _ = started.send(n);
                let _permit = gate.acquire().await.map_err(|e| TaskError::Failed(e.to_string()))?;
                Ok::<_, TaskError>(n)
            }
        });

        // Two running tasks occupy both workers
        scheduler.submit(0).await.unwrap();
        scheduler.submit(1).await.unwrap();
        started_rx.recv().await.unwrap();
        started_rx.recv().await.unwrap();

        // Two more fill the queue
        for n in 2..4 {
            tokio::time::timeout(Duration::from_secs(1), scheduler.submit(n))
                .await
                .expect("queue has room")
                .unwrap();
        }

        // The next one has nowhere to go
        let blocked = tokio::time::timeout(Duration::from_secs(5), scheduler.submit(4)).await;
        assert!(blocked.is_err(), "submission should wait for a free slot");

        gate.add_permits(1);
        tokio::time::timeout(Duration::from_secs(5), scheduler.submit(4))
            .await
            .expect("slot freed by finished task")
            .unwrap();

        gate.add_permits(16);
        let report = scheduler.join().await;
        assert_eq!(report.into_results(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_cancellation_refuses_and_skips_queued_tasks() {
        let cancel = CancellationToken::new();
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();

        let task_gate = gate.clone();
        let mut scheduler = TaskScheduler::start("cancel", 1, cancel.clone(), move |n: u32| {
            let gate = task_gate.clone();
            let started = started_tx.clone();
            async move {
                let _ = started.send(n);
                let _permit = gate.acquire().await.map_err(|e| TaskError::Failed(e.to_string()))?;
                Ok::<_, TaskError>(n)
            }
        });

        scheduler.submit(0).await.unwrap();
        started_rx.recv().await.unwrap();
        scheduler.submit(1).await.unwrap();

        cancel.cancel();
        assert!(matches!(scheduler.submit(2).await, Err(IngestError::Cancelled)));

        gate.add_permits(1);
        let report = scheduler.join().await;

        assert_eq!(report.len(), 2);
        assert_eq!(report.tasks()[0].result, Some(0));
        assert_eq!(report.tasks()[1].error, Some(TaskError::Cancelled));
        assert!(report.tasks()[1].started_at.is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "corrupt payload")]
    async fn test_panic_in_task_is_resumed_on_join() {
        let mut scheduler = TaskScheduler::start("panics", 2, CancellationToken::new(), |n: u32| async move {
            if n == 3 {
                panic!("corrupt payload");
            }
            Ok(n)
        });

        for n in 0..6 {
            if scheduler.submit(n).await.is_err() {
                break;
            }
        }
        let _ = scheduler.join().await;
    }
}
