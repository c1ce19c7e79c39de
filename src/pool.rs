use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, warn};

use crate::partition::{partition, Indices, WorkShard};
use crate::HaloError;

/// Result of one shard's task.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub worker_id: usize,
    pub result: Result<T, HaloError>,
}

/// Fans a striped index set out to one thread per shard and waits for all of them.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, HaloError> {
        if workers == 0 {
            return Err(HaloError::InvalidArgument("worker pool needs at least one worker".to_string()));
        }
        Ok(WorkerPool { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Partition `indices`, run `task` once per shard, and return every outcome
    /// ordered by worker id. Returns only after all tasks have finished. A panicking
    /// task is reported as that task's [`HaloError::Worker`].
    pub fn run<I, T, F>(&self, indices: I, task: F) -> Result<Vec<TaskOutcome<T>>, HaloError>
    where
        I: Into<Indices>,
        T: Send,
        F: Fn(&WorkShard) -> Result<T, HaloError> + Sync,
    {
        let shards = partition(indices, self.workers)?;
        Ok(run_shards(&shards, &task))
    }
}

fn run_shards<T, F>(shards: &[WorkShard], task: &F) -> Vec<TaskOutcome<T>>
where
    T: Send,
    F: Fn(&WorkShard) -> Result<T, HaloError> + Sync,
{
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::scope(|scope| {
        for shard in shards {
            let tx = tx.clone();
            scope.spawn(move || {
                debug!(worker_id = shard.worker_id, indices = ?shard.indices, "worker started");
                let result = panic::catch_unwind(AssertUnwindSafe(|| task(shard))).unwrap_or_else(|payload| {
                    Err(HaloError::Worker {
                        worker_id: shard.worker_id,
                        message: panic_message(payload.as_ref()),
                    })
                });
                if let Err(e) = &result {
                    warn!(worker_id = shard.worker_id, error = %e, "worker failed");
                }
                // The receiver outlives the scope, so this cannot fail.
                let _ = tx.send(TaskOutcome {
                    worker_id: shard.worker_id,
                    result,
                });
            });
        }
    });
    drop(tx);

    let mut outcomes: Vec<TaskOutcome<T>> = rx.iter().collect();
    outcomes.sort_by_key(|o| o.worker_id);
    outcomes
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
