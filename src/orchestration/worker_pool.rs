//! # Worker Pool
//!
//! Fixed number of tokio workers draining one bounded job queue. Submission,
//! initialization and processing jobs share the pool without priority.
//!
//! A job that panics is logged and counted; the worker that ran it keeps
//! serving. `shutdown_now` aborts the workers, which drops queued jobs and
//! interrupts running ones at their next await point.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{BatchError, BatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Submission,
    Initialization,
    Processing,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission => write!(f, "submission"),
            Self::Initialization => write!(f, "initialization"),
            Self::Processing => write!(f, "processing"),
        }
    }
}

struct Job {
    kind: JobKind,
    future: BoxFuture<'static, ()>,
}

#[derive(Debug, Default)]
struct PoolCounters {
    active: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queued_jobs: usize,
    pub active_jobs: usize,
    pub completed_jobs: u64,
    pub panicked_jobs: u64,
}

pub struct WorkerPool {
    name: String,
    size: usize,
    queue_capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    counters: Arc<PoolCounters>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("running", &self.is_running())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime
    pub fn start(name: impl Into<String>, size: usize, queue_capacity: usize) -> Self {
        let name = name.into();
        let size = size.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(PoolCounters::default());

        let workers = (0..size)
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                let counters = Arc::clone(&counters);
                let worker_name = format!("{name} {}", index + 1);
                tokio::spawn(Self::worker_loop(worker_name, receiver, counters))
            })
            .collect();

        info!(pool = %name, workers = size, queue_capacity = queue_capacity, "Worker pool started");

        Self {
            name,
            size,
            queue_capacity,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            running: AtomicBool::new(true),
            counters,
        }
    }

    async fn worker_loop(
        worker_name: String,
        receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
        counters: Arc<PoolCounters>,
    ) {
        loop {
            let job = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(job) = job else {
                debug!(worker = %worker_name, "Job queue closed, worker exiting");
                break;
            };

            counters.active.fetch_add(1, Ordering::AcqRel);
            let result = AssertUnwindSafe(job.future).catch_unwind().await;
            counters.active.fetch_sub(1, Ordering::AcqRel);
            counters.completed.fetch_add(1, Ordering::Relaxed);

            if let Err(panic) = result {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = %worker_name,
                    job_kind = %job.kind,
                    panic_message = %panic_message(panic.as_ref()),
                    "Job panicked"
                );
            }
        }
    }

    /// Queue a job, waiting for queue space when the pool is saturated
    pub async fn execute<F>(&self, kind: JobKind, future: F) -> BatchResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| BatchError::PoolShutdown(self.name.clone()))?;

        sender
            .send(Job {
                kind,
                future: future.boxed(),
            })
            .await
            .map_err(|_| BatchError::PoolShutdown(self.name.clone()))
    }

    /// Stop immediately: queued jobs are discarded, running jobs are aborted
    pub fn shutdown_now(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.sender.lock().take();
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.abort();
        }
        info!(pool = %self.name, "Worker pool shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let queued_jobs = self
            .sender
            .lock()
            .as_ref()
            .map(|sender| self.queue_capacity - sender.capacity())
            .unwrap_or(0);
        WorkerPoolStats {
            workers: self.size,
            queue_capacity: self.queue_capacity,
            queued_jobs,
            active_jobs: self.counters.active.load(Ordering::Acquire),
            completed_jobs: self.counters.completed.load(Ordering::Relaxed),
            panicked_jobs: self.counters.panicked.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
