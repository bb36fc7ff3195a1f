use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use anyhow::Context;
use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of threads running control handlers.
///
/// Every job carries a key and jobs with the same key always run on the same
/// worker, so the handlers of one connection execute in submission order while
/// different connections proceed in parallel.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

#[derive(Debug)]
struct Worker {
    tx: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> anyhow::Result<WorkerPool> {
        anyhow::ensure!(size > 0, "worker pool needs at least one thread");
        let workers = (0..size)
            .map(|index| -> anyhow::Result<Worker> {
                let (tx, rx) = mpsc::channel::<Job>();
                let thread = thread::Builder::new()
                    .name(format!("control-{index}"))
                    .spawn(move || {
                        for job in rx {
                            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                                error!(
                                    worker = index,
                                    "control handler panicked: {}",
                                    panic_message(&panic)
                                );
                            }
                        }
                        trace!(worker = index, "worker stopped");
                    })
                    .context("could not spawn control worker")?;
                Ok(Worker {
                    tx: Some(tx),
                    thread: Some(thread),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(WorkerPool { workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` on the worker owning `key`. Returns `false` if the pool is
    /// shutting down.
    pub fn execute(&self, key: u64, job: impl FnOnce() + Send + 'static) -> bool {
        let worker = &self.workers[(key % self.workers.len() as u64) as usize];
        match &worker.tx {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.tx.take();
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
