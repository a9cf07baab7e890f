//! Generic bounded worker pool.
//!
//! Jobs are fed through a bounded channel to a fixed number of scoped worker
//! threads; results come back on a second channel in completion order.

use crossbeam_channel::bounded;
use std::thread;

pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every job. Each job is processed exactly once; the
    /// result order is not the submission order.
    pub fn run<J, R, F>(&self, jobs: Vec<J>, work: F) -> Vec<R>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> R + Sync,
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.workers.min(total);
        let (job_tx, job_rx) = bounded::<J>(workers);
        let (result_tx, result_rx) = bounded::<R>(workers);
        let work = &work;

        thread::scope(|scope| {
            for id in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    log::debug!("Worker {} started", id);
                    for job in job_rx.iter() {
                        if result_tx.send(work(job)).is_err() {
                            break;
                        }
                    }
                    log::debug!("Worker {} finished", id);
                });
            }
            drop(job_rx);
            drop(result_tx);

            scope.spawn(move || {
                for job in jobs {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            result_rx.iter().collect()
        })
    }
}
