// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of Arbor.
//
// Arbor is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Arbor is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Arbor. If not, see <https://www.gnu.org/licenses/>.

//! Supervised worker pool for background jobs.
//!
//! ## Purpose
//! Background work (dataset poll loops) runs here instead of on detached
//! tasks: concurrency is bounded, panics are caught and reported, and every
//! job hands back a [`TaskHandle`] that resolves to its [`TaskOutcome`].
//!
//! ## Shutdown
//! [`WorkerPool::drain`] waits for every job spawned so far, including jobs
//! spawned while draining.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::GatewayResult;

/// How a pooled job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    Panicked(String),
    /// The supervising task vanished before reporting
    Cancelled,
}

/// Observer for one pooled job.
#[derive(Clone)]
pub struct TaskHandle {
    name: String,
    outcome: watch::Receiver<Option<TaskOutcome>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outcome if the job has already finished.
    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(&self) -> TaskOutcome {
        let mut outcome = self.outcome.clone();
        loop {
            if let Some(done) = outcome.borrow_and_update().clone() {
                return done;
            }
            if outcome.changed().await.is_err() {
                return outcome.borrow().clone().unwrap_or(TaskOutcome::Cancelled);
            }
        }
    }
}

/// Counters exposed for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub panicked: usize,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
}

#[derive(Clone)]
pub struct WorkerPool {
    name: String,
    permits: Arc<Semaphore>,
    supervisors: Arc<Mutex<Vec<JoinHandle<()>>>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        Self {
            name: name.into(),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            supervisors: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue `job`; it starts once a permit is free.
    pub async fn spawn<F>(&self, name: impl Into<String>, job: F) -> TaskHandle
    where
        F: Future<Output = GatewayResult<()>> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = watch::channel(None);
        let permits = self.permits.clone();
        let counters = self.counters.clone();
        let pool = self.name.clone();
        let job_name = name.clone();
        let job: BoxFuture<'static, GatewayResult<()>> = Box::pin(job);

        let supervisor = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = tx.send(Some(TaskOutcome::Cancelled));
                    return;
                }
            };
            counters.active.fetch_add(1, Ordering::SeqCst);
            let outcome = match tokio::spawn(job).await {
                Ok(Ok(())) => {
                    counters.completed.fetch_add(1, Ordering::SeqCst);
                    TaskOutcome::Completed
                }
                Ok(Err(e)) => {
                    warn!(pool = %pool, job = %job_name, error = %e, "[POOL] job failed");
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    TaskOutcome::Failed(e.to_string())
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(pool = %pool, job = %job_name, "[POOL] job panicked");
                    counters.panicked.fetch_add(1, Ordering::SeqCst);
                    TaskOutcome::Panicked(panic_message(join_error))
                }
                Err(_) => TaskOutcome::Cancelled,
            };
            counters.active.fetch_sub(1, Ordering::SeqCst);
            debug!(pool = %pool, job = %job_name, outcome = ?outcome, "[POOL] job finished");
            let _ = tx.send(Some(outcome));
        });

        self.supervisors.lock().await.push(supervisor);
        TaskHandle { name, outcome: rx }
    }

    /// Wait until every job spawned so far has finished.
    pub async fn drain(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.supervisors.lock().await);
            if pending.is_empty() {
                return;
            }
            for supervisor in pending {
                if let Err(e) = supervisor.await {
                    warn!(pool = %self.name, error = %e, "[POOL] supervisor ended abnormally");
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.counters.active.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            panicked: self.counters.panicked.load(Ordering::SeqCst),
        }
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_outcomes_are_observable() {
        let pool = WorkerPool::new("test", 2);
        let ok = pool.spawn("ok", async { Ok(()) }).await;
        let failed = pool
            .spawn("failed", async { Err(GatewayError::Upstream("remote down".to_string())) })
            .await;
        let panicked = pool
            .spawn("panicked", async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await;

        assert_eq!(ok.wait().await, TaskOutcome::Completed);
        assert!(matches!(failed.wait().await, TaskOutcome::Failed(msg) if msg.contains("remote down")));
        assert_eq!(panicked.wait().await, TaskOutcome::Panicked("boom".to_string()));

        pool.drain().await;
        let stats = pool.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new("bounded", 1);
        let peak = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        for i in 0..4 {
            let peak = peak.clone();
            let running = running.clone();
            pool.spawn(format!("job-{i}"), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        }
        pool.drain().await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().completed, 4);
    }
}
