// Copyright 2024 The farcall contributors
// This file is part of the farcall library.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:

// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::trace;

/// The process-unique identity of an [`ExecutionContext`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

type Job = BoxFuture<'static, ()>;

/// A serial FIFO worker: the unit of serialisation for one service.
///
/// Jobs submitted via [`dispatch`](Self::dispatch) run strictly in submission
/// order on one spawned task; a job that blocks forever blocks the context.
/// Parallelism across contexts is unconstrained.
pub struct ExecutionContext {
    id: ContextId,
    label: String,
    jobs: mpsc::UnboundedSender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionContext {
    /// Initializes a new context and spawns its worker.
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        let label = label.into();
        let id = ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let (jobs, mut receiver) = mpsc::unbounded_channel::<Job>();

        let worker = {
            let label = label.clone();
            tokio::spawn(async move {
                while let Some(job) = receiver.recv().await {
                    job.await;
                }
                trace!("the execution context '{label}' has drained and stopped");
            })
        };

        Arc::new(Self { id, label, jobs, worker: Mutex::new(Some(worker)) })
    }

    /// Returns the context's process-unique id.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the context's diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Submits a job to run after every previously submitted job completes.
    /// Returns `false` if the context has shut down.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.jobs.send(Box::pin(job)).is_ok()
    }

    /// Stops the worker without draining pending jobs.
    pub fn shut_down(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext").field("id", &self.id).field("label", &self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn jobs_run_serially_in_submission_order() {
        let context = ExecutionContext::new("test");
        let (sender, mut receiver) = mpsc::unbounded_channel();

        for i in 0..10u32 {
            let sender = sender.clone();
            context.dispatch(async move {
                // A sleep inverts completion order unless jobs are serialised.
                tokio::time::sleep(Duration::from_millis(10u64.saturating_sub(i as u64))).await;
                sender.send(i).unwrap();
            });
        }

        for i in 0..10u32 {
            assert_eq!(receiver.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let a = ExecutionContext::new("a");
        let b = ExecutionContext::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_rejected() {
        let context = ExecutionContext::new("test");
        context.shut_down();
        // The worker is gone; give the abort a beat to land, then the sender
        // observes the closed channel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!context.dispatch(async {}));
    }
}
