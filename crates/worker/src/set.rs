//! Supervised long-running tasks.
//!
//! [`WorkerSet`] spawns each loop on the runtime together with a small
//! supervisor that awaits it. A panic in any worker is logged, written to the
//! dead-letter queue and cancels the shared token so every sibling winds
//! down. Under [`PanicPolicy::Exit`] the process then terminates with a
//! non-zero status.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agora_events::dlq::{record_or_log, DeadLetterQueue, DlqMessage};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// Exit status used after a worker panic.
pub const PANIC_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicPolicy {
    /// Cancel the set and terminate the process.
    Exit,
    /// Cancel the set and report the panic from [`WorkerSet::shutdown`].
    Cancel,
}

pub struct WorkerSet {
    cancel: CancellationToken,
    dead_letters: Arc<dyn DeadLetterQueue>,
    policy: PanicPolicy,
    workers: Vec<Supervised>,
}

struct Supervised {
    name: String,
    supervisor: JoinHandle<Result<(), WorkerError>>,
    /// Aborts the worker itself, not its supervisor.
    worker: AbortHandle,
}

impl WorkerSet {
    pub fn new(
        cancel: CancellationToken,
        dead_letters: Arc<dyn DeadLetterQueue>,
        policy: PanicPolicy,
    ) -> Self {
        Self {
            cancel,
            dead_letters,
            policy,
            workers: Vec::new(),
        }
    }

    /// The token every worker in the set should stop on.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Spawn `worker` under the panic barrier.
    pub fn spawn<F>(&mut self, name: &str, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = tokio::spawn(worker);
        let abort = inner.abort_handle();
        let supervisor = tokio::spawn(supervise(
            name.to_string(),
            inner,
            self.cancel.clone(),
            Arc::clone(&self.dead_letters),
            self.policy,
        ));
        tracing::debug!(worker = name, "Worker spawned");
        self.workers.push(Supervised {
            name: name.to_string(),
            supervisor,
            worker: abort,
        });
    }

    /// Cancel every worker and wait up to `grace` for each to finish.
    ///
    /// A worker still running after `grace` is aborted. Returns the first
    /// panic or timeout encountered.
    pub async fn shutdown(self, grace: Duration) -> Result<(), WorkerError> {
        self.cancel.cancel();
        let mut first_error = None;
        for Supervised {
            name,
            mut supervisor,
            worker,
        } in self.workers
        {
            let result = match tokio::time::timeout(grace, &mut supervisor).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(WorkerError::Panicked {
                    name: name.clone(),
                    message: e.to_string(),
                }),
                Err(_) => {
                    tracing::warn!(worker = %name, "Worker did not stop in time, aborting");
                    worker.abort();
                    if tokio::time::timeout(grace, &mut supervisor).await.is_err() {
                        supervisor.abort();
                    }
                    Err(WorkerError::ShutdownTimeout(name.clone()))
                }
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn supervise(
    name: String,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    dead_letters: Arc<dyn DeadLetterQueue>,
    policy: PanicPolicy,
) -> Result<(), WorkerError> {
    match handle.await {
        Ok(()) => {
            tracing::debug!(worker = %name, "Worker exited");
            Ok(())
        }
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            tracing::error!(worker = %name, panic = %message, "Worker panicked, stopping all workers");
            let record = DlqMessage::new(format!("worker {name} panicked: {message}"));
            record_or_log(dead_letters.as_ref(), &record).await;
            cancel.cancel();
            if policy == PanicPolicy::Exit {
                tracing::error!(code = PANIC_EXIT_CODE, "Exiting after worker panic");
                std::process::exit(PANIC_EXIT_CODE);
            }
            Err(WorkerError::Panicked { name, message })
        }
        Err(_) => {
            tracing::debug!(worker = %name, "Worker aborted");
            Ok(())
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
