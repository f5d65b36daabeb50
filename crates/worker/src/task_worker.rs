//! The consumer loop shared by every task-event worker.

use agora_events::bus::Subscription;
use agora_events::event::{BusMessage, TaskEvent};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// Something that reacts to published task events.
#[async_trait]
pub trait TaskWorker: Send + Sync {
    /// Used in logs and as the bus subscriber name.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &TaskEvent) -> Result<(), WorkerError>;
}

/// Feed task events from `subscription` to `worker`.
///
/// Returns when `cancel` fires or the bus closes. A failing `handle` is
/// logged and the loop moves on to the next event.
pub async fn run_task_worker<W>(worker: W, mut subscription: Subscription, cancel: CancellationToken)
where
    W: TaskWorker,
{
    tracing::info!(worker = worker.name(), "Task worker started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = subscription.recv() => match message {
                Some(BusMessage::Task(event)) => {
                    if let Err(e) = worker.handle(&event).await {
                        tracing::error!(
                            worker = worker.name(),
                            task = %event.task_name(),
                            path = %event.path,
                            error = %e,
                            "Task worker failed to handle event"
                        );
                    }
                }
                Some(_) => {}
                None => {
                    tracing::info!(worker = worker.name(), "Event bus closed");
                    break;
                }
            },
        }
    }
    tracing::info!(worker = worker.name(), "Task worker stopped");
}
