use crate::domain::messages::Delivery;
use crate::domain::ports::WorkQueueRef;
use crate::error::{Result, TicketingError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Processes one queued message at a time.
#[async_trait]
pub trait MessageHandler<M>: Send + Sync {
    /// Handles a delivery. Returning `Ok` acknowledges it; a retryable error
    /// redelivers it.
    async fn handle(&self, delivery: &Delivery<M>) -> Result<()>;

    /// Called once before a message is dead-lettered, to record the failure
    /// and compensate any partial effect.
    async fn abandon(&self, delivery: &Delivery<M>, error: &TicketingError);
}

/// Pulls from a `WorkQueue` and acknowledges only after the handler has
/// finished, so a crash mid-processing leaves the message in flight rather
/// than losing it.
pub struct QueueConsumer<M> {
    name: &'static str,
    queue: WorkQueueRef<M>,
    handler: Arc<dyn MessageHandler<M>>,
    max_attempts: u32,
}

impl<M> Clone for QueueConsumer<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            queue: self.queue.clone(),
            handler: self.handler.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

impl<M> QueueConsumer<M>
where
    M: Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        queue: WorkQueueRef<M>,
        handler: Arc<dyn MessageHandler<M>>,
        max_attempts: u32,
    ) -> Self {
        Self {
            name,
            queue,
            handler,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Receives and settles exactly one delivery.
    pub async fn process_next(&self) -> Result<()> {
        let delivery = self.queue.receive().await?;
        self.settle(delivery).await
    }

    async fn settle(&self, delivery: Delivery<M>) -> Result<()> {
        let tag = delivery.tag;
        match self.handler.handle(&delivery).await {
            Ok(()) => {
                self.queue.ack(tag).await?;
                tracing::debug!(queue = self.name, delivery_tag = tag, "Message acknowledged");
            }
            Err(e) if e.is_retryable() && delivery.attempt < self.max_attempts => {
                tracing::warn!(
                    queue = self.name,
                    delivery_tag = tag,
                    attempt = delivery.attempt,
                    error = %e,
                    "Message processing failed, retrying"
                );
                self.queue.retry(tag).await?;
            }
            Err(e) => {
                tracing::error!(
                    queue = self.name,
                    delivery_tag = tag,
                    attempt = delivery.attempt,
                    error = %e,
                    "Message processing failed, dead-lettering"
                );
                self.handler.abandon(&delivery, &e).await;
                self.queue.dead_letter(tag, e.to_string()).await?;
            }
        }
        Ok(())
    }

    /// Runs until `shutdown` flips to true. A delivery already being
    /// processed is finished before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = self.name, "Consumer started");
        loop {
            let delivery = tokio::select! {
                _ = shutdown.changed() => break,
                delivery = self.queue.receive() => delivery,
            };
            let result = match delivery {
                Ok(delivery) => self.settle(delivery).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::error!(queue = self.name, error = %e, "Queue operation failed");
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!(queue = self.name, "Consumer stopped");
    }

    /// Starts `workers` independent consumers on the same queue.
    pub fn spawn_pool(self, workers: usize, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|_| tokio::spawn(self.clone().run(shutdown.clone())))
            .collect()
    }
}
