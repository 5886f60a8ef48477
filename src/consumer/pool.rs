//! Fixed-size worker pool polling the result queues.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::schema::QueuesConfig;
use crate::config::{ConsumerConfig, QueueSettings};
use crate::consumer::processor::ResultConsumer;
use crate::lifecycle::Shutdown;
use crate::queue::{Priority, WorkQueue};

pub struct ConsumerPool {
    consumer: Arc<ResultConsumer>,
    queue: Arc<dyn WorkQueue>,
    config: ConsumerConfig,
    queues: QueuesConfig,
}

impl ConsumerPool {
    pub fn new(
        consumer: Arc<ResultConsumer>,
        queue: Arc<dyn WorkQueue>,
        config: ConsumerConfig,
        queues: QueuesConfig,
    ) -> Self {
        Self {
            consumer,
            queue,
            config,
            queues,
        }
    }

    fn workers_for(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.config.high_workers,
            Priority::Standard => self.config.standard_workers,
        }
    }

    /// Run every worker until `shutdown` fires, then wait for in-flight
    /// batches to finish.
    pub async fn run(self, shutdown: &Shutdown) {
        let mut workers = JoinSet::new();

        for priority in Priority::ALL {
            let settings = self.queues.queue(priority).clone();
            let idle = settings
                .batching_window()
                .max(Duration::from_millis(self.config.idle_poll_ms));

            for id in 0..self.workers_for(priority) {
                let worker = Worker {
                    id,
                    priority,
                    settings: settings.clone(),
                    idle,
                    consumer: self.consumer.clone(),
                    queue: self.queue.clone(),
                };
                workers.spawn(worker.run(shutdown.subscribe()));
            }
        }

        tracing::info!(
            high_workers = self.config.high_workers,
            standard_workers = self.config.standard_workers,
            "Consumer pool started"
        );

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Consumer worker panicked");
            }
        }
        tracing::info!("Consumer pool stopped");
    }
}

struct Worker {
    id: usize,
    priority: Priority,
    settings: QueueSettings,
    idle: Duration,
    consumer: Arc<ResultConsumer>,
    queue: Arc<dyn WorkQueue>,
}

impl Worker {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(worker = self.id, priority = %self.priority, "Consumer worker starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = self.queue.receive_batch(self.priority, self.settings.batch_size) => {
                    let batch = match received {
                        Ok(batch) => batch,
                        Err(e) => {
                            tracing::warn!(worker = self.id, priority = %self.priority, error = %e, "Receive failed");
                            Vec::new()
                        }
                    };

                    if batch.is_empty() {
                        tokio::select! {
                            _ = shutdown.recv() => break,
                            _ = tokio::time::sleep(self.idle) => continue,
                        }
                    }

                    let failed = self.consumer.process_batch(&batch).await;
                    tracing::debug!(
                        worker = self.id,
                        priority = %self.priority,
                        received = batch.len(),
                        failed = failed.len(),
                        "Batch processed"
                    );
                }
            }
        }

        tracing::debug!(worker = self.id, priority = %self.priority, "Consumer worker exiting");
    }
}
