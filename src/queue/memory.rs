//! In-process queue transport with visibility leases and a dead letter queue.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::schema::QueuesConfig;
use crate::config::QueueSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::observability::metrics;
use crate::queue::types::{JobDescriptor, Priority, QueueMessage};
use crate::queue::WorkQueue;

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: JobDescriptor,
    receive_count: u32,
    visible_at: u64,
    receipt: Option<String>,
}

impl StoredMessage {
    fn to_message(&self, lane: Priority) -> QueueMessage {
        QueueMessage {
            message_id: self.message_id.clone(),
            receipt: self.receipt.clone().unwrap_or_default(),
            body: self.body.clone(),
            lane,
            receive_count: self.receive_count,
            visibility_deadline: self.visible_at,
        }
    }
}

#[derive(Debug)]
struct Lane {
    settings: QueueSettings,
    /// Live messages in send order.
    messages: Vec<StoredMessage>,
    dead_letters: Vec<StoredMessage>,
}

impl Lane {
    fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            messages: Vec::new(),
            dead_letters: Vec::new(),
        }
    }
}

/// Queue transport backed by process memory.
///
/// Delivery is at-least-once: a received message that is not acked before
/// its visibility deadline is handed out again. A message already
/// received `max_receive_count` times is moved to the lane's dead letter
/// queue on its next delivery attempt instead.
pub struct InMemoryQueue {
    lanes: HashMap<Priority, Mutex<Lane>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryQueue {
    pub fn new(config: &QueuesConfig, clock: Arc<dyn Clock>) -> Self {
        let mut lanes = HashMap::new();
        lanes.insert(Priority::High, Mutex::new(Lane::new(config.high.clone())));
        lanes.insert(
            Priority::Standard,
            Mutex::new(Lane::new(config.standard.clone())),
        );
        Self { lanes, clock }
    }

    fn lane(&self, priority: Priority) -> PipelineResult<MutexGuard<'_, Lane>> {
        self.lanes
            .get(&priority)
            .ok_or_else(|| PipelineError::Queue(format!("no {priority} queue configured")))?
            .lock()
            .map_err(|_| PipelineError::Queue(format!("{priority} queue lock poisoned")))
    }

    /// Messages not yet acked or dead-lettered, visible or in flight.
    pub fn depth(&self, priority: Priority) -> usize {
        self.lane(priority).map(|l| l.messages.len()).unwrap_or(0)
    }

    pub fn settings(&self, priority: Priority) -> Option<QueueSettings> {
        self.lane(priority).ok().map(|l| l.settings.clone())
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn send(&self, job: JobDescriptor, priority: Priority) -> PipelineResult<String> {
        let now = self.clock.now_millis();
        let message_id = Uuid::new_v4().to_string();
        let mut lane = self.lane(priority)?;
        lane.messages.push(StoredMessage {
            message_id: message_id.clone(),
            body: job,
            receive_count: 0,
            visible_at: now,
            receipt: None,
        });
        metrics::record_queue_depth(priority, lane.messages.len());
        Ok(message_id)
    }

    async fn receive_batch(&self, priority: Priority, max: usize) -> PipelineResult<Vec<QueueMessage>> {
        let now = self.clock.now_millis();
        let mut lane = self.lane(priority)?;
        let lease_ms = lane.settings.visibility_timeout().as_millis() as u64;
        let max_receive_count = lane.settings.max_receive_count;

        let mut batch = Vec::new();
        let mut expired = Vec::new();
        for (index, stored) in lane.messages.iter_mut().enumerate() {
            if batch.len() >= max {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            if stored.receive_count >= max_receive_count {
                expired.push(index);
                continue;
            }
            stored.receive_count += 1;
            stored.visible_at = now + lease_ms;
            stored.receipt = Some(Uuid::new_v4().to_string());
            batch.push(stored.to_message(priority));
        }

        for index in expired.into_iter().rev() {
            let mut stored = lane.messages.remove(index);
            stored.receipt = None;
            tracing::warn!(
                message_id = %stored.message_id,
                job_id = %stored.body.job_id,
                receive_count = stored.receive_count,
                priority = %priority,
                "Message exceeded max receive count, moved to dead letter queue"
            );
            metrics::record_dead_letter(priority);
            lane.dead_letters.push(stored);
        }
        metrics::record_queue_depth(priority, lane.messages.len());

        Ok(batch)
    }

    async fn ack(&self, msg: &QueueMessage) -> PipelineResult<()> {
        let mut lane = self.lane(msg.lane)?;
        let Some(index) = lane
            .messages
            .iter()
            .position(|m| m.message_id == msg.message_id)
        else {
            // Already deleted.
            return Ok(());
        };

        if lane.messages[index].receipt.as_deref() != Some(msg.receipt.as_str()) {
            return Err(PipelineError::Queue(format!(
                "stale receipt for message {}",
                msg.message_id
            )));
        }

        lane.messages.remove(index);
        metrics::record_queue_depth(msg.lane, lane.messages.len());
        Ok(())
    }

    async fn dead_letters(&self, priority: Priority) -> PipelineResult<Vec<QueueMessage>> {
        let lane = self.lane(priority)?;
        Ok(lane
            .dead_letters
            .iter()
            .map(|m| m.to_message(priority))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::queue::SourceRef;
    use std::time::Duration;

    fn job(id: &str, priority: Priority) -> JobDescriptor {
        JobDescriptor {
            job_id: id.to_string(),
            source_ref: SourceRef::new("inbox", format!("{id}.pdf")),
            priority,
            submitted_at: 0,
            retry_count: 0,
        }
    }

    fn queue(max_receive_count: u32) -> (InMemoryQueue, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let mut config = QueuesConfig::default();
        config.standard.max_receive_count = max_receive_count;
        config.standard.visibility_timeout_secs = 30;
        (InMemoryQueue::new(&config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_lease_hides_message_until_deadline() {
        let (q, clock) = queue(5);
        q.send(job("a", Priority::Standard), Priority::Standard).await.unwrap();

        let first = q.receive_batch(Priority::Standard, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);
        assert_eq!(first[0].visibility_deadline, 30_000);

        assert!(q.receive_batch(Priority::Standard, 10).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(30));
        let second = q.receive_batch(Priority::Standard, 10).await.unwrap();
        assert_eq!(second[0].message_id, first[0].message_id);
        assert_eq!(second[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_ack_removes_and_rejects_stale_receipt() {
        let (q, clock) = queue(5);
        q.send(job("a", Priority::Standard), Priority::Standard).await.unwrap();

        let stale = q.receive_batch(Priority::Standard, 1).await.unwrap().remove(0);
        clock.advance(Duration::from_secs(31));
        let fresh = q.receive_batch(Priority::Standard, 1).await.unwrap().remove(0);

        assert!(q.ack(&stale).await.is_err());
        q.ack(&fresh).await.unwrap();
        assert_eq!(q.depth(Priority::Standard), 0);

        // Idempotent once deleted.
        q.ack(&fresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_receives() {
        let (q, clock) = queue(3);
        q.send(job("poison", Priority::Standard), Priority::Standard).await.unwrap();

        for expected in 1..=3 {
            let batch = q.receive_batch(Priority::Standard, 1).await.unwrap();
            assert_eq!(batch[0].receive_count, expected);
            q.nack(&batch[0]).await.unwrap();
            clock.advance(Duration::from_secs(30));
        }

        assert!(q.receive_batch(Priority::Standard, 1).await.unwrap().is_empty());
        let dlq = q.dead_letters(Priority::Standard).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].body.job_id, "poison");
        assert_eq!(q.depth(Priority::Standard), 0);

        clock.advance(Duration::from_secs(300));
        assert!(q.receive_batch(Priority::Standard, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ack_targets_receiving_lane() {
        let (q, _) = queue(5);
        // Descriptor priority disagrees with the lane it was sent on.
        q.send(job("a", Priority::Standard), Priority::High).await.unwrap();

        let msg = q.receive_batch(Priority::High, 1).await.unwrap().remove(0);
        assert_eq!(msg.lane, Priority::High);
        q.ack(&msg).await.unwrap();

        assert_eq!(q.depth(Priority::High), 0);
        assert_eq!(q.depth(Priority::Standard), 0);
    }

    #[tokio::test]
    async fn test_batches_respect_max_and_priority() {
        let (q, _) = queue(5);
        for i in 0..5 {
            q.send(job(&format!("s{i}"), Priority::Standard), Priority::Standard)
                .await
                .unwrap();
        }
        q.send(job("h0", Priority::High), Priority::High).await.unwrap();

        let batch = q.receive_batch(Priority::Standard, 3).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|m| m.body.job_id.as_str()).collect();
        assert_eq!(ids, vec!["s0", "s1", "s2"]);

        let high = q.receive_batch(Priority::High, 10).await.unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].body.job_id, "h0");
    }
}
