use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::events;
use crate::models::{Batch, BatchProgress, HistoricBatch, QueuedJob};

/// Batch and job lifecycle transitions, each carrying the row it describes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum LifecycleEvent {
    #[serde(rename = "batch.created")]
    BatchCreated(Batch),
    #[serde(rename = "batch.seeded")]
    BatchSeeded(BatchProgress),
    #[serde(rename = "job.completed")]
    JobCompleted(QueuedJob),
    #[serde(rename = "job.rescheduled")]
    JobRescheduled(QueuedJob),
    #[serde(rename = "job.failed")]
    JobFailed(QueuedJob),
    #[serde(rename = "batch.completed")]
    BatchCompleted(HistoricBatch),
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchCreated(_) => events::BATCH_CREATED,
            Self::BatchSeeded(_) => events::BATCH_SEEDED,
            Self::JobCompleted(_) => events::JOB_COMPLETED,
            Self::JobRescheduled(_) => events::JOB_RESCHEDULED,
            Self::JobFailed(_) => events::JOB_FAILED,
            Self::BatchCompleted(_) => events::BATCH_COMPLETED,
        }
    }

    pub fn batch_id(&self) -> Uuid {
        match self {
            Self::BatchCreated(batch) => batch.batch_id,
            Self::BatchSeeded(progress) => progress.batch_id,
            Self::JobCompleted(job) | Self::JobRescheduled(job) | Self::JobFailed(job) => {
                job.batch_id
            }
            Self::BatchCompleted(historic) => historic.batch_id,
        }
    }
}

/// Broadcast publisher for [`LifecycleEvent`]s
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    #[serde(flatten)]
    pub event: LifecycleEvent,
    pub published_at: DateTime<Utc>,
}

impl PublishedEvent {
    pub fn name(&self) -> &'static str {
        self.event.name()
    }
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to every current subscriber; returns how many received it
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };

        // broadcast::send only fails when nobody is subscribed, which is not an error here
        match self.sender.send(published) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(_)) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
