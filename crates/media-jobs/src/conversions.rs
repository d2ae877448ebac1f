//! Conversion Jobs
//!
//! Attaching media hands conversion work to a [`ConversionDispatcher`]. The queue
//! dispatcher turns each task into a `perform_conversions` job, which the worker
//! runs through [`PerformConversionsHandler`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use media_core::config::QueueConfig;
use media_core::traits::Id;
use media_library::{MediaManipulator, MediaStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::jobs::{Job, JobError, JobHandler, JobQueue, JobResult};

/// Job type of queued conversion work
pub const PERFORM_CONVERSIONS: &str = "perform_conversions";

/// Deferred request to generate conversions for one media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub media_id: Id,
    pub conversions: Vec<String>,
}

impl ConversionTask {
    /// Create a task; repeated names are dropped, keeping first occurrence order
    pub fn new<I, S>(media_id: Id, conversions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let conversions = conversions
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| seen.insert(name.clone()))
            .collect();

        Self {
            media_id,
            conversions,
        }
    }
}

/// Schedules conversion tasks for later execution
#[async_trait]
pub trait ConversionDispatcher: Send + Sync {
    async fn dispatch(&self, task: ConversionTask) -> JobResult<()>;
}

/// Dispatcher that enqueues `perform_conversions` jobs
pub struct QueueDispatcher {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    max_retries: u32,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            max_retries: 3,
        }
    }

    pub fn from_config(queue: Arc<dyn JobQueue>, config: &QueueConfig) -> Self {
        Self::new(queue, config.name.clone()).with_max_retries(config.max_retries)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl ConversionDispatcher for QueueDispatcher {
    #[instrument(skip(self, task), fields(media_id = task.media_id))]
    async fn dispatch(&self, task: ConversionTask) -> JobResult<()> {
        let job = Job::new(PERFORM_CONVERSIONS, serde_json::to_value(&task)?)
            .queue(self.queue_name.clone())
            .max_retries(self.max_retries);

        let job_id = self.queue.enqueue(job).await?;
        debug!(job_id = %job_id, conversions = ?task.conversions, "Conversion job queued");
        Ok(())
    }
}

/// Runs queued conversion tasks
///
/// Existing outputs are kept, so a retried job only redoes the conversions that
/// are still missing.
pub struct PerformConversionsHandler {
    store: Arc<dyn MediaStore>,
    manipulator: Arc<MediaManipulator>,
}

impl PerformConversionsHandler {
    pub fn new(store: Arc<dyn MediaStore>, manipulator: Arc<MediaManipulator>) -> Self {
        Self { store, manipulator }
    }

    pub async fn perform(&self, task: &ConversionTask) -> JobResult<()> {
        let media = self
            .store
            .get(task.media_id)
            .await
            .map_err(|e| JobError::Failed(e.to_string()))?;

        // Media deleted after the job was queued
        let Some(media) = media else {
            warn!(media_id = task.media_id, "Media no longer exists, skipping conversions");
            return Ok(());
        };

        self.manipulator
            .convert(&media, &task.conversions, true)
            .await
            .map_err(|e| JobError::Failed(e.to_string()))?;

        info!(
            media_id = media.id,
            conversions = ?task.conversions,
            "Conversions performed"
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for PerformConversionsHandler {
    async fn handle(&self, args: serde_json::Value) -> JobResult<()> {
        let task: ConversionTask = serde_json::from_value(args)?;
        self.perform(&task).await
    }
}
