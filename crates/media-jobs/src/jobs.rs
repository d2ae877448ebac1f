//! Background Job Queue
//!
//! Jobs are JSON payloads routed to handlers by job type. Failed jobs are retried
//! with exponential backoff until their retry budget is spent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_core::config::QueueConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

/// Job errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Job failed: {0}")]
    Failed(String),
    #[error("Queue error: {0}")]
    QueueError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type JobResult<T> = Result<T, JobError>;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Retrying,
    Dead,
}

/// A background job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: String,
    /// Job type, used to pick the handler
    pub job_type: String,
    /// Queue name
    pub queue: String,
    /// Job arguments (JSON)
    pub args: serde_json::Value,
    /// Current status
    pub status: JobStatus,
    /// Number of retry attempts
    pub retries: u32,
    /// Maximum retries allowed
    pub max_retries: u32,
    /// Last error message
    pub error: Option<String>,
    /// Earliest time the job may run
    pub run_at: Option<DateTime<Utc>>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job last started running
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed or died
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job
    pub fn new(job_type: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            queue: "default".to_string(),
            args,
            status: JobStatus::Pending,
            retries: 0,
            max_retries: 3,
            error: None,
            run_at: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Set the queue
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set max retries
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Schedule in N seconds
    pub fn run_in(mut self, seconds: i64) -> Self {
        self.run_at = Some(Utc::now() + chrono::Duration::seconds(seconds));
        self
    }

    /// Check if the job is ready to run
    pub fn is_ready(&self) -> bool {
        match self.run_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// Check if the job can be retried
    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }

    fn is_runnable(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Retrying) && self.is_ready()
    }

    /// Mark as running
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark as completed
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Mark as failed, scheduling a retry while the budget lasts
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());

        if self.can_retry() {
            self.status = JobStatus::Retrying;
            self.retries += 1;
            // Exponential backoff: 2^retries seconds
            let delay = 2_i64.pow(self.retries);
            self.run_at = Some(Utc::now() + chrono::Duration::seconds(delay));
        } else {
            self.status = JobStatus::Dead;
            self.finished_at = Some(Utc::now());
        }
    }
}

/// Job queue trait
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job
    async fn enqueue(&self, job: Job) -> JobResult<String>;

    /// Get a job by ID
    async fn get(&self, job_id: &str) -> JobResult<Option<Job>>;

    /// Claim the next ready job, marking it running
    async fn dequeue(&self, queue: &str) -> JobResult<Option<Job>>;

    /// Update a job
    async fn update(&self, job: &Job) -> JobResult<()>;

    /// Get pending job count
    async fn pending_count(&self, queue: &str) -> JobResult<usize>;

    /// Get all jobs for a queue
    async fn list(&self, queue: &str, status: Option<JobStatus>) -> JobResult<Vec<Job>>;
}

/// In-memory job queue for development/testing
///
/// Ready jobs are claimed in enqueue order.
pub struct MemoryJobQueue {
    jobs: RwLock<Vec<Job>>,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> JobResult<String> {
        let mut jobs = self.jobs.write().await;
        let id = job.id.clone();
        jobs.push(job);
        Ok(id)
    }

    async fn get(&self, job_id: &str) -> JobResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn dequeue(&self, queue: &str) -> JobResult<Option<Job>> {
        let mut jobs = self.jobs.write().await;

        Ok(jobs
            .iter_mut()
            .find(|job| job.queue == queue && job.is_runnable())
            .map(|job| {
                job.mark_running();
                job.clone()
            }))
    }

    async fn update(&self, job: &Job) -> JobResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(JobError::NotFound(job.id.clone())),
        }
    }

    async fn pending_count(&self, queue: &str) -> JobResult<usize> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|j| j.queue == queue && j.status == JobStatus::Pending)
            .count())
    }

    async fn list(&self, queue: &str, status: Option<JobStatus>) -> JobResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|j| j.queue == queue && status.map_or(true, |s| j.status == s))
            .cloned()
            .collect())
    }
}

/// Handler for a specific job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, args: serde_json::Value) -> JobResult<()>;
}

/// Job worker for processing jobs
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    poll_interval: Duration,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobWorker {
    pub fn new(queue: Arc<dyn JobQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            poll_interval: Duration::from_millis(100),
            handlers: HashMap::new(),
        }
    }

    /// Worker for the queue named in the configuration
    pub fn from_config(queue: Arc<dyn JobQueue>, config: &QueueConfig) -> Self {
        Self::new(queue, config.name.clone())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
    }

    /// Wait this long between polls of an empty queue
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Register a handler for a job type
    pub fn register<H: JobHandler + 'static>(&mut self, job_type: impl Into<String>, handler: H) {
        self.handlers.insert(job_type.into(), Arc::new(handler));
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Process one job (returns true if a job was processed)
    pub async fn process_one(&self) -> JobResult<bool> {
        let mut job = match self.queue.dequeue(&self.queue_name).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        let outcome = match self.handlers.get(&job.job_type) {
            Some(handler) => handler.handle(job.args.clone()).await,
            None => Err(JobError::Failed(format!("Unknown job type: {}", job.job_type))),
        };

        match outcome {
            Ok(()) => {
                job.mark_completed();
                debug!(job_id = %job.id, job_type = %job.job_type, "Job completed");
            }
            Err(e) => {
                job.mark_failed(e.to_string());
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    retries = job.retries,
                    status = ?job.status,
                    error = %e,
                    "Job failed"
                );
            }
        }

        self.queue.update(&job).await?;
        Ok(true)
    }

    /// Run the worker loop until `shutdown` turns true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.queue_name, "Job worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.process_one().await {
                Ok(true) => continue,
                Ok(false) => self.poll_interval,
                Err(e) => {
                    error!(error = %e, "Job worker error");
                    Duration::from_secs(1)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.queue_name, "Job worker stopped");
    }
}
