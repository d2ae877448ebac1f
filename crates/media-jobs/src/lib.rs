//! # media-jobs
//!
//! Background job processing for Media RS.
//!
//! Conversion work requested while attaching media is queued as
//! `perform_conversions` jobs and executed later by a [`JobWorker`].

pub mod conversions;
pub mod jobs;

pub use conversions::{
    ConversionDispatcher, ConversionTask, PerformConversionsHandler, QueueDispatcher,
    PERFORM_CONVERSIONS,
};
pub use jobs::{
    Job, JobError, JobHandler, JobQueue, JobResult, JobStatus, JobWorker,
    MemoryJobQueue,
};
