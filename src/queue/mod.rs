//! Durable job queue: model, single-worker service, and report rendering.

pub mod model;
pub mod report;
pub mod service;

pub use model::{ExecMode, Job, JobProgress, JobStatus};
pub use service::{QueueError, QueueService};
