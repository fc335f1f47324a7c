//! Job queue data model types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::planner::model::{new_id, SubmissionPlan};
use crate::runner::RunStatus;

/// Job lifecycle states. `QUEUED → RUNNING → {SUCCESS | PARTIAL_SUCCESS |
/// FAILED | BLOCKED | CANCELED}`; the four right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    PartialSuccess,
    Failed,
    Blocked,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    /// Terminal job status for a finished run.
    pub fn from_run(status: RunStatus) -> JobStatus {
        match status {
            RunStatus::Success => JobStatus::Success,
            RunStatus::PartialSuccess => JobStatus::PartialSuccess,
            RunStatus::Failed => JobStatus::Failed,
            RunStatus::Blocked => JobStatus::Blocked,
            RunStatus::Canceled => JobStatus::Canceled,
        }
    }

    /// Only these states may be retried — re-running a success is
    /// meaningless and a user-canceled job must be re-initiated deliberately.
    pub fn allows_retry(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::PartialSuccess)
    }
}

/// Execution progress, mutated only by the worker while the job runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_items: usize,
    pub current_index: usize,
    pub success: usize,
    pub failed: usize,
    pub blocked: usize,
    /// 0–100.
    pub percent: u8,
    pub message: String,
}

/// How the job's run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecMode {
    pub dry_run: bool,
    /// `true` when the run targets the simulated uploader rather than the
    /// real portal.
    pub simulated: bool,
}

/// A queued, persisted wrapper around one execution attempt of a plan.
///
/// The job owns its embedded copy of the plan payload, captured at enqueue
/// time — later plan-file changes cannot retroactively alter a queued or
/// running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub plan_id: String,
    /// Human-readable snapshot of the plan's target, for listings.
    pub scope_summary: String,
    /// Plan payload as of enqueue time.
    pub plan: SubmissionPlan,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Id of the job this one retries, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    pub mode: ExecMode,
}

impl Job {
    pub fn new(plan: SubmissionPlan, mode: ExecMode) -> Job {
        let progress = JobProgress {
            total_items: plan.items.len(),
            message: "queued".to_string(),
            ..JobProgress::default()
        };
        Job {
            job_id: new_id(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            plan_id: plan.plan_id.clone(),
            scope_summary: plan.scope_line(),
            plan,
            status: JobStatus::Queued,
            progress,
            run_id: None,
            evidence_path: None,
            error: None,
            cancel_requested: false,
            retry_of: None,
            mode,
        }
    }
}
