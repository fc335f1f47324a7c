//! Durable, cancellable, retryable job queue.
//!
//! One background worker drains jobs in strict enqueue order; concurrent
//! writes against the portal are the primary risk this subsystem exists to
//! prevent, so parallel execution is never permitted. All caller-facing
//! operations and the worker serialize on a single mutex around the job
//! table. The table is snapshotted to disk (write temp → atomic rename)
//! after every mutation; on restart, jobs found `RUNNING` are coerced to
//! `FAILED` — mid-batch resume is deliberately not attempted.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::model::{ExecMode, Job, JobStatus};
use crate::planner::model::{Decision, SubmissionPlan};
use crate::planner::storage::PlanStore;
use crate::runner::{ExecutionRunner, RunProgress, RunStatus};

/// Conflict and lookup failures for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("JOB_NOT_FOUND: no job with id {0}")]
    NotFound(String),
    #[error("JOB_STATE_CONFLICT: job {job_id} is {status:?}; {action} not permitted")]
    StateConflict {
        job_id: String,
        status: JobStatus,
        action: &'static str,
    },
    #[error("PLAN_NOT_FOUND: plan {0} is not persisted")]
    PlanNotFound(String),
    #[error("PLAN_NOT_READY: plan {plan_id} decision is {decision:?}")]
    PlanNotReady { plan_id: String, decision: Decision },
    #[error("plan store: {0}")]
    Storage(#[from] anyhow::Error),
}

struct QueueState {
    /// All known jobs, in enqueue order.
    jobs: Vec<Job>,
    /// Cancellation token of the job currently being executed, if any.
    current_cancel: Option<(String, CancellationToken)>,
}

pub struct QueueService {
    state: Mutex<QueueState>,
    path: PathBuf,
    plan_store: Arc<PlanStore>,
    runner: Arc<ExecutionRunner>,
    poll_interval: Duration,
    /// Terminal jobs older than this are pruned. `None` = keep forever.
    retention: Option<chrono::Duration>,
}

impl QueueService {
    /// Load (or initialize) the job table and build the service.
    ///
    /// Jobs persisted as `RUNNING` by a previous process are marked `FAILED`
    /// ("interrupted by restart") — execution state cannot be trusted across
    /// a crash.
    pub fn open(
        data_dir: &Path,
        plan_store: Arc<PlanStore>,
        runner: Arc<ExecutionRunner>,
        poll_interval: Duration,
        retention_days: u32,
    ) -> anyhow::Result<Arc<QueueService>> {
        let path = data_dir.join("jobs").join("jobs.json");

        let mut jobs: Vec<Job> = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("job table {} is not valid JSON", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).context("reading job table"),
        };

        let mut interrupted = 0usize;
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Running) {
            job.status = JobStatus::Failed;
            job.error = Some("interrupted by restart".to_string());
            job.finished_at = Some(Utc::now());
            interrupted += 1;
        }

        let service = Arc::new(QueueService {
            state: Mutex::new(QueueState {
                jobs,
                current_cancel: None,
            }),
            path,
            plan_store,
            runner,
            poll_interval,
            retention: (retention_days > 0).then(|| chrono::Duration::days(i64::from(retention_days))),
        });

        {
            let state = service.lock();
            info!(
                jobs = state.jobs.len(),
                interrupted, "job table loaded"
            );
            if interrupted > 0 {
                service.persist(&state);
            }
        }
        Ok(service)
    }

    // ─── Caller-facing operations ────────────────────────────────────────────

    /// Enqueue one execution attempt of `plan`. The plan payload is embedded
    /// in the job so later plan mutations cannot change what runs.
    pub fn enqueue(&self, plan: SubmissionPlan, mode: ExecMode) -> Result<Job, QueueError> {
        if plan.decision != Decision::Ready {
            return Err(QueueError::PlanNotReady {
                plan_id: plan.plan_id,
                decision: plan.decision,
            });
        }
        let job = Job::new(plan, mode);
        let mut state = self.lock();
        state.jobs.push(job.clone());
        self.persist(&state);
        info!(job_id = %job.job_id, plan_id = %job.plan_id, "job enqueued");
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.lock().jobs.iter().find(|j| j.job_id == job_id).cloned()
    }

    /// All known jobs in enqueue order.
    pub fn list(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    /// Request cancellation.
    ///
    /// A `QUEUED` job is canceled immediately and never executes. A
    /// `RUNNING` job only gets `cancel_requested` set — the worker observes
    /// it at the next item boundary. Terminal jobs reject cancellation.
    pub fn cancel(&self, job_id: &str) -> Result<Job, QueueError> {
        let mut state = self.lock();
        let job = find_mut(&mut state.jobs, job_id)?;
        match job.status {
            JobStatus::Queued => {
                job.status = JobStatus::Canceled;
                job.finished_at = Some(Utc::now());
                job.progress.message = "canceled before start".to_string();
                let snapshot = job.clone();
                self.persist(&state);
                info!(job_id, "queued job canceled");
                Ok(snapshot)
            }
            JobStatus::Running => {
                job.cancel_requested = true;
                job.progress.message = "cancellation requested".to_string();
                let snapshot = job.clone();
                if let Some((current_id, token)) = &state.current_cancel {
                    if current_id == job_id {
                        token.cancel();
                    }
                }
                self.persist(&state);
                info!(job_id, "cancellation requested for running job");
                Ok(snapshot)
            }
            status => Err(QueueError::StateConflict {
                job_id: job_id.to_string(),
                status,
                action: "cancel",
            }),
        }
    }

    /// Retry a failed or partially successful job.
    ///
    /// Creates a brand-new job bound to the same plan id, re-validated
    /// against the plan's current persisted state, with `retry_of` pointing
    /// back at the original.
    pub async fn retry(&self, job_id: &str) -> Result<Job, QueueError> {
        let original = {
            let mut state = self.lock();
            find_mut(&mut state.jobs, job_id)?.clone()
        };
        if !original.status.allows_retry() {
            return Err(QueueError::StateConflict {
                job_id: job_id.to_string(),
                status: original.status,
                action: "retry",
            });
        }

        let plan = self
            .plan_store
            .load(&original.plan_id)
            .await?
            .ok_or_else(|| QueueError::PlanNotFound(original.plan_id.clone()))?;
        if plan.decision != Decision::Ready {
            return Err(QueueError::PlanNotReady {
                plan_id: plan.plan_id,
                decision: plan.decision,
            });
        }

        let mut job = Job::new(plan, original.mode);
        job.retry_of = Some(original.job_id.clone());
        let mut state = self.lock();
        state.jobs.push(job.clone());
        self.persist(&state);
        info!(job_id = %job.job_id, retry_of = %original.job_id, "retry enqueued");
        Ok(job)
    }

    // ─── Worker ──────────────────────────────────────────────────────────────

    /// Spawn the single background worker. At most one job executes at a
    /// time, in strict enqueue order; a job failure never takes the loop
    /// down.
    pub fn spawn_worker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            info!("job queue worker started");
            loop {
                match service.next_queued() {
                    Some(job_id) => {
                        if let Err(e) = service.process(&job_id).await {
                            error!(job_id = %job_id, err = %e, "job processing error; worker continues");
                            service.force_fail(&job_id, &format!("worker error: {e}"));
                        }
                    }
                    None => {
                        service.janitor_pass();
                        tokio::time::sleep(service.poll_interval).await;
                    }
                }
            }
        })
    }

    fn next_queued(&self) -> Option<String> {
        self.lock()
            .jobs
            .iter()
            .find(|j| j.status == JobStatus::Queued)
            .map(|j| j.job_id.clone())
    }

    async fn process(&self, job_id: &str) -> anyhow::Result<()> {
        // Re-fetch the plan fresh: it may have been invalidated since
        // enqueue, in which case the job blocks without ever running.
        let plan_id = match self.get(job_id) {
            Some(job) if job.status == JobStatus::Queued => job.plan_id,
            _ => return Ok(()), // canceled (or gone) between poll and process
        };

        match self.plan_store.load(&plan_id).await {
            Ok(Some(plan)) if plan.decision == Decision::Ready => {}
            Ok(Some(plan)) => {
                self.finish_without_running(
                    job_id,
                    JobStatus::Blocked,
                    &format!("PLAN_NOT_READY: plan decision is now {:?}", plan.decision),
                );
                return Ok(());
            }
            Ok(None) => {
                self.finish_without_running(
                    job_id,
                    JobStatus::Blocked,
                    &format!("PLAN_NOT_FOUND: plan {plan_id} is no longer persisted"),
                );
                return Ok(());
            }
            Err(e) => {
                self.finish_without_running(
                    job_id,
                    JobStatus::Blocked,
                    &format!("PLAN_NOT_FOUND: plan {plan_id} unreadable: {e}"),
                );
                return Ok(());
            }
        }

        let token = CancellationToken::new();
        let snapshot = {
            let mut state = self.lock();
            let job = find_mut(&mut state.jobs, job_id)?;
            // A cancel may have landed between the poll and this point.
            if job.status != JobStatus::Queued {
                None
            } else {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                job.progress.message = "starting run".to_string();
                let snapshot = (job.plan.clone(), job.mode);
                state.current_cancel = Some((job_id.to_string(), token.clone()));
                self.persist(&state);
                Some(snapshot)
            }
        };
        let Some((plan, mode)) = snapshot else {
            return Ok(());
        };

        info!(job_id, plan_id = %plan.plan_id, dry_run = mode.dry_run, "job running");

        // Progress hook: copy progress into the job record, persist, and
        // propagate a pending cancel request into the runner's token so it
        // stops at the next item boundary.
        let hook = |p: &RunProgress| {
            let mut state = self.lock();
            if let Ok(job) = find_mut(&mut state.jobs, job_id) {
                job.progress.total_items = p.total_items;
                job.progress.current_index = p.current_index;
                job.progress.success = p.success;
                job.progress.failed = p.failed;
                job.progress.blocked = p.blocked;
                job.progress.percent = p.percent;
                job.progress.message = p.message.clone();
                if job.cancel_requested {
                    token.cancel();
                }
            }
            self.persist(&state);
        };

        let result = self
            .runner
            .execute(&plan, mode.dry_run, token.clone(), Some(&hook))
            .await;

        let mut state = self.lock();
        state.current_cancel = None;
        let job = find_mut(&mut state.jobs, job_id)?;
        job.status = JobStatus::from_run(result.status);
        job.finished_at = Some(result.finished_at);
        job.run_id = Some(result.run_id.clone());
        job.evidence_path = Some(result.evidence_path.clone());
        job.error = result.error.clone();
        job.progress.success = result.summary.success;
        job.progress.failed = result.summary.failed;
        job.progress.blocked = result.summary.blocked;
        job.progress.percent = if result.status == RunStatus::Success {
            100
        } else if result.summary.total == 0 {
            0
        } else {
            ((result.summary.success + result.summary.failed + result.summary.blocked) * 100
                / result.summary.total) as u8
        };
        job.progress.message = format!("run finished: {:?}", job.status);
        let status = job.status;
        self.persist(&state);
        drop(state);

        info!(job_id, status = ?status, "job finished");
        Ok(())
    }

    /// Terminal transition for a job that never reached `RUNNING`. A job
    /// canceled in the meantime is left untouched.
    fn finish_without_running(&self, job_id: &str, status: JobStatus, reason: &str) {
        let mut state = self.lock();
        if let Ok(job) = find_mut(&mut state.jobs, job_id) {
            if job.status == JobStatus::Queued {
                job.status = status;
                job.error = Some(reason.to_string());
                job.finished_at = Some(Utc::now());
                job.progress.message = reason.to_string();
                warn!(job_id, %reason, "job blocked before running");
            }
        }
        self.persist(&state);
    }

    /// Last-resort failure marking when `process` itself errored.
    fn force_fail(&self, job_id: &str, reason: &str) {
        let mut state = self.lock();
        state.current_cancel = None;
        if let Ok(job) = find_mut(&mut state.jobs, job_id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some(reason.to_string());
                job.finished_at = Some(Utc::now());
            }
        }
        self.persist(&state);
    }

    /// Prune terminal jobs past the retention window.
    fn janitor_pass(&self) {
        let Some(retention) = self.retention else { return };
        let cutoff = Utc::now() - retention;
        let mut state = self.lock();
        let before = state.jobs.len();
        state.jobs.retain(|j| {
            !(j.status.is_terminal() && j.finished_at.map(|t| t < cutoff).unwrap_or(false))
        });
        let pruned = before - state.jobs.len();
        if pruned > 0 {
            info!(pruned, "pruned terminal jobs past retention");
            self.persist(&state);
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot the whole table: write temp file, then atomic rename. Never
    /// in place — a crash mid-write must not corrupt the table. Failures are
    /// logged and retried once.
    fn persist(&self, state: &QueueState) {
        for attempt in 0..2 {
            match self.try_persist(state) {
                Ok(()) => return,
                Err(e) if attempt == 0 => {
                    warn!(err = %e, "job table snapshot failed; retrying")
                }
                Err(e) => error!(err = %e, "job table snapshot failed"),
            }
        }
    }

    fn try_persist(&self, state: &QueueState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&state.jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn find_mut<'a>(jobs: &'a mut [Job], job_id: &str) -> Result<&'a mut Job, QueueError> {
    jobs.iter_mut()
        .find(|j| j.job_id == job_id)
        .ok_or_else(|| QueueError::NotFound(job_id.to_string()))
}
