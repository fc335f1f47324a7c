//! Guarded batch execution of READY plans.
//!
//! Pre-flight guardrails are hard stops; after them, items run strictly in
//! plan order and processing halts on the first failed or blocked item.
//! Uploads against a live portal are not easily undoable — continuing past
//! an anomaly risks compounding an unknown failure mode, so later items are
//! left unattempted.

pub mod evidence;
pub mod guardrails;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::planner::model::{new_id, SubmissionPlan};
use crate::uploader::{UploadContext, UploadDisposition, Uploader};
use evidence::{plan_digest, EvidenceWriter, ItemRecord, RunManifest};
use guardrails::Guardrails;

// ─── Result types ────────────────────────────────────────────────────────────

/// Final status of one runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failed,
    Blocked,
    Canceled,
}

/// Per-outcome counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl RunSummary {
    fn processed(&self) -> usize {
        self.success + self.failed + self.blocked
    }
}

/// Immutable record of one execution. One per runner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub status: RunStatus,
    pub evidence_path: PathBuf,
    pub summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Progress snapshot handed to the caller between items.
#[derive(Debug, Clone, Serialize)]
pub struct RunProgress {
    pub total_items: usize,
    pub current_index: usize,
    pub success: usize,
    pub failed: usize,
    pub blocked: usize,
    pub percent: u8,
    pub message: String,
}

/// Summary artifact written as `run_finished.json`.
#[derive(Debug, Serialize)]
struct RunFinished<'a> {
    run_id: &'a str,
    plan_id: &'a str,
    status: RunStatus,
    summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

// ─── Runner ──────────────────────────────────────────────────────────────────

pub struct ExecutionRunner {
    data_dir: PathBuf,
    uploader: Arc<dyn Uploader>,
    rails: Guardrails,
}

impl ExecutionRunner {
    pub fn new(data_dir: PathBuf, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            data_dir,
            uploader,
            rails: Guardrails::default(),
        }
    }

    /// Runner with non-default guardrails. Tests use this; production code
    /// sticks to [`Guardrails::default`].
    pub fn with_guardrails(mut self, rails: Guardrails) -> Self {
        self.rails = rails;
        self
    }

    /// Execute a plan.
    ///
    /// `cancel` is observed at item boundaries only — an in-flight upload is
    /// never preempted. `on_progress` is invoked between items with a fresh
    /// snapshot.
    pub async fn execute(
        &self,
        plan: &SubmissionPlan,
        dry_run: bool,
        cancel: CancellationToken,
        on_progress: Option<&(dyn Fn(&RunProgress) + Send + Sync)>,
    ) -> ExecutionResult {
        let run_id = new_id();
        let started_at = Utc::now();
        let writer = EvidenceWriter::new(&self.data_dir, &run_id);
        writer.prepare().await;

        let mut summary = RunSummary {
            total: plan.items.len(),
            ..RunSummary::default()
        };

        // Pre-flight guardrails: any violation is a hard BLOCKED stop.
        let checks = match guardrails::validate(plan, self.uploader.is_simulated(), &self.rails) {
            Ok(checks) => checks,
            Err(violation) => {
                warn!(run_id, plan_id = %plan.plan_id, %violation, "guardrail violation");
                let finished_at = Utc::now();
                writer
                    .write_finished(&RunFinished {
                        run_id: &run_id,
                        plan_id: &plan.plan_id,
                        status: RunStatus::Blocked,
                        summary,
                        error: Some(&violation.to_string()),
                        started_at,
                        finished_at,
                    })
                    .await;
                return ExecutionResult {
                    run_id,
                    status: RunStatus::Blocked,
                    evidence_path: writer.run_dir().to_path_buf(),
                    summary,
                    error: Some(violation.to_string()),
                    started_at,
                    finished_at,
                };
            }
        };

        writer
            .write_manifest(&RunManifest {
                run_id: &run_id,
                plan_id: &plan.plan_id,
                plan_digest: plan_digest(plan),
                executor: self.uploader.label(),
                dry_run,
                started_at,
                guardrail_checks: &checks,
                total_items: plan.items.len(),
            })
            .await;

        info!(
            run_id,
            plan_id = %plan.plan_id,
            items = plan.items.len(),
            executor = self.uploader.label(),
            dry_run,
            "run started"
        );

        let mut canceled = false;
        let mut error: Option<String> = None;
        let mut stopped_blocked = false;

        for (index, item) in plan.items.iter().enumerate() {
            // Cooperative cancellation, item boundary only.
            if cancel.is_cancelled() {
                canceled = true;
                break;
            }

            emit(
                on_progress,
                &summary,
                index,
                format!("uploading item {}/{} ({})", index + 1, summary.total, item.type_id),
            );

            let item_dir = writer.item_dir(index, &item.type_id).await;
            let ctx = UploadContext {
                run_id: run_id.clone(),
                item_index: index,
                evidence_dir: item_dir,
                dry_run,
            };

            match self.uploader.upload_one(item, &ctx).await {
                Ok(outcome) => {
                    writer
                        .write_item_record(&ItemRecord {
                            item_index: index,
                            type_id: &item.type_id,
                            doc_id: item.suggested_doc_id.as_deref(),
                            outcome: &outcome,
                        })
                        .await;
                    match outcome.disposition {
                        UploadDisposition::Success => {
                            summary.success += 1;
                        }
                        UploadDisposition::Failed => {
                            summary.failed += 1;
                            error = Some(format!("item {index} failed: {}", outcome.reason));
                            break;
                        }
                        UploadDisposition::Blocked => {
                            summary.blocked += 1;
                            stopped_blocked = true;
                            error = Some(format!("item {index} blocked: {}", outcome.reason));
                            break;
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error = Some(format!("item {index} failed: {e}"));
                    break;
                }
            }

            emit(
                on_progress,
                &summary,
                index,
                format!("item {}/{} done", index + 1, summary.total),
            );
        }

        let status = if canceled {
            RunStatus::Canceled
        } else if summary.success == summary.total {
            RunStatus::Success
        } else if summary.success >= 1 {
            RunStatus::PartialSuccess
        } else if stopped_blocked {
            RunStatus::Blocked
        } else {
            RunStatus::Failed
        };

        let finished_at = Utc::now();
        emit(
            on_progress,
            &summary,
            summary.processed().saturating_sub(1),
            format!("run finished: {status:?}"),
        );

        writer
            .write_finished(&RunFinished {
                run_id: &run_id,
                plan_id: &plan.plan_id,
                status,
                summary,
                error: error.as_deref(),
                started_at,
                finished_at,
            })
            .await;

        info!(run_id, status = ?status, success = summary.success, failed = summary.failed, "run finished");

        ExecutionResult {
            run_id,
            status,
            evidence_path: writer.run_dir().to_path_buf(),
            summary,
            error,
            started_at,
            finished_at,
        }
    }
}

fn emit(
    on_progress: Option<&(dyn Fn(&RunProgress) + Send + Sync)>,
    summary: &RunSummary,
    current_index: usize,
    message: String,
) {
    if let Some(hook) = on_progress {
        let percent = if summary.total == 0 {
            100
        } else {
            (summary.processed() * 100 / summary.total) as u8
        };
        hook(&RunProgress {
            total_items: summary.total,
            current_index,
            success: summary.success,
            failed: summary.failed,
            blocked: summary.blocked,
            percent,
            message,
        });
    }
}
