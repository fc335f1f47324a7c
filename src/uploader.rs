//! Uploader capability seam.
//!
//! The execution runner is agnostic to which implementation it drives: the
//! real browser-driven portal uploader lives outside this repo; the simulated
//! one here always succeeds and writes dummy evidence, and is what test
//! automation and dry rollouts run against.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::planner::model::SubmissionItem;

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// How a single upload ended, as the runner classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadDisposition {
    Success,
    Failed,
    Blocked,
}

/// Result of one `upload_one` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub disposition: UploadDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Reference the portal assigned to the submission, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_reference: Option<String>,
    pub duration_ms: u64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_path: Option<PathBuf>,
}

/// Per-item context the runner hands to the uploader.
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub run_id: String,
    pub item_index: usize,
    /// Directory reserved for this item's evidence. Already created.
    pub evidence_dir: PathBuf,
    pub dry_run: bool,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Short label recorded in evidence and job descriptors.
    fn label(&self) -> &'static str;

    /// Simulated implementations are exempt from the subject allowlist and
    /// the mandatory-suggestion guardrail.
    fn is_simulated(&self) -> bool;

    /// Perform (or simulate) one upload. An `Err` is classified as `FAILED`
    /// by the runner.
    async fn upload_one(&self, item: &SubmissionItem, ctx: &UploadContext) -> Result<UploadOutcome>;
}

// ─── Simulated implementation ────────────────────────────────────────────────

/// Always-succeeding uploader that writes dummy evidence.
#[derive(Debug, Default)]
pub struct SimulatedUploader;

#[derive(Serialize)]
struct SimulatedEvidence<'a> {
    run_id: &'a str,
    item_index: usize,
    type_id: &'a str,
    doc_id: Option<&'a str>,
    dry_run: bool,
    simulated: bool,
}

#[async_trait]
impl Uploader for SimulatedUploader {
    fn label(&self) -> &'static str {
        "simulated"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn upload_one(&self, item: &SubmissionItem, ctx: &UploadContext) -> Result<UploadOutcome> {
        let evidence = SimulatedEvidence {
            run_id: &ctx.run_id,
            item_index: ctx.item_index,
            type_id: &item.type_id,
            doc_id: item.suggested_doc_id.as_deref(),
            dry_run: ctx.dry_run,
            simulated: true,
        };
        let path = ctx.evidence_dir.join("upload.json");
        fs::write(&path, serde_json::to_string_pretty(&evidence)?).await?;

        let upload_id = uuid::Uuid::new_v4().to_string();
        debug!(run_id = %ctx.run_id, item = ctx.item_index, %upload_id, "simulated upload");

        Ok(UploadOutcome {
            disposition: UploadDisposition::Success,
            upload_id: Some(upload_id),
            portal_reference: None,
            duration_ms: 1,
            reason: if ctx.dry_run {
                "dry run: upload skipped".to_string()
            } else {
                "simulated upload accepted".to_string()
            },
            evidence_path: Some(path),
        })
    }
}
