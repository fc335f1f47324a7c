//! Run evidence artifacts.
//!
//! Each run leaves a `manifest.json` (full decision trail), a
//! `run_finished.json` summary, and one subdirectory per processed item.
//! Evidence writes are best-effort: an I/O failure here is logged and must
//! never abort an otherwise-successful execution.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::warn;

use super::guardrails::GuardrailCheck;
use crate::planner::model::SubmissionPlan;
use crate::uploader::UploadOutcome;

/// Decision trail written at the start of a run.
#[derive(Debug, Serialize)]
pub struct RunManifest<'a> {
    pub run_id: &'a str,
    pub plan_id: &'a str,
    /// SHA-256 of the plan JSON as executed — pins the evidence to the exact
    /// plan payload.
    pub plan_digest: String,
    pub executor: &'a str,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub guardrail_checks: &'a [GuardrailCheck],
    pub total_items: usize,
}

/// Per-item evidence record.
#[derive(Debug, Serialize)]
pub struct ItemRecord<'a> {
    pub item_index: usize,
    pub type_id: &'a str,
    pub doc_id: Option<&'a str>,
    pub outcome: &'a UploadOutcome,
}

/// Hex SHA-256 of the plan's canonical JSON form.
pub fn plan_digest(plan: &SubmissionPlan) -> String {
    let json = serde_json::to_vec(plan).unwrap_or_default();
    hex::encode(Sha256::digest(&json))
}

pub struct EvidenceWriter {
    run_dir: PathBuf,
}

impl EvidenceWriter {
    pub fn new(data_dir: &Path, run_id: &str) -> Self {
        Self {
            run_dir: data_dir.join("runs").join(run_id),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Create the run directory. Failure is logged; the run proceeds.
    pub async fn prepare(&self) {
        if let Err(e) = fs::create_dir_all(&self.run_dir).await {
            warn!(dir = %self.run_dir.display(), err = %e, "could not create run evidence dir");
        }
    }

    /// Reserve and create the evidence directory for one item.
    pub async fn item_dir(&self, index: usize, type_id: &str) -> PathBuf {
        let dir = self.run_dir.join("items").join(format!("{index}_{type_id}"));
        if let Err(e) = fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), err = %e, "could not create item evidence dir");
        }
        dir
    }

    pub async fn write_manifest(&self, manifest: &RunManifest<'_>) {
        self.write_json("manifest.json", manifest).await;
    }

    pub async fn write_item_record(&self, record: &ItemRecord<'_>) {
        let rel = format!(
            "items/{}_{}/result.json",
            record.item_index, record.type_id
        );
        self.write_json(&rel, record).await;
    }

    pub async fn write_finished<T: Serialize>(&self, summary: &T) {
        self.write_json("run_finished.json", summary).await;
    }

    async fn write_json<T: Serialize>(&self, rel: &str, value: &T) {
        let path = self.run_dir.join(rel);
        let json = match serde_json::to_string_pretty(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "evidence serialization failed");
                return;
            }
        };
        if let Err(e) = fs::write(&path, json).await {
            warn!(path = %path.display(), err = %e, "evidence write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::model::{Mode, ScopeContext};

    #[test]
    fn plan_digest_is_stable_and_content_sensitive() {
        let plan = SubmissionPlan::assemble(
            ScopeContext {
                platform: "egestiona".to_string(),
                type_ids: vec!["ITA".to_string()],
                company_key: Some("B12345678".to_string()),
                person_key: None,
                period_keys: vec![],
                mode: Mode::Write,
            },
            vec![],
        );
        let a = plan_digest(&plan);
        let b = plan_digest(&plan);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut other = plan.clone();
        other.scope.platform = "other".to_string();
        assert_ne!(a, plan_digest(&other));
    }

    #[tokio::test]
    async fn writer_places_artifacts_under_the_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EvidenceWriter::new(dir.path(), "run-1");
        writer.prepare().await;
        let item_dir = writer.item_dir(0, "ITA").await;
        assert!(item_dir.ends_with("items/0_ITA"));
        assert!(item_dir.exists());

        writer.write_finished(&serde_json::json!({ "ok": true })).await;
        assert!(dir.path().join("runs/run-1/run_finished.json").exists());
    }
}
