//! Plan persistence — one JSON document per plan id.
//!
//! Written atomically: tmp file → rename to prevent partial reads. A plan
//! file is never overwritten; re-planning creates a new id.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;

use super::model::SubmissionPlan;

pub struct PlanStore {
    dir: PathBuf,
}

impl PlanStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("plans"),
        }
    }

    fn path_for(&self, plan_id: &str) -> PathBuf {
        self.dir.join(format!("{plan_id}.json"))
    }

    /// Persist a plan. Fails if a plan with this id already exists.
    pub async fn save(&self, plan: &SubmissionPlan) -> Result<PathBuf> {
        validate_id(&plan.plan_id)?;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&plan.plan_id);
        if fs::try_exists(&path).await? {
            bail!("PLAN_EXISTS: plan {} is already persisted", plan.plan_id);
        }

        let json = serde_json::to_string_pretty(plan)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Read a plan back by id. `None` when no such plan was ever persisted.
    pub async fn load(&self, plan_id: &str) -> Result<Option<SubmissionPlan>> {
        if validate_id(plan_id).is_err() {
            return Ok(None);
        }
        let path = self.path_for(plan_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("reading plan file"),
        };
        let plan = serde_json::from_str(&raw)
            .with_context(|| format!("plan file {} is not valid JSON", path.display()))?;
        Ok(Some(plan))
    }
}

/// Plan ids are ULIDs — anything else never names a file under the store.
fn validate_id(plan_id: &str) -> Result<()> {
    if plan_id.is_empty() || !plan_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("invalid plan id: {plan_id:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::model::{Mode, ScopeContext, SubmissionPlan};

    fn plan() -> SubmissionPlan {
        SubmissionPlan::assemble(
            ScopeContext {
                platform: "egestiona".to_string(),
                type_ids: vec!["ITA".to_string()],
                company_key: Some("C-1".to_string()),
                person_key: None,
                period_keys: vec![],
                mode: Mode::PrepareWrite,
            },
            vec![],
        )
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let plan = plan();
        store.save(&plan).await.unwrap();
        let loaded = store.load(&plan.plan_id).await.unwrap().expect("plan");
        assert_eq!(loaded, plan);
    }

    #[tokio::test]
    async fn plans_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let plan = plan();
        store.save(&plan).await.unwrap();
        let err = store.save(&plan).await.unwrap_err();
        assert!(err.to_string().starts_with("PLAN_EXISTS"));
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_load_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        assert!(store.load("01JUNKNOWNULID0000000000AA").await.unwrap().is_none());
        assert!(store.load("../escape").await.unwrap().is_none());
    }
}
