//! End-to-end pipeline tests: plan → challenge → guarded execution,
//! both synchronously and through the job queue.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use caed::config::DaemonConfig;
use caed::docstore::{DocumentRecord, InMemoryDocumentStore};
use caed::planner::{Decision, ItemKind, ItemScope, Mode, ScopeContext, SelectedItem};
use caed::queue::JobStatus;
use caed::runner::RunStatus;
use caed::uploader::SimulatedUploader;
use caed::AppContext;

fn test_config(dir: &Path) -> DaemonConfig {
    DaemonConfig {
        data_dir: dir.to_path_buf(),
        log: "warn".to_string(),
        log_format: "pretty".to_string(),
        platform: "egestiona".to_string(),
        poll_interval_ms: 20,
        job_retention_days: 30,
        dry_run: false,
    }
}

async fn context_with_docs(dir: &Path) -> (AppContext, Arc<InMemoryDocumentStore>) {
    let docs = Arc::new(InMemoryDocumentStore::new());
    docs.insert(
        DocumentRecord {
            doc_id: "doc-ita-1".to_string(),
            type_id: "ITA".to_string(),
            company_key: Some("B12345678".to_string()),
            person_key: None,
            period_key: Some("2026-07".to_string()),
            status: "reviewed".to_string(),
            updated_at: Some("2026-07-20".to_string()),
        },
        true,
    )
    .await;

    let ctx = AppContext::initialize(
        test_config(dir),
        docs.clone(),
        Arc::new(SimulatedUploader),
    )
    .expect("context");
    (ctx, docs)
}

fn scope() -> ScopeContext {
    ScopeContext {
        platform: "egestiona".to_string(),
        type_ids: vec!["ITA".to_string()],
        company_key: Some("B12345678".to_string()),
        person_key: None,
        period_keys: vec!["2026-07".to_string()],
        mode: Mode::PrepareWrite,
    }
}

fn selection(suggested: Option<&str>) -> Vec<SelectedItem> {
    vec![SelectedItem {
        kind: ItemKind::ExplicitInstance,
        type_id: "ITA".to_string(),
        scope: ItemScope::Company,
        company_key: Some("B12345678".to_string()),
        person_key: None,
        period_key: Some("2026-07".to_string()),
        suggested_doc_id: suggested.map(str::to_string),
    }]
}

async fn wait_for_terminal(ctx: &AppContext, job_id: &str) -> caed::queue::Job {
    for _ in 0..250 {
        if let Some(job) = ctx.queue.get(job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

#[tokio::test]
async fn full_flow_plan_challenge_enqueue_drain() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _docs) = context_with_docs(dir.path()).await;

    let plan = ctx
        .create_plan(scope(), selection(Some("doc-ita-1")))
        .await
        .expect("plan");
    assert_eq!(plan.decision, Decision::Ready);
    assert!(dir
        .path()
        .join("plans")
        .join(format!("{}.json", plan.plan_id))
        .exists());

    let loaded = ctx.get_plan(&plan.plan_id).await.unwrap().expect("plan readable");
    assert_eq!(loaded, plan);

    let challenge = ctx.create_challenge(&plan.plan_id).await.expect("challenge");
    let job = ctx
        .enqueue_confirmed(
            &plan.plan_id,
            &challenge.challenge_token,
            &format!("EXECUTE {}", plan.plan_id),
        )
        .await
        .expect("enqueue");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress.percent, 0);

    let _worker = ctx.queue.spawn_worker();
    let done = wait_for_terminal(&ctx, &job.job_id).await;
    assert_eq!(done.status, JobStatus::Success);
    assert_eq!(done.progress.percent, 100);
    assert_eq!(done.progress.success, 1);

    // Evidence artifacts for the run exist on disk.
    let evidence = done.evidence_path.expect("evidence path");
    assert!(evidence.join("manifest.json").exists());
    assert!(evidence.join("run_finished.json").exists());
    assert!(evidence.join("items/0_ITA/upload.json").exists());

    let report = ctx.job_report(&done.job_id).expect("report");
    assert!(report.contains("success"));
    assert!(report.contains(&plan.plan_id));
}

#[tokio::test]
async fn synchronous_execution_after_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _docs) = context_with_docs(dir.path()).await;

    let plan = ctx
        .create_plan(scope(), selection(Some("doc-ita-1")))
        .await
        .unwrap();
    let challenge = ctx.create_challenge(&plan.plan_id).await.unwrap();

    let result = ctx
        .execute_confirmed(
            &plan.plan_id,
            &challenge.challenge_token,
            &format!("EXECUTE {}", plan.plan_id),
        )
        .await
        .expect("execute");
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.summary.success, 1);

    // The challenge was consumed — replaying it fails.
    let err = ctx
        .execute_confirmed(
            &plan.plan_id,
            &challenge.challenge_token,
            &format!("EXECUTE {}", plan.plan_id),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("CHALLENGE_INVALID"));
}

#[tokio::test]
async fn wrong_literal_blocks_execution() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _docs) = context_with_docs(dir.path()).await;

    let plan = ctx
        .create_plan(scope(), selection(Some("doc-ita-1")))
        .await
        .unwrap();
    let challenge = ctx.create_challenge(&plan.plan_id).await.unwrap();

    let err = ctx
        .execute_confirmed(&plan.plan_id, &challenge.challenge_token, "EXECUTE please")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("CHALLENGE_RESPONSE_INCORRECT"));
}

#[tokio::test]
async fn non_ready_plan_cannot_be_confirmed() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _docs) = context_with_docs(dir.path()).await;

    // No suggestion assigned — plan needs confirmation, challenge refused.
    let plan = ctx.create_plan(scope(), selection(None)).await.unwrap();
    assert_eq!(plan.decision, Decision::NeedsConfirmation);

    let err = ctx.create_challenge(&plan.plan_id).await.unwrap_err();
    assert!(err.to_string().contains("PLAN_NOT_READY"));
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _docs) = context_with_docs(dir.path()).await;

    let err = ctx.create_plan(scope(), vec![]).await.unwrap_err();
    assert!(err.to_string().contains("EMPTY_SELECTION"));
}

#[tokio::test]
async fn read_only_scope_never_reaches_execution() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _docs) = context_with_docs(dir.path()).await;

    let mut read_scope = scope();
    read_scope.mode = Mode::ReadOnly;
    let plan = ctx
        .create_plan(read_scope, selection(Some("doc-ita-1")))
        .await
        .unwrap();
    assert_eq!(plan.decision, Decision::Ready);

    let err = ctx.create_challenge(&plan.plan_id).await.unwrap_err();
    assert!(err.to_string().contains("MODE_NOT_WRITE"));
}
