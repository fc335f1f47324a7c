pub mod config;
pub mod docstore;
pub mod gate;
pub mod planner;
pub mod queue;
pub mod runner;
pub mod uploader;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::DaemonConfig;
use docstore::SharedDocumentStore;
use gate::{Challenge, ChallengeGate};
use planner::{PlanStore, ScopeContext, SelectedItem, SubmissionPlan, SubmissionPlanner};
use queue::{ExecMode, Job, QueueService};
use runner::{ExecutionResult, ExecutionRunner};
use uploader::Uploader;

/// Shared application state passed to every caller and background task.
///
/// This is the surface an external API layer consumes: plan construction,
/// challenge confirmation, synchronous execution, and the async job queue.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub documents: SharedDocumentStore,
    pub planner: Arc<SubmissionPlanner>,
    pub plan_store: Arc<PlanStore>,
    pub gate: Arc<ChallengeGate>,
    pub runner: Arc<ExecutionRunner>,
    pub queue: Arc<QueueService>,
    uploader: Arc<dyn Uploader>,
}

impl AppContext {
    /// Wire the daemon's services over the given capability implementations.
    ///
    /// The document store and uploader are external collaborators — the
    /// daemon binary links the simulated pair; a real deployment injects the
    /// portal-backed ones.
    pub fn initialize(
        config: DaemonConfig,
        documents: SharedDocumentStore,
        uploader: Arc<dyn Uploader>,
    ) -> Result<AppContext> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

        let config = Arc::new(config);
        let plan_store = Arc::new(PlanStore::new(&config.data_dir));
        let gate = Arc::new(ChallengeGate::new(&config.data_dir));
        let runner = Arc::new(ExecutionRunner::new(
            config.data_dir.clone(),
            Arc::clone(&uploader),
        ));
        let queue = QueueService::open(
            &config.data_dir,
            Arc::clone(&plan_store),
            Arc::clone(&runner),
            Duration::from_millis(config.poll_interval_ms),
            config.job_retention_days,
        )?;
        let planner = Arc::new(SubmissionPlanner::new(Arc::clone(&documents)));

        info!(
            data_dir = %config.data_dir.display(),
            platform = %config.platform,
            executor = uploader.label(),
            dry_run = config.dry_run,
            "caed context initialized"
        );

        Ok(AppContext {
            config,
            documents,
            planner,
            plan_store,
            gate,
            runner,
            queue,
            uploader,
        })
    }

    fn exec_mode(&self) -> ExecMode {
        ExecMode {
            dry_run: self.config.dry_run,
            simulated: self.uploader.is_simulated(),
        }
    }

    // ─── Plan operations ─────────────────────────────────────────────────────

    /// Build a plan from an explicit selection and persist it.
    pub async fn create_plan(
        &self,
        scope: ScopeContext,
        selection: Vec<SelectedItem>,
    ) -> Result<SubmissionPlan> {
        let plan = self.planner.build_plan(scope, selection).await?;
        self.plan_store.save(&plan).await?;
        info!(plan_id = %plan.plan_id, decision = ?plan.decision, "plan persisted");
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<SubmissionPlan>> {
        self.plan_store.load(plan_id).await
    }

    // ─── Confirmation + execution ────────────────────────────────────────────

    /// Issue a confirmation challenge for a READY plan.
    pub async fn create_challenge(&self, plan_id: &str) -> Result<Challenge> {
        let plan = self.require_plan(plan_id).await?;
        Ok(self.gate.create_challenge(&plan).await?)
    }

    /// Validate a challenge response and execute the plan synchronously.
    pub async fn execute_confirmed(
        &self,
        plan_id: &str,
        token: &str,
        response: &str,
    ) -> Result<ExecutionResult> {
        self.gate.validate(token, response, plan_id).await?;
        let plan = self.require_plan(plan_id).await?;
        Ok(self
            .runner
            .execute(&plan, self.config.dry_run, CancellationToken::new(), None)
            .await)
    }

    /// Validate a challenge response and enqueue the plan as a job.
    pub async fn enqueue_confirmed(
        &self,
        plan_id: &str,
        token: &str,
        response: &str,
    ) -> Result<Job> {
        self.gate.validate(token, response, plan_id).await?;
        let plan = self.require_plan(plan_id).await?;
        Ok(self.queue.enqueue(plan, self.exec_mode())?)
    }

    // ─── Job operations ──────────────────────────────────────────────────────

    /// Retry a failed or partially successful job.
    ///
    /// Against the real portal a fresh confirmation challenge is required;
    /// the simulated executor skips it for test automation.
    pub async fn retry_job(
        &self,
        job_id: &str,
        confirmation: Option<(&str, &str)>,
    ) -> Result<Job> {
        if !self.uploader.is_simulated() {
            let Some((token, response)) = confirmation else {
                bail!("CONFIRMATION_REQUIRED: retry against the real portal needs a challenge");
            };
            let original = self
                .queue
                .get(job_id)
                .ok_or_else(|| anyhow::anyhow!("JOB_NOT_FOUND: no job with id {job_id}"))?;
            self.gate.validate(token, response, &original.plan_id).await?;
        }
        Ok(self.queue.retry(job_id).await?)
    }

    /// Render the human-readable report for a job.
    pub fn job_report(&self, job_id: &str) -> Result<String> {
        let job = self
            .queue
            .get(job_id)
            .ok_or_else(|| anyhow::anyhow!("JOB_NOT_FOUND: no job with id {job_id}"))?;
        Ok(queue::report::render(&job))
    }

    async fn require_plan(&self, plan_id: &str) -> Result<SubmissionPlan> {
        self.plan_store
            .load(plan_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("PLAN_NOT_FOUND: no plan with id {plan_id}"))
    }
}
