//! Submission plan data model types.
//!
//! Everything here is a closed enum or a plain serde struct — the plan is
//! persisted as JSON and read back verbatim, so the wire form is the model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Generate a new ULID string (time-ordered prefix + random suffix).
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Access mode a plan was built under. Only `PREPARE_WRITE` and `WRITE`
/// scopes may ever reach execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    ReadOnly,
    PrepareWrite,
    Write,
}

impl Mode {
    /// Returns `true` for the two modes that permit execution-class actions.
    pub fn allows_execution(self) -> bool {
        matches!(self, Mode::PrepareWrite | Mode::Write)
    }
}

/// The target scope a plan is built for. Immutable once a plan exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
    /// Portal platform identifier, e.g. `"egestiona"`.
    pub platform: String,
    /// Document-type identifiers this scope is allowed to touch.
    pub type_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_key: Option<String>,
    /// Optional period filters, e.g. `["2026-07"]`. Empty = no filter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub period_keys: Vec<String>,
    pub mode: Mode,
}

// ─── Items ───────────────────────────────────────────────────────────────────

/// How an item entered the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Derived from a detected pending requirement on the portal grid.
    InferredGap,
    /// Explicitly selected by the user as a concrete document instance.
    ExplicitInstance,
}

/// Whether the requirement targets the company or an individual worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemScope {
    Company,
    Worker,
}

/// Per-item readiness status. The global [`Decision`] aggregates these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Planned,
    NeedsConfirmation,
    Blocked,
}

/// Validity window resolved for a document against a concrete period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<NaiveDate>,
}

/// One unit of submission work. Created once by the planner and never
/// mutated after the plan is persisted — re-planning produces a new plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionItem {
    pub kind: ItemKind,
    pub type_id: String,
    pub scope: ItemScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_dates: Option<ResolvedDates>,
    pub status: ItemStatus,
    /// Human-readable justification for `status`.
    pub reason: String,
}

// ─── Plan ────────────────────────────────────────────────────────────────────

/// Global readiness decision for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Ready,
    NeedsConfirmation,
    Blocked,
}

impl Decision {
    /// Aggregate the plan decision from its items.
    ///
    /// Invariant: `Blocked` iff at least one item is blocked; else
    /// `NeedsConfirmation` iff at least one item needs confirmation; else
    /// `Ready`.
    pub fn aggregate(items: &[SubmissionItem]) -> Decision {
        if items.iter().any(|i| i.status == ItemStatus::Blocked) {
            Decision::Blocked
        } else if items.iter().any(|i| i.status == ItemStatus::NeedsConfirmation) {
            Decision::NeedsConfirmation
        } else {
            Decision::Ready
        }
    }
}

/// Per-status item counts shown in listings and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total: usize,
    pub planned: usize,
    pub needs_confirmation: usize,
    pub blocked: usize,
}

impl PlanSummary {
    pub fn of(items: &[SubmissionItem]) -> PlanSummary {
        let mut s = PlanSummary {
            total: items.len(),
            ..PlanSummary::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Planned => s.planned += 1,
                ItemStatus::NeedsConfirmation => s.needs_confirmation += 1,
                ItemStatus::Blocked => s.blocked += 1,
            }
        }
        s
    }
}

/// A concrete, persisted proposal to submit a specific set of documents.
///
/// Immutable once persisted; read back by `plan_id` for confirmation and
/// execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPlan {
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub scope: ScopeContext,
    pub items: Vec<SubmissionItem>,
    pub decision: Decision,
    /// Plan-level reasons, one per item that degraded the decision.
    pub reasons: Vec<String>,
    pub summary: PlanSummary,
}

impl SubmissionPlan {
    /// Assemble a plan from built items, deriving decision and summary.
    pub fn assemble(scope: ScopeContext, items: Vec<SubmissionItem>) -> SubmissionPlan {
        let decision = Decision::aggregate(&items);
        let summary = PlanSummary::of(&items);
        let reasons = items
            .iter()
            .filter(|i| i.status != ItemStatus::Planned)
            .map(|i| format!("{}: {}", i.type_id, i.reason))
            .collect();
        SubmissionPlan {
            plan_id: new_id(),
            created_at: Utc::now(),
            scope,
            items,
            decision,
            reasons,
            summary,
        }
    }

    /// One-line human description of the plan's target, used as the job
    /// `scope_summary` snapshot.
    pub fn scope_line(&self) -> String {
        let subject = match (&self.scope.company_key, &self.scope.person_key) {
            (Some(c), Some(p)) => format!("{c}/{p}"),
            (Some(c), None) => c.clone(),
            (None, Some(p)) => p.clone(),
            (None, None) => "-".to_string(),
        };
        format!(
            "{} {} item(s) for {} [{:?}]",
            self.scope.platform,
            self.items.len(),
            subject,
            self.scope.mode
        )
    }
}
