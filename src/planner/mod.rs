//! Submission planning: plan model, candidate ranking, plan construction,
//! and plan persistence.

pub mod builder;
pub mod model;
pub mod ranker;
pub mod storage;

pub use builder::{PlanError, SelectedItem, SubmissionPlanner};
pub use model::{
    Decision, ItemKind, ItemScope, ItemStatus, Mode, PlanSummary, ResolvedDates, ScopeContext,
    SubmissionItem, SubmissionPlan,
};
pub use ranker::{best_match, rank, CandidateDoc, RankTarget, RankedCandidate};
pub use storage::PlanStore;
