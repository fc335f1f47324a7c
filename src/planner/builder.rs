//! Submission planner — turns a scope plus an explicit selection into a plan.
//!
//! Failure modes are per-item, never per-request: a bad item degrades the
//! plan's decision instead of aborting the batch. The only request-level
//! rejection is an empty selection.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use super::model::{
    ItemKind, ItemScope, ItemStatus, ScopeContext, SubmissionItem, SubmissionPlan,
};
use super::ranker::{self, CandidateDoc, RankTarget};
use crate::docstore::DocumentStore;

/// Request-level planner failures.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// An explicit selection must never silently produce an empty plan.
    #[error("EMPTY_SELECTION: explicit selection contains no items")]
    EmptySelection,
}

/// One entry of the user's explicit selection (or of the inferred pending
/// set), before the planner has resolved it.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedItem {
    pub kind: ItemKind,
    pub type_id: String,
    pub scope: ItemScope,
    #[serde(default)]
    pub company_key: Option<String>,
    #[serde(default)]
    pub person_key: Option<String>,
    #[serde(default)]
    pub period_key: Option<String>,
    #[serde(default)]
    pub suggested_doc_id: Option<String>,
}

pub struct SubmissionPlanner {
    store: Arc<dyn DocumentStore>,
}

impl SubmissionPlanner {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Build a plan for `scope` from an explicit `selection`.
    ///
    /// Every selected item lands in the plan with a status; the global
    /// decision is aggregated per the plan invariant.
    pub async fn build_plan(
        &self,
        scope: ScopeContext,
        selection: Vec<SelectedItem>,
    ) -> Result<SubmissionPlan, PlanError> {
        if selection.is_empty() {
            return Err(PlanError::EmptySelection);
        }

        let mut items = Vec::with_capacity(selection.len());
        for selected in selection {
            let item = self.build_item(&scope, selected).await;
            debug!(type_id = %item.type_id, status = ?item.status, reason = %item.reason, "planned item");
            items.push(item);
        }

        Ok(SubmissionPlan::assemble(scope, items))
    }

    /// Rank `candidates` for `target` and return the best suggestion with its
    /// justification. Pure pass-through to the ranker at the current instant.
    pub fn suggest(target: &RankTarget, candidates: &[CandidateDoc]) -> Option<(String, String)> {
        ranker::best_match(target, candidates, Utc::now())
    }

    async fn build_item(&self, scope: &ScopeContext, sel: SelectedItem) -> SubmissionItem {
        let mut item = SubmissionItem {
            kind: sel.kind,
            type_id: sel.type_id,
            scope: sel.scope,
            company_key: sel.company_key,
            person_key: sel.person_key,
            period_key: sel.period_key,
            suggested_doc_id: sel.suggested_doc_id,
            resolved_dates: None,
            status: ItemStatus::Planned,
            reason: String::new(),
        };

        // Scope may restrict which document types are in play at all.
        if !scope.type_ids.is_empty() && !scope.type_ids.contains(&item.type_id) {
            return blocked(item, "document type not allowed by this scope");
        }

        // Subject completeness per item scope.
        match item.scope {
            ItemScope::Company if item.company_key.is_none() => {
                return blocked(item, "company-scope item requires a company key");
            }
            ItemScope::Worker if item.company_key.is_none() || item.person_key.is_none() => {
                return blocked(item, "worker-scope item requires company and person keys");
            }
            _ => {}
        }

        // Without an assigned suggestion the plan can exist but not execute.
        let doc_id = match item.suggested_doc_id.clone() {
            Some(id) => id,
            None => return needs_confirmation(item, "suggestion not yet assigned"),
        };

        let doc = match self.store.get_document(&doc_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return blocked(item, "suggested document not found in store"),
            Err(e) => return blocked(item, &format!("document store error: {e}")),
        };
        match self.store.file_exists(&doc_id).await {
            Ok(true) => {}
            Ok(false) => return blocked(item, "document file is not available"),
            Err(e) => return blocked(item, &format!("document store error: {e}")),
        }

        // A document's own validity window is not transferable across
        // periods: when the target period differs, re-resolve for it.
        let resolution = match (&item.period_key, &doc.period_key) {
            (Some(target_period), doc_period) if doc_period.as_deref() != Some(target_period) => {
                self.store
                    .resolve_period_dates(&doc.type_id, target_period)
                    .await
            }
            _ => self.store.resolve_dates(&doc).await,
        };

        match resolution {
            Ok(res) => {
                item.resolved_dates = Some(res.dates);
                if res.needs_confirmation {
                    let reason = if res.reasons.is_empty() {
                        "validity dates need confirmation".to_string()
                    } else {
                        res.reasons.join("; ")
                    };
                    needs_confirmation(item, &reason)
                } else {
                    let reason = if res.reasons.is_empty() {
                        "ready to submit".to_string()
                    } else {
                        res.reasons.join("; ")
                    };
                    item.reason = reason;
                    item
                }
            }
            Err(e) => blocked(item, &format!("date resolution failed: {e}")),
        }
    }
}

fn blocked(mut item: SubmissionItem, reason: &str) -> SubmissionItem {
    item.status = ItemStatus::Blocked;
    item.reason = reason.to_string();
    item
}

fn needs_confirmation(mut item: SubmissionItem, reason: &str) -> SubmissionItem {
    item.status = ItemStatus::NeedsConfirmation;
    item.reason = reason.to_string();
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::{DocumentRecord, InMemoryDocumentStore, TypePolicy};
    use crate::planner::model::{Decision, Mode};
    use chrono::NaiveDate;

    fn scope() -> ScopeContext {
        ScopeContext {
            platform: "egestiona".to_string(),
            type_ids: vec!["ITA".to_string(), "RC".to_string()],
            company_key: Some("C-1".to_string()),
            person_key: None,
            period_keys: vec![],
            mode: Mode::PrepareWrite,
        }
    }

    fn selection(suggested: Option<&str>) -> SelectedItem {
        SelectedItem {
            kind: ItemKind::ExplicitInstance,
            type_id: "ITA".to_string(),
            scope: ItemScope::Company,
            company_key: Some("C-1".to_string()),
            person_key: None,
            period_key: Some("2026-07".to_string()),
            suggested_doc_id: suggested.map(str::to_string),
        }
    }

    fn record(doc_id: &str, period: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            doc_id: doc_id.to_string(),
            type_id: "ITA".to_string(),
            company_key: Some("C-1".to_string()),
            person_key: None,
            period_key: period.map(str::to_string),
            status: "reviewed".to_string(),
            updated_at: None,
        }
    }

    fn planner_with(store: InMemoryDocumentStore) -> SubmissionPlanner {
        SubmissionPlanner::new(Arc::new(store))
    }

    #[tokio::test]
    async fn empty_selection_is_a_request_error() {
        let planner = planner_with(InMemoryDocumentStore::new());
        let err = planner.build_plan(scope(), vec![]).await.unwrap_err();
        assert!(err.to_string().starts_with("EMPTY_SELECTION"));
    }

    #[tokio::test]
    async fn missing_subject_blocks_item_not_request() {
        let planner = planner_with(InMemoryDocumentStore::new());
        let mut incomplete = selection(None);
        incomplete.company_key = None;
        let plan = planner
            .build_plan(scope(), vec![incomplete, selection(None)])
            .await
            .unwrap();
        assert_eq!(plan.items[0].status, ItemStatus::Blocked);
        assert_eq!(plan.items[1].status, ItemStatus::NeedsConfirmation);
        assert_eq!(plan.decision, Decision::Blocked);
    }

    #[tokio::test]
    async fn worker_scope_requires_both_keys() {
        let planner = planner_with(InMemoryDocumentStore::new());
        let mut worker = selection(None);
        worker.scope = ItemScope::Worker;
        worker.person_key = None;
        let plan = planner.build_plan(scope(), vec![worker]).await.unwrap();
        assert_eq!(plan.items[0].status, ItemStatus::Blocked);
        assert!(plan.items[0].reason.contains("company and person"));
    }

    #[tokio::test]
    async fn unassigned_suggestion_needs_confirmation() {
        let planner = planner_with(InMemoryDocumentStore::new());
        let plan = planner.build_plan(scope(), vec![selection(None)]).await.unwrap();
        assert_eq!(plan.decision, Decision::NeedsConfirmation);
        assert_eq!(plan.items[0].reason, "suggestion not yet assigned");
    }

    #[tokio::test]
    async fn missing_document_or_file_blocks() {
        let store = InMemoryDocumentStore::new();
        store.insert(record("no-file", Some("2026-07")), false).await;
        let planner = planner_with(store);
        let plan = planner
            .build_plan(scope(), vec![selection(Some("ghost")), selection(Some("no-file"))])
            .await
            .unwrap();
        assert_eq!(plan.items[0].status, ItemStatus::Blocked);
        assert!(plan.items[0].reason.contains("not found"));
        assert_eq!(plan.items[1].status, ItemStatus::Blocked);
        assert!(plan.items[1].reason.contains("not available"));
    }

    #[tokio::test]
    async fn resolved_item_is_planned_with_dates() {
        let store = InMemoryDocumentStore::new();
        store.insert(record("d1", Some("2026-07")), true).await;
        let planner = planner_with(store);
        let plan = planner.build_plan(scope(), vec![selection(Some("d1"))]).await.unwrap();
        assert_eq!(plan.decision, Decision::Ready);
        let dates = plan.items[0].resolved_dates.as_ref().expect("dates");
        assert_eq!(dates.valid_from, NaiveDate::from_ymd_opt(2026, 7, 1));
        assert_eq!(dates.valid_to, NaiveDate::from_ymd_opt(2026, 7, 31));
    }

    #[tokio::test]
    async fn period_mismatch_re_resolves_for_the_item_period() {
        let store = InMemoryDocumentStore::new();
        // Document belongs to January; the item targets July.
        store.insert(record("jan-doc", Some("2026-01")), true).await;
        let planner = planner_with(store);
        let plan = planner
            .build_plan(scope(), vec![selection(Some("jan-doc"))])
            .await
            .unwrap();
        let dates = plan.items[0].resolved_dates.as_ref().expect("dates");
        assert_eq!(dates.valid_from, NaiveDate::from_ymd_opt(2026, 7, 1));
    }

    #[tokio::test]
    async fn external_start_policy_needs_confirmation() {
        let store = InMemoryDocumentStore::new();
        store
            .set_policy("ITA", TypePolicy { requires_external_start: true })
            .await;
        store.insert(record("d1", Some("2026-07")), true).await;
        let planner = planner_with(store);
        let plan = planner.build_plan(scope(), vec![selection(Some("d1"))]).await.unwrap();
        assert_eq!(plan.decision, Decision::NeedsConfirmation);
        assert!(plan.items[0].reason.contains("supplied externally"));
    }

    #[test]
    fn suggest_picks_the_best_candidate_with_justification() {
        use crate::planner::ranker::{CandidateDoc, RankTarget};
        let target = RankTarget {
            type_id: "ITA".to_string(),
            scope: ItemScope::Company,
            company_key: Some("C-1".to_string()),
            person_key: None,
            period_key: None,
        };
        let candidates = vec![
            CandidateDoc {
                doc_id: "other-company".to_string(),
                type_id: "ITA".to_string(),
                company_key: Some("C-9".to_string()),
                person_key: None,
                period_key: None,
                status: "draft".to_string(),
                updated_at: None,
            },
            CandidateDoc {
                doc_id: "ours".to_string(),
                type_id: "ITA".to_string(),
                company_key: Some("C-1".to_string()),
                person_key: None,
                period_key: None,
                status: "draft".to_string(),
                updated_at: None,
            },
        ];
        let (doc_id, reason) = SubmissionPlanner::suggest(&target, &candidates).expect("suggestion");
        assert_eq!(doc_id, "ours");
        assert!(reason.contains("Coincide empresa"));
    }

    #[tokio::test]
    async fn type_outside_scope_is_blocked() {
        let planner = planner_with(InMemoryDocumentStore::new());
        let mut foreign = selection(None);
        foreign.type_id = "PAYROLL".to_string();
        let plan = planner.build_plan(scope(), vec![foreign]).await.unwrap();
        assert_eq!(plan.items[0].status, ItemStatus::Blocked);
        assert!(plan.items[0].reason.contains("not allowed"));
    }
}
