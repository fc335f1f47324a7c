//! Document store capability seam.
//!
//! The real content store (files, hashes, OCR date extraction) lives outside
//! this daemon. The planner only needs the four operations below; the
//! in-memory implementation backs tests and simulated deployments.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::planner::model::ResolvedDates;

// ─── Types ───────────────────────────────────────────────────────────────────

/// A document as the store describes it.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub type_id: String,
    pub company_key: Option<String>,
    pub person_key: Option<String>,
    pub period_key: Option<String>,
    pub status: String,
    pub updated_at: Option<String>,
}

/// Outcome of a date-resolution request.
#[derive(Debug, Clone, Default)]
pub struct DateResolution {
    pub dates: ResolvedDates,
    pub reasons: Vec<String>,
    /// `true` when the document type's validity policy needs an externally
    /// supplied start date that could not be resolved.
    pub needs_confirmation: bool,
}

/// Validity policy for a document type, as known to the in-memory store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypePolicy {
    /// The validity window starts at an externally supplied date (e.g. a
    /// training completion date) rather than at the period boundary.
    pub requires_external_start: bool,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up a document by id. `None` when the store has no such record.
    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>>;

    /// Whether the underlying file for the document is actually available.
    async fn file_exists(&self, doc_id: &str) -> Result<bool>;

    /// Resolve the validity window for a document against its own period.
    async fn resolve_dates(&self, doc: &DocumentRecord) -> Result<DateResolution>;

    /// Resolve the validity window a document of `type_id` would have for
    /// `period_key`. Used when a document's own period differs from the
    /// item's target period — a validity window is not transferable across
    /// periods.
    async fn resolve_period_dates(&self, type_id: &str, period_key: &str) -> Result<DateResolution>;
}

// ─── In-memory implementation ────────────────────────────────────────────────

struct StoredDoc {
    record: DocumentRecord,
    file_present: bool,
}

/// Simple in-memory store: documents keyed by id, plus per-type policies.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<String, StoredDoc>>,
    policies: RwLock<HashMap<String, TypePolicy>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: DocumentRecord, file_present: bool) {
        self.docs
            .write()
            .await
            .insert(record.doc_id.clone(), StoredDoc { record, file_present });
    }

    pub async fn set_policy(&self, type_id: &str, policy: TypePolicy) {
        self.policies.write().await.insert(type_id.to_string(), policy);
    }

    async fn policy_for(&self, type_id: &str) -> TypePolicy {
        self.policies
            .read()
            .await
            .get(type_id)
            .copied()
            .unwrap_or_default()
    }

    fn period_window(period_key: &str) -> Option<(NaiveDate, NaiveDate)> {
        // Period keys are `YYYY-MM`. The window spans the whole month.
        let (year, month) = period_key.split_once('-')?;
        let year: i32 = year.parse().ok()?;
        let month: u32 = month.parse().ok()?;
        let from = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some((from, next.pred_opt()?))
    }

    fn resolution_for(policy: TypePolicy, period_key: Option<&str>) -> DateResolution {
        if policy.requires_external_start {
            return DateResolution {
                dates: ResolvedDates::default(),
                reasons: vec!["validity start date must be supplied externally".to_string()],
                needs_confirmation: true,
            };
        }
        match period_key.and_then(Self::period_window) {
            Some((from, to)) => DateResolution {
                dates: ResolvedDates {
                    issued_at: None,
                    valid_from: Some(from),
                    valid_to: Some(to),
                },
                reasons: vec![format!("validity window derived from period {}", period_key.unwrap_or(""))],
                needs_confirmation: false,
            },
            None => DateResolution {
                dates: ResolvedDates::default(),
                reasons: vec!["document has no period; validity left open".to_string()],
                needs_confirmation: false,
            },
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.docs.read().await.get(doc_id).map(|d| d.record.clone()))
    }

    async fn file_exists(&self, doc_id: &str) -> Result<bool> {
        Ok(self
            .docs
            .read()
            .await
            .get(doc_id)
            .map(|d| d.file_present)
            .unwrap_or(false))
    }

    async fn resolve_dates(&self, doc: &DocumentRecord) -> Result<DateResolution> {
        let policy = self.policy_for(&doc.type_id).await;
        Ok(Self::resolution_for(policy, doc.period_key.as_deref()))
    }

    async fn resolve_period_dates(&self, type_id: &str, period_key: &str) -> Result<DateResolution> {
        let policy = self.policy_for(type_id).await;
        Ok(Self::resolution_for(policy, Some(period_key)))
    }
}

/// Shared trait object used across the planner and the app context.
pub type SharedDocumentStore = Arc<dyn DocumentStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc_id: &str, type_id: &str, period: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            doc_id: doc_id.to_string(),
            type_id: type_id.to_string(),
            company_key: Some("C-1".to_string()),
            person_key: None,
            period_key: period.map(str::to_string),
            status: "reviewed".to_string(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn missing_document_is_none_and_file_absent() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get_document("nope").await.unwrap().is_none());
        assert!(!store.file_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn period_window_spans_the_month() {
        let store = InMemoryDocumentStore::new();
        let res = store.resolve_period_dates("ITA", "2026-02").await.unwrap();
        assert!(!res.needs_confirmation);
        assert_eq!(res.dates.valid_from, NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(res.dates.valid_to, NaiveDate::from_ymd_opt(2026, 2, 28));
    }

    #[tokio::test]
    async fn december_window_rolls_into_next_year() {
        let store = InMemoryDocumentStore::new();
        let res = store.resolve_period_dates("ITA", "2026-12").await.unwrap();
        assert_eq!(res.dates.valid_to, NaiveDate::from_ymd_opt(2026, 12, 31));
    }

    #[tokio::test]
    async fn external_start_policy_needs_confirmation() {
        let store = InMemoryDocumentStore::new();
        store
            .set_policy("FORM", TypePolicy { requires_external_start: true })
            .await;
        store.insert(record("d1", "FORM", Some("2026-07")), true).await;
        let doc = store.get_document("d1").await.unwrap().unwrap();
        let res = store.resolve_dates(&doc).await.unwrap();
        assert!(res.needs_confirmation);
        assert!(res.dates.valid_from.is_none());
    }
}
