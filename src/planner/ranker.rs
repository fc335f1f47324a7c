//! Candidate ranking — pure scoring of candidate documents against a target.
//!
//! Deterministic: no I/O, no randomness, no learned weights. The clock is
//! injected so recency scoring is reproducible in tests. Reason fragments are
//! in the portal's locale (Spanish) because they surface verbatim in the
//! user-facing suggestion UI.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::model::ItemScope;

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// The requirement a candidate document is scored against.
#[derive(Debug, Clone)]
pub struct RankTarget {
    pub type_id: String,
    pub scope: ItemScope,
    pub company_key: Option<String>,
    pub person_key: Option<String>,
    pub period_key: Option<String>,
}

/// A candidate document as seen by the ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDoc {
    pub doc_id: String,
    pub type_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_key: Option<String>,
    /// Free-form review status string from the document store.
    pub status: String,
    /// Last-modified timestamp (RFC 3339 or `YYYY-MM-DD`). Unparseable
    /// values contribute no recency bonus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// A scored candidate. Ordering within a ranking is total score descending,
/// ties broken by input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub doc_id: String,
    pub score: i64,
    /// Ordered concatenation of the triggered reason fragments.
    pub reason: String,
}

// Score weights. Type match is a hard filter, not a weight.
const BASE_TYPE_MATCH: i64 = 100;
const SUBJECT_EXACT: i64 = 50;
const SUBJECT_COMPANY_FALLBACK: i64 = 25;
const PERIOD_EXACT: i64 = 30;
const RECENCY_MAX: i64 = 60;
const RECENCY_DECAY_PER_MONTH: i64 = 10;
const STATUS_REVIEWED: i64 = 20;

/// Rank `candidates` against `target` at the injected instant `now`.
///
/// Candidates whose `type_id` differs from the target are discarded outright
/// — a type mismatch is never a partial match.
pub fn rank(target: &RankTarget, candidates: &[CandidateDoc], now: DateTime<Utc>) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .filter(|c| c.type_id == target.type_id)
        .map(|c| score_candidate(target, c, now))
        .collect();
    // Stable sort: equal scores keep input order.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Rank and return the best candidate as `(doc_id, reason)`, or `None` when
/// no candidate survives the type filter.
pub fn best_match(
    target: &RankTarget,
    candidates: &[CandidateDoc],
    now: DateTime<Utc>,
) -> Option<(String, String)> {
    rank(target, candidates, now)
        .into_iter()
        .next()
        .map(|r| (r.doc_id, r.reason))
}

fn score_candidate(target: &RankTarget, c: &CandidateDoc, now: DateTime<Utc>) -> RankedCandidate {
    let mut score = BASE_TYPE_MATCH;
    let mut reasons = vec!["Coincide tipo".to_string()];

    // Subject match.
    match target.scope {
        ItemScope::Worker => {
            if keys_match(&target.person_key, &c.person_key) {
                score += SUBJECT_EXACT;
                reasons.push("Coincide trabajador".to_string());
            } else if keys_match(&target.company_key, &c.company_key) {
                // Company-level document offered for a worker requirement —
                // a weaker signal than a per-worker match.
                score += SUBJECT_COMPANY_FALLBACK;
                reasons.push("Coincide empresa".to_string());
            }
        }
        ItemScope::Company => {
            if keys_match(&target.company_key, &c.company_key) {
                score += SUBJECT_EXACT;
                reasons.push("Coincide empresa".to_string());
            }
        }
    }

    // Period match. A distinct period is noted but carries no numeric
    // penalty — exact matches simply score higher.
    if let Some(period) = &target.period_key {
        if c.period_key.as_deref() == Some(period.as_str()) {
            score += PERIOD_EXACT;
            reasons.push("Coincide período".to_string());
        } else {
            reasons.push("Período distinto".to_string());
        }
    }

    // Recency: full bonus inside the current month, decaying per whole month.
    if let Some(updated) = c.updated_at.as_deref().and_then(parse_timestamp) {
        let months = whole_months_between(updated, now);
        let bonus = (RECENCY_MAX - RECENCY_DECAY_PER_MONTH * months).max(0);
        if bonus > 0 {
            score += bonus;
            reasons.push("Reciente".to_string());
        }
    }

    // Reviewed/submitted/valid documents beat drafts.
    let status = c.status.to_lowercase();
    if ["reviewed", "submitted", "valid"].iter().any(|s| status.contains(s)) {
        score += STATUS_REVIEWED;
        reasons.push("Estado revisado".to_string());
    }

    RankedCandidate {
        doc_id: c.doc_id.clone(),
        score,
        reason: reasons.join("; "),
    }
}

fn keys_match(target: &Option<String>, candidate: &Option<String>) -> bool {
    matches!((target, candidate), (Some(t), Some(c)) if t == c)
}

/// Parse an `updated_at` value: RFC 3339 first, then a bare `YYYY-MM-DD` date.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Whole calendar months from `from` to `to`; never negative.
fn whole_months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let mut months =
        i64::from(to.year() - from.year()) * 12 + i64::from(to.month()) - i64::from(from.month());
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0)
}
