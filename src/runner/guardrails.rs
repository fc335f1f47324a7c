//! Pre-flight guardrails — hard safety limits checked immediately before any
//! side-effecting action, independent of the plan's own decision.
//!
//! Every check is a hard stop with a stable error code; violations are never
//! downgraded. The subject allowlist and the single-upload/single-type caps
//! are last-line defenses for the early rollout and live in code, not
//! configuration.

use serde::Serialize;

use crate::planner::model::{Decision, ItemStatus, SubmissionPlan};

// ─── Error codes ─────────────────────────────────────────────────────────────

pub const PLAN_NOT_READY: &str = "PLAN_NOT_READY";
pub const PLATFORM_MISMATCH: &str = "PLATFORM_MISMATCH";
pub const MODE_NOT_WRITE: &str = "MODE_NOT_WRITE";
pub const ITEM_NOT_PLANNED: &str = "ITEM_NOT_PLANNED";
pub const REAL_UPLOAD_GUARDRAIL_VIOLATION: &str = "REAL_UPLOAD_GUARDRAIL_VIOLATION";
pub const UPLOAD_LIMIT_EXCEEDED: &str = "UPLOAD_LIMIT_EXCEEDED";
pub const TYPE_NOT_ALLOWLISTED: &str = "TYPE_NOT_ALLOWLISTED";
pub const SUBJECT_NOT_ALLOWLISTED: &str = "SUBJECT_NOT_ALLOWLISTED";
pub const SUGGESTED_DOC_REQUIRED: &str = "SUGGESTED_DOC_REQUIRED";

/// A failed guardrail check. Rendered as `CODE: message`.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailViolation {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for GuardrailViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A passed check, recorded in the run manifest's decision trail.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailCheck {
    pub name: &'static str,
    pub detail: String,
}

// ─── Guardrail configuration ─────────────────────────────────────────────────

/// Hard-coded execution limits.
#[derive(Debug, Clone)]
pub struct Guardrails {
    /// The one portal platform this deployment may write to.
    pub platform: String,
    /// Pre-approved company subject keys.
    pub allowed_company_keys: Vec<String>,
    /// Pre-approved worker subject keys.
    pub allowed_person_keys: Vec<String>,
    /// Maximum items a real run may carry. Locked to 1 during rollout.
    pub max_uploads: usize,
    /// Document types a real run may touch. Locked to a single type.
    pub allowlist_type_ids: Vec<String>,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            platform: "egestiona".to_string(),
            allowed_company_keys: vec!["B12345678".to_string()],
            allowed_person_keys: vec!["12345678Z".to_string()],
            max_uploads: 1,
            allowlist_type_ids: vec!["ITA".to_string()],
        }
    }
}

/// Validate `plan` against the guardrails.
///
/// `simulated` runs skip the subject allowlist and the mandatory-suggestion
/// rule; everything else applies to every run. Returns the passed checks for
/// the evidence manifest.
pub fn validate(
    plan: &SubmissionPlan,
    simulated: bool,
    rails: &Guardrails,
) -> Result<Vec<GuardrailCheck>, GuardrailViolation> {
    let mut passed = Vec::new();

    if plan.decision != Decision::Ready {
        return Err(GuardrailViolation {
            code: PLAN_NOT_READY,
            message: format!("plan decision is {:?}", plan.decision),
        });
    }
    passed.push(GuardrailCheck {
        name: PLAN_NOT_READY,
        detail: "plan decision is READY".to_string(),
    });

    if plan.scope.platform != rails.platform {
        return Err(GuardrailViolation {
            code: PLATFORM_MISMATCH,
            message: format!(
                "plan targets platform {:?}, executor is locked to {:?}",
                plan.scope.platform, rails.platform
            ),
        });
    }
    passed.push(GuardrailCheck {
        name: PLATFORM_MISMATCH,
        detail: format!("platform {}", rails.platform),
    });

    if !plan.scope.mode.allows_execution() {
        return Err(GuardrailViolation {
            code: MODE_NOT_WRITE,
            message: "plan scope mode does not permit execution".to_string(),
        });
    }
    passed.push(GuardrailCheck {
        name: MODE_NOT_WRITE,
        detail: format!("mode {:?}", plan.scope.mode),
    });

    for (index, item) in plan.items.iter().enumerate() {
        if item.status != ItemStatus::Planned {
            return Err(GuardrailViolation {
                code: ITEM_NOT_PLANNED,
                message: format!(
                    "item {index} ({}) has status {:?}",
                    item.type_id, item.status
                ),
            });
        }
    }
    passed.push(GuardrailCheck {
        name: ITEM_NOT_PLANNED,
        detail: format!("all {} item(s) PLANNED", plan.items.len()),
    });

    if !simulated {
        // The real-upload gate is only sane in its locked-down rollout shape.
        // Any other configuration is rejected outright, regardless of the
        // plan's contents.
        if rails.max_uploads != 1 || rails.allowlist_type_ids.len() != 1 {
            return Err(GuardrailViolation {
                code: REAL_UPLOAD_GUARDRAIL_VIOLATION,
                message: format!(
                    "real uploads require max_uploads == 1 and exactly one allow-listed type (got {} / {})",
                    rails.max_uploads,
                    rails.allowlist_type_ids.len()
                ),
            });
        }
        passed.push(GuardrailCheck {
            name: REAL_UPLOAD_GUARDRAIL_VIOLATION,
            detail: "single-upload, single-type gate intact".to_string(),
        });

        if plan.items.len() > rails.max_uploads {
            return Err(GuardrailViolation {
                code: UPLOAD_LIMIT_EXCEEDED,
                message: format!(
                    "plan carries {} items; real runs are capped at {}",
                    plan.items.len(),
                    rails.max_uploads
                ),
            });
        }

        for item in &plan.items {
            if !rails.allowlist_type_ids.contains(&item.type_id) {
                return Err(GuardrailViolation {
                    code: TYPE_NOT_ALLOWLISTED,
                    message: format!("document type {:?} is not allow-listed", item.type_id),
                });
            }
            let company_ok = item
                .company_key
                .as_ref()
                .is_some_and(|k| rails.allowed_company_keys.contains(k));
            let person_ok = match &item.person_key {
                Some(p) => rails.allowed_person_keys.contains(p),
                None => true,
            };
            if !company_ok || !person_ok {
                return Err(GuardrailViolation {
                    code: SUBJECT_NOT_ALLOWLISTED,
                    message: format!(
                        "subject {:?}/{:?} is outside the pre-approved allowlist",
                        item.company_key, item.person_key
                    ),
                });
            }
            // Heuristic matching is forbidden for real side effects.
            if item.suggested_doc_id.is_none() {
                return Err(GuardrailViolation {
                    code: SUGGESTED_DOC_REQUIRED,
                    message: format!(
                        "item {:?} has no assigned document; real uploads refuse heuristic matches",
                        item.type_id
                    ),
                });
            }
        }
        passed.push(GuardrailCheck {
            name: SUBJECT_NOT_ALLOWLISTED,
            detail: "all subjects pre-approved".to_string(),
        });
        passed.push(GuardrailCheck {
            name: SUGGESTED_DOC_REQUIRED,
            detail: "all items carry an assigned document".to_string(),
        });
    }

    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::model::{
        ItemKind, ItemScope, Mode, ScopeContext, SubmissionItem, SubmissionPlan,
    };

    fn rails() -> Guardrails {
        Guardrails::default()
    }

    fn item() -> SubmissionItem {
        SubmissionItem {
            kind: ItemKind::ExplicitInstance,
            type_id: "ITA".to_string(),
            scope: ItemScope::Company,
            company_key: Some("B12345678".to_string()),
            person_key: None,
            period_key: None,
            suggested_doc_id: Some("d1".to_string()),
            resolved_dates: None,
            status: ItemStatus::Planned,
            reason: String::new(),
        }
    }

    fn plan_with(items: Vec<SubmissionItem>, mode: Mode) -> SubmissionPlan {
        SubmissionPlan::assemble(
            ScopeContext {
                platform: "egestiona".to_string(),
                type_ids: vec!["ITA".to_string()],
                company_key: Some("B12345678".to_string()),
                person_key: None,
                period_keys: vec![],
                mode,
            },
            items,
        )
    }

    #[test]
    fn ready_allowlisted_single_item_plan_passes() {
        let plan = plan_with(vec![item()], Mode::Write);
        let checks = validate(&plan, false, &rails()).expect("passes");
        assert!(checks.iter().any(|c| c.name == SUBJECT_NOT_ALLOWLISTED));
    }

    #[test]
    fn non_ready_plan_is_blocked_first() {
        let mut degraded = item();
        degraded.status = ItemStatus::NeedsConfirmation;
        let plan = plan_with(vec![degraded], Mode::Write);
        let err = validate(&plan, false, &rails()).unwrap_err();
        assert_eq!(err.code, PLAN_NOT_READY);
    }

    #[test]
    fn wrong_platform_and_wrong_mode_are_rejected() {
        let mut plan = plan_with(vec![item()], Mode::Write);
        plan.scope.platform = "other-portal".to_string();
        assert_eq!(validate(&plan, false, &rails()).unwrap_err().code, PLATFORM_MISMATCH);

        let plan = plan_with(vec![item()], Mode::ReadOnly);
        assert_eq!(validate(&plan, false, &rails()).unwrap_err().code, MODE_NOT_WRITE);
    }

    #[test]
    fn widened_guardrail_config_trips_the_real_upload_gate() {
        let plan = plan_with(vec![item()], Mode::Write);

        let mut widened = rails();
        widened.max_uploads = 5;
        let err = validate(&plan, false, &widened).unwrap_err();
        assert_eq!(err.code, REAL_UPLOAD_GUARDRAIL_VIOLATION);

        let mut widened = rails();
        widened.allowlist_type_ids.push("RC".to_string());
        let err = validate(&plan, false, &widened).unwrap_err();
        assert_eq!(err.code, REAL_UPLOAD_GUARDRAIL_VIOLATION);

        // A simulated run ignores the real-upload gate entirely.
        let mut widened = rails();
        widened.max_uploads = 5;
        assert!(validate(&plan, true, &widened).is_ok());
    }

    #[test]
    fn subject_outside_allowlist_is_rejected_unless_simulated() {
        let mut stranger = item();
        stranger.company_key = Some("B99999999".to_string());
        let plan = plan_with(vec![stranger], Mode::Write);
        assert_eq!(
            validate(&plan, false, &rails()).unwrap_err().code,
            SUBJECT_NOT_ALLOWLISTED
        );
        assert!(validate(&plan, true, &rails()).is_ok());
    }

    #[test]
    fn missing_suggestion_is_rejected_for_real_writes() {
        let mut unassigned = item();
        unassigned.suggested_doc_id = None;
        let plan = plan_with(vec![unassigned], Mode::Write);
        assert_eq!(
            validate(&plan, false, &rails()).unwrap_err().code,
            SUGGESTED_DOC_REQUIRED
        );
    }

    #[test]
    fn type_outside_allowlist_is_rejected() {
        let mut foreign = item();
        foreign.type_id = "RC".to_string();
        let plan = plan_with(vec![foreign], Mode::Write);
        assert_eq!(
            validate(&plan, false, &rails()).unwrap_err().code,
            TYPE_NOT_ALLOWLISTED
        );
    }

    #[test]
    fn upload_limit_applies_to_real_runs() {
        let plan = plan_with(vec![item(), item()], Mode::Write);
        assert_eq!(
            validate(&plan, false, &rails()).unwrap_err().code,
            UPLOAD_LIMIT_EXCEEDED
        );
        assert!(validate(&plan, true, &rails()).is_ok());
    }
}
