//! Challenge gate — short-lived confirmation secrets for execution-class
//! actions.
//!
//! A challenge binds one token to one plan. The caller must echo the literal
//! response text back before anything side-effecting is allowed to run.
//! Tokens are consumed on first successful validation and expired files are
//! swept whenever a new challenge is issued.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::planner::model::{Decision, SubmissionPlan};

/// How long a challenge stays valid after creation.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Challenge validation and issuance failures. Messages carry stable codes.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("PLAN_NOT_READY: plan decision is {0:?}; only READY plans can be confirmed")]
    PlanNotReady(Decision),
    #[error("MODE_NOT_WRITE: plan scope is read-only; confirmation refused")]
    ModeNotWrite,
    #[error("CHALLENGE_INVALID: challenge token unknown or expired")]
    UnknownToken,
    #[error("CHALLENGE_EXPIRED: challenge expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("CHALLENGE_PLAN_MISMATCH: challenge was issued for plan {issued_for}, not {requested}")]
    PlanMismatch { issued_for: String, requested: String },
    #[error("CHALLENGE_RESPONSE_INCORRECT: response text does not match the expected literal")]
    ResponseIncorrect,
    #[error("challenge store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("challenge file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A persisted confirmation challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_token: String,
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The exact text the caller must echo back.
    pub expected_response: String,
}

impl Challenge {
    /// Prompt shown to the caller alongside the token.
    pub fn prompt(&self) -> String {
        format!(
            "To authorize execution of plan {}, reply within {} minutes with the exact text: {}",
            self.plan_id,
            CHALLENGE_TTL.as_secs() / 60,
            self.expected_response
        )
    }
}

pub struct ChallengeGate {
    dir: PathBuf,
    ttl: chrono::Duration,
}

impl ChallengeGate {
    pub fn new(data_dir: &Path) -> Self {
        Self::with_ttl(data_dir, CHALLENGE_TTL)
    }

    /// Gate with a non-default TTL. Tests use this to exercise expiry.
    pub fn with_ttl(data_dir: &Path, ttl: Duration) -> Self {
        Self {
            dir: data_dir.join("challenges"),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Issue a challenge for a plan.
    ///
    /// Only legal when the plan is `READY` and its scope permits execution;
    /// anything else is a conflict.
    pub async fn create_challenge(&self, plan: &SubmissionPlan) -> Result<Challenge, GateError> {
        if plan.decision != Decision::Ready {
            return Err(GateError::PlanNotReady(plan.decision));
        }
        if !plan.scope.mode.allows_execution() {
            return Err(GateError::ModeNotWrite);
        }

        self.sweep_expired().await;

        let now = Utc::now();
        let challenge = Challenge {
            challenge_token: new_token(),
            plan_id: plan.plan_id.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            expected_response: format!("EXECUTE {}", plan.plan_id),
        };

        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&challenge.challenge_token);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&challenge)?).await?;
        fs::rename(&tmp, &path).await?;

        debug!(plan_id = %challenge.plan_id, expires_at = %challenge.expires_at, "challenge issued");
        Ok(challenge)
    }

    /// Validate an echoed response against a stored challenge.
    ///
    /// Failure order: unknown token, expiry, plan mismatch, response
    /// mismatch. On success the token is consumed — a second validation with
    /// the same token fails as unknown.
    pub async fn validate(
        &self,
        token: &str,
        response: &str,
        plan_id: &str,
    ) -> Result<(), GateError> {
        let challenge = match self.read_challenge(token).await? {
            Some(c) => c,
            None => return Err(GateError::UnknownToken),
        };

        if Utc::now() > challenge.expires_at {
            return Err(GateError::Expired(challenge.expires_at));
        }
        if challenge.plan_id != plan_id {
            return Err(GateError::PlanMismatch {
                issued_for: challenge.plan_id,
                requested: plan_id.to_string(),
            });
        }
        if response != challenge.expected_response {
            return Err(GateError::ResponseIncorrect);
        }

        // Consume on first use: a confirmation secret is never replayable.
        if let Err(e) = fs::remove_file(self.path_for(token)).await {
            warn!(err = %e, "failed to consume challenge file");
        }
        Ok(())
    }

    fn path_for(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.json"))
    }

    async fn read_challenge(&self, token: &str) -> Result<Option<Challenge>, GateError> {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        let raw = match fs::read_to_string(self.path_for(token)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Best-effort removal of expired challenge files.
    async fn sweep_expired(&self) {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let now = Utc::now();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(raw) = fs::read_to_string(&path).await else { continue };
            let Ok(challenge) = serde_json::from_str::<Challenge>(&raw) else { continue };
            if now > challenge.expires_at {
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), err = %e, "failed to sweep expired challenge");
                }
            }
        }
    }
}

/// 32 random bytes from the OS RNG, hex-encoded — 256 bits of entropy.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
