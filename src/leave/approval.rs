use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};

use super::balance::{BalanceError, BalanceLedger};
use super::directory::TeamDirectory;
use super::domain::{
    DecisionAction, LeaveRequest, LeaveStatus, RequestId, TeamId, UserId,
};
use super::store::{LeaveRequestStore, StatusTransition, StoreError};

/// How long a consumed idempotency token keeps replaying its outcome.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A manager's verdict on a pending request.
#[derive(Debug, Clone)]
pub struct LeaveDecision {
    pub request: RequestId,
    pub action: DecisionAction,
    pub comments: Option<String>,
    /// Caller-supplied replay token. A decision carrying a token that was
    /// already consumed for the same request returns the recorded outcome
    /// instead of re-deciding.
    pub idempotency_token: Option<String>,
}

/// Result of a decision. `replayed` distinguishes a fresh state change from
/// an idempotent replay so callers can suppress duplicate side effects.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub request: LeaveRequest,
    pub replayed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("leave request {0} not found")]
    NotFound(RequestId),
    #[error("request {id} is {status:?} and cannot be decided")]
    InvalidTransition { id: RequestId, status: LeaveStatus },
    #[error("caller does not manage team {0}")]
    NotTeamManager(TeamId),
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error(transparent)]
    Store(StoreError),
}

struct RecordedDecision {
    request: RequestId,
    outcome: LeaveRequest,
    recorded_at: Instant,
}

/// Serializes manager decisions over the store's compare-and-set transition.
///
/// Two concurrent decisions on one request race on the CAS; the loser sees
/// the winner's status and reports `InvalidTransition`, never a silent
/// overwrite. Approvals also reserve the owner's leave balance and one slot
/// of the monthly quota before the CAS, and release the reservation if the
/// CAS loses.
///
/// Replay tokens are honored only after the caller passes the same manager
/// check a fresh decision would, only for the request they were consumed
/// for, and only within a TTL; expired tokens are pruned and decide fresh.
pub struct ApprovalWorkflow<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    ledger: Arc<BalanceLedger>,
    token_ttl: Duration,
    decided: Mutex<HashMap<String, RecordedDecision>>,
}

impl<S, D> ApprovalWorkflow<S, D>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, ledger: Arc<BalanceLedger>) -> Self {
        Self {
            store,
            directory,
            ledger,
            token_ttl: DEFAULT_TOKEN_TTL,
            decided: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    pub fn decide(
        &self,
        actor: UserId,
        decision: LeaveDecision,
    ) -> Result<DecisionOutcome, ApprovalError> {
        let record = self
            .store
            .get(decision.request)
            .map_err(ApprovalError::Store)?
            .ok_or(ApprovalError::NotFound(decision.request))?;

        if !self.directory.manages(actor, record.team_id) {
            return Err(ApprovalError::NotTeamManager(record.team_id));
        }

        if let Some(token) = &decision.idempotency_token {
            let mut decided = self.decided.lock().expect("decision log poisoned");
            decided.retain(|_, entry| entry.recorded_at.elapsed() <= self.token_ttl);
            match decided.get(token) {
                Some(entry) if entry.request == decision.request => {
                    return Ok(DecisionOutcome {
                        request: entry.outcome.clone(),
                        replayed: true,
                    });
                }
                // A token aimed at a different request never replays the
                // other request's outcome; the decision proceeds fresh.
                _ => {}
            }
        }

        if record.status != LeaveStatus::Pending {
            return Err(ApprovalError::InvalidTransition {
                id: record.id,
                status: record.status,
            });
        }

        let decided_at = Utc::now();
        let reserved = decision.action == DecisionAction::Approved;
        if reserved {
            self.ledger.reserve(
                record.user_id,
                record.leave_type,
                record.leave_days(),
                decided_at.year(),
                decided_at.month(),
            )?;
        }

        let change = StatusTransition {
            expected: LeaveStatus::Pending,
            to: decision.action.resulting_status(),
            decided_by: Some(actor),
            decided_at: Some(decided_at),
            comments: decision.comments.clone(),
        };
        let updated = match self.store.transition(record.id, change) {
            Ok(updated) => updated,
            Err(err) => {
                if reserved {
                    self.ledger.restore(
                        record.user_id,
                        record.leave_type,
                        record.leave_days(),
                        decided_at.year(),
                        decided_at.month(),
                    );
                }
                return Err(match err {
                    // Lost the race to another decision between our read
                    // and the CAS.
                    StoreError::StatusMismatch { id, found, .. } => {
                        ApprovalError::InvalidTransition { id, status: found }
                    }
                    StoreError::NotFound(id) => ApprovalError::NotFound(id),
                    other => ApprovalError::Store(other),
                });
            }
        };

        if let Some(token) = decision.idempotency_token {
            let mut decided = self.decided.lock().expect("decision log poisoned");
            decided.insert(
                token,
                RecordedDecision {
                    request: updated.id,
                    outcome: updated.clone(),
                    recorded_at: Instant::now(),
                },
            );
        }

        tracing::info!(
            request = %updated.id,
            status = updated.status.label(),
            decided_by = %actor,
            "leave request decided"
        );

        Ok(DecisionOutcome {
            request: updated,
            replayed: false,
        })
    }
}
