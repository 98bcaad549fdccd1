use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::conflict::{self, ConflictError, LeaveCandidate};
use super::domain::{LeaveRequest, LeaveStatus, LeaveType, RequestId, TeamId, UserId};

/// Fields required to open a new request; the store assigns id, status, and
/// creation timestamp.
#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub leave_type: LeaveType,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub is_half_day: bool,
    pub backup_person: Option<String>,
}

/// Compare-and-set payload for [`LeaveRequestStore::transition`].
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub expected: LeaveStatus,
    pub to: LeaveStatus,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("leave request {0} not found")]
    NotFound(RequestId),
    #[error("request {id} is {found:?}, expected {expected:?}")]
    StatusMismatch {
        id: RequestId,
        expected: LeaveStatus,
        found: LeaveStatus,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction so the lifecycle and forecast modules can be exercised
/// in isolation. Implementations must make `create` an atomic
/// check-then-insert and `transition` a compare-and-set so decisions on the
/// same request serialize with first-writer-wins.
pub trait LeaveRequestStore: Send + Sync {
    fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError>;
    fn get(&self, id: RequestId) -> Result<Option<LeaveRequest>, StoreError>;
    fn list_for_user(&self, user: UserId) -> Result<Vec<LeaveRequest>, StoreError>;
    fn list_for_team(
        &self,
        team: TeamId,
        status: Option<LeaveStatus>,
    ) -> Result<Vec<LeaveRequest>, StoreError>;
    /// Replace a record, re-validating the no-overlap invariant for
    /// Pending/Approved records under the store lock. The incoming record's
    /// status is treated as the caller's snapshot: if the stored status has
    /// moved since that snapshot was taken the update fails with
    /// `StatusMismatch` instead of silently rolling the decision back.
    fn update(&self, record: LeaveRequest) -> Result<LeaveRequest, StoreError>;
    fn transition(
        &self,
        id: RequestId,
        change: StatusTransition,
    ) -> Result<LeaveRequest, StoreError>;
}

/// Mutex-guarded reference store. All contention is scoped to the one lock,
/// which also provides the per-user atomicity the conflict check needs.
#[derive(Default)]
pub struct InMemoryLeaveStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    sequence: u64,
    records: BTreeMap<RequestId, LeaveRequest>,
}

impl InMemoryLeaveStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreState {
    fn requests_for_user(&self, user: UserId) -> Vec<LeaveRequest> {
        self.records
            .values()
            .filter(|record| record.user_id == user)
            .cloned()
            .collect()
    }
}

impl LeaveRequestStore for InMemoryLeaveStore {
    fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");

        let candidate = LeaveCandidate {
            user_id: new.user_id,
            start_date: new.start_date,
            end_date: new.end_date,
        };
        let existing = state.requests_for_user(new.user_id);
        conflict::check(&candidate, &existing, None)?;

        state.sequence += 1;
        let record = LeaveRequest {
            id: RequestId(state.sequence),
            user_id: new.user_id,
            team_id: new.team_id,
            leave_type: new.leave_type,
            start_date: new.start_date,
            end_date: new.end_date,
            is_half_day: new.is_half_day,
            backup_person: new.backup_person,
            status: LeaveStatus::Pending,
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            comments: None,
        };
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: RequestId) -> Result<Option<LeaveRequest>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.records.get(&id).cloned())
    }

    fn list_for_user(&self, user: UserId) -> Result<Vec<LeaveRequest>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.requests_for_user(user))
    }

    fn list_for_team(
        &self,
        team: TeamId,
        status: Option<LeaveStatus>,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .records
            .values()
            .filter(|record| record.team_id == team)
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect())
    }

    fn update(&self, record: LeaveRequest) -> Result<LeaveRequest, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let stored = state
            .records
            .get(&record.id)
            .ok_or(StoreError::NotFound(record.id))?;

        // Status is compare-and-set against the caller's snapshot so an edit
        // racing a decision cannot overwrite it.
        if stored.status != record.status {
            return Err(StoreError::StatusMismatch {
                id: record.id,
                expected: record.status,
                found: stored.status,
            });
        }

        if record.status.counts_for_overlap() {
            let candidate = LeaveCandidate {
                user_id: record.user_id,
                start_date: record.start_date,
                end_date: record.end_date,
            };
            let existing = state.requests_for_user(record.user_id);
            conflict::check(&candidate, &existing, Some(record.id))?;
        }

        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn transition(
        &self,
        id: RequestId,
        change: StatusTransition,
    ) -> Result<LeaveRequest, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let record = state
            .records
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;

        if record.status != change.expected {
            return Err(StoreError::StatusMismatch {
                id,
                expected: change.expected,
                found: record.status,
            });
        }

        record.status = change.to;
        if change.decided_by.is_some() {
            record.decided_by = change.decided_by;
        }
        if change.decided_at.is_some() {
            record.decided_at = change.decided_at;
        }
        if change.comments.is_some() {
            record.comments = change.comments;
        }
        Ok(record.clone())
    }
}
