use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::config::LeavePolicyConfig;

use super::analytics::{AnalyticsError, LeavePatternAnalyzer, UserLeavePattern};
use super::approval::{ApprovalError, ApprovalWorkflow, DecisionOutcome, LeaveDecision};
use super::balance::{BalanceLedger, BalanceSummary};
use super::carryforward::{CarryForwardAccumulator, CarryForwardError};
use super::conflict::ConflictError;
use super::directory::TeamDirectory;
use super::domain::{
    AuthContext, DailyForecast, ForecastSnapshot, LeaveRequest, LeaveStatus, LeaveType,
    MonthlyCarryForward, Notification, RequestId, TeamId, TeamMember, UserId,
};
use super::forecast::{AvailabilityForecastEngine, ForecastError, ForecastThresholds};
use super::notify::NotificationDispatcher;
use super::store::{LeaveRequestStore, NewLeaveRequest, StatusTransition, StoreError};

/// Application payload for a new leave request. The leave type arrives as a
/// raw string and is normalized through the alias table.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyLeave {
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_half_day: bool,
    #[serde(default)]
    pub backup_person: Option<String>,
}

/// Partial edit of a still-pending-or-future request. Absent fields keep
/// their stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditLeave {
    pub leave_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_half_day: Option<bool>,
    pub backup_person: Option<String>,
}

/// Service-level failures, each mapped to one wire error kind.
#[derive(Debug, thiserror::Error)]
pub enum LeaveServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("date range overlaps existing request {conflicting}")]
    Conflict { conflicting: RequestId },
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ImmutableState(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeaveServiceError {
    /// Stable machine-readable kind carried in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            LeaveServiceError::Validation(_) => "validation",
            LeaveServiceError::Conflict { .. } => "conflict",
            LeaveServiceError::Authorization(_) => "authorization",
            LeaveServiceError::NotFound(_) => "not_found",
            LeaveServiceError::ImmutableState(_) => "immutable_state",
            LeaveServiceError::InvalidTransition(_) => "invalid_transition",
            LeaveServiceError::Internal(_) => "server",
        }
    }
}

impl From<StoreError> for LeaveServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(ConflictError::OverlapConflict { conflicting }) => {
                LeaveServiceError::Conflict { conflicting }
            }
            StoreError::Conflict(err @ ConflictError::InvalidRange { .. }) => {
                LeaveServiceError::Validation(err.to_string())
            }
            StoreError::NotFound(id) => {
                LeaveServiceError::NotFound(format!("leave request {id} not found"))
            }
            StoreError::StatusMismatch { id, found, .. } => LeaveServiceError::InvalidTransition(
                format!("request {id} changed to {} concurrently", found.label()),
            ),
            other => LeaveServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ApprovalError> for LeaveServiceError {
    fn from(value: ApprovalError) -> Self {
        match value {
            ApprovalError::NotFound(id) => {
                LeaveServiceError::NotFound(format!("leave request {id} not found"))
            }
            ApprovalError::InvalidTransition { id, status } => LeaveServiceError::InvalidTransition(
                format!("request {id} is {} and cannot be decided", status.label()),
            ),
            ApprovalError::NotTeamManager(team) => LeaveServiceError::Authorization(format!(
                "caller does not manage team {team}"
            )),
            ApprovalError::Balance(err) => LeaveServiceError::Validation(err.to_string()),
            ApprovalError::Store(err) => err.into(),
        }
    }
}

impl From<ForecastError> for LeaveServiceError {
    fn from(value: ForecastError) -> Self {
        match value {
            ForecastError::InvalidWindow { start, end } => LeaveServiceError::Validation(format!(
                "window start {start} is after end {end}"
            )),
            ForecastError::Store(err) => err.into(),
        }
    }
}

impl From<CarryForwardError> for LeaveServiceError {
    fn from(value: CarryForwardError) -> Self {
        match value {
            CarryForwardError::InvalidMonth { year, month } => {
                LeaveServiceError::Validation(format!("{year}-{month} is not a calendar month"))
            }
            CarryForwardError::Store(err) => err.into(),
        }
    }
}

impl From<AnalyticsError> for LeaveServiceError {
    fn from(value: AnalyticsError) -> Self {
        match value {
            AnalyticsError::InvalidMonth { year, month } => {
                LeaveServiceError::Validation(format!("{year}-{month} is not a calendar month"))
            }
            AnalyticsError::Store(err) => err.into(),
        }
    }
}

/// Facade tying the lifecycle, forecasting, and notification pieces together
/// behind authorization checks. One instance is shared across the router.
pub struct LeaveService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    notifier: Arc<N>,
    ledger: Arc<BalanceLedger>,
    forecast: Arc<AvailabilityForecastEngine<S, D>>,
    workflow: ApprovalWorkflow<S, D>,
    accumulator: CarryForwardAccumulator<S, D>,
    analyzer: LeavePatternAnalyzer<S, D>,
}

impl<S, D, N> LeaveService<S, D, N>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifier: Arc<N>,
        policy: &LeavePolicyConfig,
    ) -> Self {
        let thresholds = ForecastThresholds::from(policy);
        let forecast = Arc::new(AvailabilityForecastEngine::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            thresholds,
            policy.forecast_horizon_days,
            policy.forecast_staleness,
        ));
        let ledger = Arc::new(BalanceLedger::new(
            policy.balance_grant_days,
            policy.monthly_leave_cap,
        ));
        let workflow = ApprovalWorkflow::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&ledger),
        );
        let accumulator = CarryForwardAccumulator::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            thresholds,
            policy.monthly_target_pct,
        );
        let analyzer = LeavePatternAnalyzer::new(Arc::clone(&store), Arc::clone(&directory));

        Self {
            store,
            directory,
            notifier,
            ledger,
            forecast,
            workflow,
            accumulator,
            analyzer,
        }
    }

    pub fn forecast_engine(&self) -> Arc<AvailabilityForecastEngine<S, D>> {
        Arc::clone(&self.forecast)
    }

    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    /// Deliver a notification without letting delivery failure surface. One
    /// retry, then a warning.
    fn notify_quietly(&self, user: UserId, message: &str) {
        for attempt in 0..2 {
            match self.notifier.emit(user, message.to_string()) {
                Ok(_) => return,
                Err(err) if attempt == 0 => {
                    tracing::warn!(user = %user, error = %err, "notification failed, retrying");
                }
                Err(err) => {
                    tracing::warn!(user = %user, error = %err, "notification dropped");
                }
            }
        }
    }

    fn require_manager_scope(
        &self,
        actor: &AuthContext,
        team: TeamId,
    ) -> Result<(), LeaveServiceError> {
        // Managers see the teams they manage; the L5 scope spans all teams.
        let allowed =
            self.directory.manages(actor.user_id, team) || actor.role == super::domain::Role::L5;
        if allowed {
            Ok(())
        } else {
            Err(LeaveServiceError::Authorization(format!(
                "caller may not view team {team}"
            )))
        }
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn apply(
        &self,
        actor: &AuthContext,
        payload: ApplyLeave,
    ) -> Result<LeaveRequest, LeaveServiceError> {
        let leave_type = LeaveType::parse(&payload.leave_type).ok_or_else(|| {
            LeaveServiceError::Validation(format!(
                "unknown leave type '{}'",
                payload.leave_type
            ))
        })?;
        // Casual leave beyond two days books as annual leave.
        let span = (payload.end_date - payload.start_date).num_days() + 1;
        let leave_type = leave_type.converted_for_span(span);

        let record = self.store.create(NewLeaveRequest {
            user_id: actor.user_id,
            team_id: actor.team_id,
            leave_type,
            start_date: payload.start_date,
            end_date: payload.end_date,
            is_half_day: payload.is_half_day,
            backup_person: payload.backup_person,
        })?;

        self.forecast
            .invalidate(record.team_id, record.start_date, record.end_date);

        if let Some(manager) = self.directory.manager_of(record.team_id) {
            self.notify_quietly(
                manager,
                &format!(
                    "Leave request {} ({} to {}) awaits your review",
                    record.id, record.start_date, record.end_date
                ),
            );
        }

        tracing::info!(request = %record.id, user = %actor.user_id, "leave request created");
        Ok(record)
    }

    /// The caller's own requests, newest first.
    pub fn history(&self, actor: &AuthContext) -> Result<Vec<LeaveRequest>, LeaveServiceError> {
        let mut requests = self.store.list_for_user(actor.user_id)?;
        requests.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(requests)
    }

    pub fn edit(
        &self,
        actor: &AuthContext,
        id: RequestId,
        changes: EditLeave,
    ) -> Result<LeaveRequest, LeaveServiceError> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| LeaveServiceError::NotFound(format!("leave request {id} not found")))?;

        if record.user_id != actor.user_id {
            return Err(LeaveServiceError::Authorization(
                "only the owner may edit a leave request".to_string(),
            ));
        }
        if !record.is_mutable(self.today()) {
            return Err(LeaveServiceError::ImmutableState(format!(
                "request {id} can no longer be edited"
            )));
        }

        let old_start = record.start_date;
        let old_end = record.end_date;
        let old_type = record.leave_type;
        let old_days = record.leave_days();

        let mut updated = record;
        if let Some(raw) = changes.leave_type {
            updated.leave_type = LeaveType::parse(&raw).ok_or_else(|| {
                LeaveServiceError::Validation(format!("unknown leave type '{raw}'"))
            })?;
        }
        if let Some(start) = changes.start_date {
            updated.start_date = start;
        }
        if let Some(end) = changes.end_date {
            updated.end_date = end;
        }
        if let Some(half) = changes.is_half_day {
            updated.is_half_day = half;
        }
        if changes.backup_person.is_some() {
            updated.backup_person = changes.backup_person;
        }
        if updated.start_date > updated.end_date {
            return Err(LeaveServiceError::Validation(format!(
                "start date {} is after end date {}",
                updated.start_date, updated.end_date
            )));
        }
        updated.leave_type = updated.leave_type.converted_for_span(updated.span_days());

        // An approved request already holds a balance reservation; re-charge
        // it when the edit changes what the leave costs.
        let new_type = updated.leave_type;
        let new_days = updated.leave_days();
        let rebalance = updated.status == LeaveStatus::Approved
            && (new_type != old_type || new_days != old_days);
        let now = chrono::Utc::now();
        if rebalance {
            self.ledger
                .restore(updated.user_id, old_type, old_days, now.year(), now.month());
            if let Err(err) = self.ledger.reserve(
                updated.user_id,
                new_type,
                new_days,
                now.year(),
                now.month(),
            ) {
                let _ = self.ledger.reserve(
                    updated.user_id,
                    old_type,
                    old_days,
                    now.year(),
                    now.month(),
                );
                return Err(LeaveServiceError::Validation(err.to_string()));
            }
        }

        let owner = updated.user_id;
        let saved = match self.store.update(updated) {
            Ok(saved) => saved,
            Err(err) => {
                if rebalance {
                    self.ledger
                        .restore(owner, new_type, new_days, now.year(), now.month());
                    let _ = self
                        .ledger
                        .reserve(owner, old_type, old_days, now.year(), now.month());
                }
                return Err(err.into());
            }
        };

        self.forecast.invalidate(saved.team_id, old_start, old_end);
        self.forecast
            .invalidate(saved.team_id, saved.start_date, saved.end_date);

        Ok(saved)
    }

    pub fn cancel(
        &self,
        actor: &AuthContext,
        id: RequestId,
    ) -> Result<LeaveRequest, LeaveServiceError> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| LeaveServiceError::NotFound(format!("leave request {id} not found")))?;

        let is_owner = record.user_id == actor.user_id;
        let is_team_manager = self.directory.manages(actor.user_id, record.team_id);
        if !is_owner && !is_team_manager {
            return Err(LeaveServiceError::Authorization(
                "only the owner or the team manager may cancel".to_string(),
            ));
        }

        if record.status.is_terminal() {
            return Err(LeaveServiceError::InvalidTransition(format!(
                "request {id} is already {}",
                record.status.label()
            )));
        }
        if record.start_date <= self.today() {
            return Err(LeaveServiceError::ImmutableState(format!(
                "request {id} has already started and cannot be cancelled"
            )));
        }

        let cancelled = self.store.transition(
            id,
            StatusTransition {
                expected: record.status,
                to: LeaveStatus::Cancelled,
                decided_by: Some(actor.user_id),
                decided_at: Some(chrono::Utc::now()),
                comments: None,
            },
        )?;

        // Approved leave held a balance reservation; give it back.
        if record.status == LeaveStatus::Approved {
            let now = chrono::Utc::now();
            self.ledger.restore(
                cancelled.user_id,
                cancelled.leave_type,
                cancelled.leave_days(),
                now.year(),
                now.month(),
            );
        }

        self.forecast
            .invalidate(cancelled.team_id, cancelled.start_date, cancelled.end_date);

        if !is_owner {
            self.notify_quietly(
                cancelled.user_id,
                &format!("Your leave request {} was cancelled by your manager", id),
            );
        }

        tracing::info!(request = %id, by = %actor.user_id, "leave request cancelled");
        Ok(cancelled)
    }

    // ---- approvals -------------------------------------------------------

    /// Pending requests across every team the caller manages, oldest first.
    pub fn pending_approvals(
        &self,
        actor: &AuthContext,
    ) -> Result<Vec<LeaveRequest>, LeaveServiceError> {
        let teams = self.directory.teams_managed_by(actor.user_id);
        if teams.is_empty() {
            return Err(LeaveServiceError::Authorization(
                "caller manages no teams".to_string(),
            ));
        }

        let mut pending = Vec::new();
        for team in teams {
            pending.extend(self.store.list_for_team(team, Some(LeaveStatus::Pending))?);
        }
        pending.sort_by_key(|record| record.id);
        Ok(pending)
    }

    pub fn decide(
        &self,
        actor: &AuthContext,
        decision: LeaveDecision,
    ) -> Result<DecisionOutcome, LeaveServiceError> {
        let outcome = self.workflow.decide(actor.user_id, decision)?;

        // A replay must not re-run side effects.
        if !outcome.replayed {
            let record = &outcome.request;
            self.forecast
                .invalidate(record.team_id, record.start_date, record.end_date);
            self.notify_quietly(
                record.user_id,
                &format!(
                    "Your leave request {} was {}",
                    record.id,
                    record.status.label().to_lowercase()
                ),
            );
        }

        Ok(outcome)
    }

    // ---- roster and reports ----------------------------------------------

    pub fn team_members(
        &self,
        actor: &AuthContext,
        team: TeamId,
    ) -> Result<Vec<TeamMember>, LeaveServiceError> {
        if actor.team_id != team {
            self.require_manager_scope(actor, team)?;
        }
        Ok(self.directory.team_members(team))
    }

    pub fn forecast_window(
        &self,
        actor: &AuthContext,
        team: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ForecastSnapshot, LeaveServiceError> {
        self.require_manager_scope(actor, team)?;
        Ok(self.forecast.forecast(team, from, to)?)
    }

    /// Default manager view: today plus the configured horizon.
    pub fn forecast_ahead(
        &self,
        actor: &AuthContext,
        team: TeamId,
    ) -> Result<ForecastSnapshot, LeaveServiceError> {
        let from = self.today();
        // Large fixed end; the engine clamps to its horizon.
        let to = from + chrono::Duration::days(365);
        self.forecast_window(actor, team, from, to)
    }

    pub fn day_shrinkage(
        &self,
        actor: &AuthContext,
        team: TeamId,
        date: NaiveDate,
    ) -> Result<DailyForecast, LeaveServiceError> {
        self.require_manager_scope(actor, team)?;
        let (day, _) = self.forecast.day(team, date)?;
        Ok(day)
    }

    /// Who is absent today; open to any member of the team itself.
    pub fn on_leave_today(
        &self,
        actor: &AuthContext,
        team: TeamId,
    ) -> Result<DailyForecast, LeaveServiceError> {
        if actor.team_id != team {
            self.require_manager_scope(actor, team)?;
        }
        let (day, _) = self.forecast.day(team, self.today())?;
        Ok(day)
    }

    pub fn carry_forward(
        &self,
        actor: &AuthContext,
        team: TeamId,
        year: i32,
        month: u32,
    ) -> Result<MonthlyCarryForward, LeaveServiceError> {
        self.require_manager_scope(actor, team)?;
        Ok(self
            .accumulator
            .monthly_report(team, year, month, self.today())?)
    }

    pub fn leave_pattern(
        &self,
        actor: &AuthContext,
        user: UserId,
        year: i32,
        month: u32,
    ) -> Result<UserLeavePattern, LeaveServiceError> {
        if user != actor.user_id {
            let team = self
                .directory
                .member(user)
                .map(|member| member.team_id)
                .ok_or_else(|| {
                    LeaveServiceError::NotFound(format!("user {user} not found"))
                })?;
            self.require_manager_scope(actor, team)?;
        }
        Ok(self.analyzer.monthly_pattern(user, year, month)?)
    }

    // ---- balances --------------------------------------------------------

    /// The caller's remaining balances per leave type and this month's quota.
    pub fn balance_summary(&self, actor: &AuthContext) -> BalanceSummary {
        let today = self.today();
        self.ledger
            .summary(actor.user_id, today.year(), today.month())
    }

    // ---- notifications ---------------------------------------------------

    pub fn notifications(
        &self,
        actor: &AuthContext,
    ) -> Result<Vec<Notification>, LeaveServiceError> {
        self.notifier
            .list(actor.user_id)
            .map_err(|err| LeaveServiceError::Internal(err.to_string()))
    }

    pub fn mark_notifications_read(
        &self,
        actor: &AuthContext,
    ) -> Result<usize, LeaveServiceError> {
        self.notifier
            .mark_all_read(actor.user_id)
            .map_err(|err| LeaveServiceError::Internal(err.to_string()))
    }
}
