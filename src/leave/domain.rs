use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for team members.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UserId(pub u64);

/// Identifier wrapper for teams.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TeamId(pub u64);

/// Identifier wrapper for leave requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RequestId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical leave categories.
///
/// Inbound strings are normalized through [`LeaveType::parse`], which carries
/// the alias table for the short codes seen across legacy callers (`CL`, `AL`,
/// `SL`). Anything outside the table is rejected, never stored as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaveType {
    #[serde(rename = "CL")]
    Casual,
    #[serde(rename = "AL")]
    Annual,
    Sick,
    Optional,
    Emergency,
    Maternity,
    Paternity,
}

impl LeaveType {
    pub const ALL: [LeaveType; 7] = [
        LeaveType::Casual,
        LeaveType::Annual,
        LeaveType::Sick,
        LeaveType::Optional,
        LeaveType::Emergency,
        LeaveType::Maternity,
        LeaveType::Paternity,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cl" | "casual" => Some(Self::Casual),
            "al" | "annual" => Some(Self::Annual),
            "sl" | "sick" => Some(Self::Sick),
            "optional" => Some(Self::Optional),
            "emergency" => Some(Self::Emergency),
            "maternity" => Some(Self::Maternity),
            "paternity" => Some(Self::Paternity),
            _ => None,
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            LeaveType::Casual => "CL",
            LeaveType::Annual => "AL",
            LeaveType::Sick => "Sick",
            LeaveType::Optional => "Optional",
            LeaveType::Emergency => "Emergency",
            LeaveType::Maternity => "Maternity",
            LeaveType::Paternity => "Paternity",
        }
    }

    /// Casual leave spanning more than two calendar days is booked as annual
    /// leave instead; other types pass through unchanged.
    pub const fn converted_for_span(self, span_days: i64) -> Self {
        match self {
            LeaveType::Casual if span_days > 2 => LeaveType::Annual,
            other => other,
        }
    }
}

/// Lifecycle status of a leave request.
///
/// `Rejected` and `Cancelled` are terminal. `Approved` may still move to
/// `Cancelled` by its owner before the leave starts; nothing ever returns to
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaveStatus::Pending => "Pending",
            LeaveStatus::Approved => "Approved",
            LeaveStatus::Rejected => "Rejected",
            LeaveStatus::Cancelled => "Cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, LeaveStatus::Rejected | LeaveStatus::Cancelled)
    }

    /// Whether a request in this status blocks overlapping applications.
    pub const fn counts_for_overlap(self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

/// Visibility scopes, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Associate,
    Manager,
    L5,
}

impl Role {
    /// Manager-scope reads are also open to the cross-team L5 viewer.
    pub const fn has_manager_visibility(self) -> bool {
        matches!(self, Role::Manager | Role::L5)
    }
}

/// Roster entry supplied by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: UserId,
    pub username: String,
    pub team_id: TeamId,
    pub role: Role,
}

/// A leave request record as owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_half_day: bool,
    pub backup_person: Option<String>,
    pub status: LeaveStatus,
    pub created_at: DateTime<Utc>,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl LeaveRequest {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    /// True while the owner may still edit or cancel the request.
    pub fn is_mutable(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.start_date > today
    }

    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Days charged against the owner's balance: a half day costs 0.5,
    /// otherwise the inclusive span of calendar days.
    pub fn leave_days(&self) -> f64 {
        if self.is_half_day {
            0.5
        } else {
            self.span_days() as f64
        }
    }
}

/// Manager decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approved,
    Rejected,
}

impl DecisionAction {
    pub const fn resulting_status(self) -> LeaveStatus {
        match self {
            DecisionAction::Approved => LeaveStatus::Approved,
            DecisionAction::Rejected => LeaveStatus::Rejected,
        }
    }
}

/// Verified identity attached to every call, resolved from the bearer token
/// by the external identity provider. No ambient global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: Role,
    pub team_id: TeamId,
}

/// Severity label for a single day's shrinkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastStatus {
    Safe,
    Tight,
    Overbooked,
}

impl ForecastStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ForecastStatus::Safe => "Safe",
            ForecastStatus::Tight => "Tight",
            ForecastStatus::Overbooked => "Overbooked",
        }
    }

    pub const fn severity(self) -> u8 {
        match self {
            ForecastStatus::Safe => 0,
            ForecastStatus::Tight => 1,
            ForecastStatus::Overbooked => 2,
        }
    }
}

/// Member absent on a forecast day. Half-day leave is surfaced for display
/// but does not weight the shrinkage percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnLeaveEntry {
    pub user_id: UserId,
    pub username: String,
    pub leave_type: LeaveType,
    pub is_half_day: bool,
}

/// Derived staffing-risk view for one team and one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub team_id: TeamId,
    pub shrinkage_pct: f64,
    pub status: ForecastStatus,
    pub on_leave: Vec<OnLeaveEntry>,
}

/// Forecast window plus a staleness marker. `stale` is set when a cached
/// value older than the staleness bound had to be served.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastSnapshot {
    pub days: Vec<DailyForecast>,
    pub stale: bool,
}

/// Mean shrinkage over the in-month days of one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyShrinkage {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub shrinkage_pct: f64,
    pub status: ForecastStatus,
}

/// Monthly budget status; `Exceeded` outranks the daily severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonthlyStatus {
    Safe,
    Tight,
    Overbooked,
    Exceeded,
}

impl From<ForecastStatus> for MonthlyStatus {
    fn from(value: ForecastStatus) -> Self {
        match value {
            ForecastStatus::Safe => MonthlyStatus::Safe,
            ForecastStatus::Tight => MonthlyStatus::Tight,
            ForecastStatus::Overbooked => MonthlyStatus::Overbooked,
        }
    }
}

/// Monthly shrinkage budget rollup with week-by-week carry forward.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyCarryForward {
    pub year: i32,
    pub month: u32,
    pub team_id: TeamId,
    pub monthly_target: f64,
    pub cumulative_used: f64,
    pub carry_forward: f64,
    pub weeks: Vec<WeeklyShrinkage>,
    pub status: MonthlyStatus,
}

/// Lifecycle event message delivered to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub user_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
