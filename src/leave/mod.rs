//! Leave request lifecycle and team availability forecasting.
//!
//! The module splits along the seams of the domain: `store` owns request
//! persistence and the no-overlap invariant, `approval` serializes manager
//! decisions, `forecast` and `carryforward` derive staffing-risk views from
//! approved leave, and `router` exposes the whole surface over HTTP.

pub mod analytics;
pub mod approval;
pub mod balance;
pub mod carryforward;
pub mod conflict;
pub mod directory;
pub mod domain;
pub mod forecast;
pub mod notify;
pub mod router;
pub mod seed;
pub mod service;
pub mod store;

pub use analytics::{LeavePatternAnalyzer, UserLeavePattern};
pub use approval::{ApprovalError, ApprovalWorkflow, DecisionOutcome, LeaveDecision};
pub use balance::{BalanceError, BalanceLedger, BalanceSummary};
pub use carryforward::CarryForwardAccumulator;
pub use conflict::{ConflictError, LeaveCandidate};
pub use directory::{IdentityResolver, InMemoryDirectory, StaticTokens, TeamDirectory};
pub use domain::{
    AuthContext, DailyForecast, DecisionAction, ForecastSnapshot, ForecastStatus, LeaveRequest,
    LeaveStatus, LeaveType, MonthlyCarryForward, MonthlyStatus, Notification, OnLeaveEntry,
    RequestId, Role, TeamId, TeamMember, UserId, WeeklyShrinkage,
};
pub use forecast::{
    spawn_refresher, AvailabilityForecastEngine, ForecastThresholds, RefreshHandle,
};
pub use notify::{InMemoryNotifier, NotificationDispatcher, NotifyError};
pub use router::{leave_router, LeaveApi};
pub use service::{ApplyLeave, EditLeave, LeaveService, LeaveServiceError};
pub use store::{InMemoryLeaveStore, LeaveRequestStore, NewLeaveRequest, StatusTransition};
