use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::Serialize;

use super::domain::{LeaveType, UserId};

/// Reasons a balance reservation is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BalanceError {
    #[error("insufficient {} balance: {requested} days requested, {available} available", .leave_type.code())]
    InsufficientBalance {
        leave_type: LeaveType,
        requested: f64,
        available: f64,
    },
    #[error("monthly leave cap reached ({count} of {cap} approvals used)")]
    MonthlyCapReached { count: u32, cap: u32 },
}

/// Per-user leave balance summary for the current month.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    pub user_id: UserId,
    pub available_balances: BTreeMap<String, f64>,
    pub current_month_leave_count: u32,
    pub monthly_cap: u32,
    pub remaining_monthly_quota: u32,
}

/// Leave balance accounting: every member starts each type at the configured
/// grant, approvals reserve days, cancellations of approved leave restore
/// them. A monthly cap bounds how many requests one member can have approved
/// in a calendar month.
///
/// Balances are lazily materialized: a (user, type) pair not yet touched
/// holds the full grant.
pub struct BalanceLedger {
    grant_days: f64,
    monthly_cap: u32,
    state: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<(UserId, LeaveType), f64>,
    monthly: HashMap<(UserId, i32, u32), u32>,
}

impl BalanceLedger {
    pub fn new(grant_days: f64, monthly_cap: u32) -> Self {
        Self {
            grant_days,
            monthly_cap,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn monthly_cap(&self) -> u32 {
        self.monthly_cap
    }

    pub fn balance(&self, user: UserId, leave_type: LeaveType) -> f64 {
        let state = self.state.lock().expect("balance ledger poisoned");
        state
            .balances
            .get(&(user, leave_type))
            .copied()
            .unwrap_or(self.grant_days)
    }

    pub fn monthly_count(&self, user: UserId, year: i32, month: u32) -> u32 {
        let state = self.state.lock().expect("balance ledger poisoned");
        state
            .monthly
            .get(&(user, year, month))
            .copied()
            .unwrap_or(0)
    }

    /// Consume `days` from the user's balance and one slot of the monthly
    /// quota, checking both before touching either.
    pub fn reserve(
        &self,
        user: UserId,
        leave_type: LeaveType,
        days: f64,
        year: i32,
        month: u32,
    ) -> Result<(), BalanceError> {
        let mut state = self.state.lock().expect("balance ledger poisoned");

        let count = state
            .monthly
            .get(&(user, year, month))
            .copied()
            .unwrap_or(0);
        if count >= self.monthly_cap {
            return Err(BalanceError::MonthlyCapReached {
                count,
                cap: self.monthly_cap,
            });
        }

        let available = state
            .balances
            .get(&(user, leave_type))
            .copied()
            .unwrap_or(self.grant_days);
        if available < days {
            return Err(BalanceError::InsufficientBalance {
                leave_type,
                requested: days,
                available,
            });
        }

        state.balances.insert((user, leave_type), available - days);
        state.monthly.insert((user, year, month), count + 1);
        Ok(())
    }

    /// Return `days` to the balance and release one monthly quota slot.
    pub fn restore(&self, user: UserId, leave_type: LeaveType, days: f64, year: i32, month: u32) {
        let mut state = self.state.lock().expect("balance ledger poisoned");

        let available = state
            .balances
            .get(&(user, leave_type))
            .copied()
            .unwrap_or(self.grant_days);
        state.balances.insert((user, leave_type), available + days);

        if let Some(count) = state.monthly.get_mut(&(user, year, month)) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn summary(&self, user: UserId, year: i32, month: u32) -> BalanceSummary {
        let state = self.state.lock().expect("balance ledger poisoned");

        let available_balances = LeaveType::ALL
            .iter()
            .map(|leave_type| {
                let balance = state
                    .balances
                    .get(&(user, *leave_type))
                    .copied()
                    .unwrap_or(self.grant_days);
                (leave_type.code().to_string(), balance)
            })
            .collect();
        let count = state
            .monthly
            .get(&(user, year, month))
            .copied()
            .unwrap_or(0);

        BalanceSummary {
            user_id: user,
            available_balances,
            current_month_leave_count: count,
            monthly_cap: self.monthly_cap,
            remaining_monthly_quota: self.monthly_cap.saturating_sub(count),
        }
    }
}
