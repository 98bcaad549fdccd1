use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};

use super::directory::TeamDirectory;
use super::domain::{
    LeaveRequest, LeaveStatus, MonthlyCarryForward, MonthlyStatus, TeamId, WeeklyShrinkage,
};
use super::forecast::ForecastThresholds;
use super::store::{LeaveRequestStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CarryForwardError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{year}-{month} is not a calendar month")]
    InvalidMonth { year: i32, month: u32 },
}

/// Rolls daily shrinkage into Monday-aligned weeks and tracks how much of the
/// monthly budget the elapsed weeks have consumed.
///
/// Weeks are clipped to the month: the first and last partial weeks only
/// average their in-month days. A week counts toward `cumulative_used` once
/// its start date has been reached.
pub struct CarryForwardAccumulator<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    thresholds: ForecastThresholds,
    monthly_target: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first - ChronoDuration::days(1)))
}

impl<S, D> CarryForwardAccumulator<S, D>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        thresholds: ForecastThresholds,
        monthly_target: f64,
    ) -> Self {
        Self {
            store,
            directory,
            thresholds,
            monthly_target,
        }
    }

    pub fn monthly_target(&self) -> f64 {
        self.monthly_target
    }

    /// Build the month report as of `today`. Weeks starting after `today`
    /// appear in the breakdown but do not consume budget yet.
    pub fn monthly_report(
        &self,
        team: TeamId,
        year: i32,
        month: u32,
        today: NaiveDate,
    ) -> Result<MonthlyCarryForward, CarryForwardError> {
        let (first, last) =
            month_bounds(year, month).ok_or(CarryForwardError::InvalidMonth { year, month })?;

        let roster_size = self.directory.team_members(team).len();
        if roster_size == 0 {
            return Ok(MonthlyCarryForward {
                year,
                month,
                team_id: team,
                monthly_target: self.monthly_target,
                cumulative_used: 0.0,
                carry_forward: round2(self.monthly_target),
                weeks: Vec::new(),
                status: MonthlyStatus::Safe,
            });
        }

        let approved = self.store.list_for_team(team, Some(LeaveStatus::Approved))?;

        let mut weeks = Vec::new();
        let mut cumulative_used = 0.0;
        let mut worst = MonthlyStatus::Safe;

        let mut week_start = first;
        while week_start <= last {
            let days_to_sunday = 6 - i64::from(week_start.weekday().num_days_from_monday());
            let week_end = (week_start + ChronoDuration::days(days_to_sunday)).min(last);

            let pct = week_shrinkage(&approved, roster_size, week_start, week_end);
            let status = self.thresholds.classify(pct);
            if severity(status.into()) > severity(worst) {
                worst = status.into();
            }
            if week_start <= today {
                cumulative_used += pct;
            }

            weeks.push(WeeklyShrinkage {
                week_start,
                week_end,
                shrinkage_pct: pct,
                status,
            });

            week_start = week_end + ChronoDuration::days(1);
        }

        let cumulative_used = round2(cumulative_used);
        let status = if cumulative_used > self.monthly_target {
            MonthlyStatus::Exceeded
        } else {
            worst
        };

        Ok(MonthlyCarryForward {
            year,
            month,
            team_id: team,
            monthly_target: self.monthly_target,
            cumulative_used,
            carry_forward: round2(self.monthly_target - cumulative_used),
            weeks,
            status,
        })
    }
}

fn severity(status: MonthlyStatus) -> u8 {
    match status {
        MonthlyStatus::Safe => 0,
        MonthlyStatus::Tight => 1,
        MonthlyStatus::Overbooked => 2,
        MonthlyStatus::Exceeded => 3,
    }
}

/// Mean of the daily shrinkage percentages over `[week_start, week_end]`.
fn week_shrinkage(
    approved: &[LeaveRequest],
    roster_size: usize,
    week_start: NaiveDate,
    week_end: NaiveDate,
) -> f64 {
    let mut total = 0.0;
    let mut days = 0u32;
    let mut date = week_start;
    while date <= week_end {
        let absent = approved.iter().filter(|request| request.covers(date)).count();
        total += 100.0 * absent as f64 / roster_size as f64;
        days += 1;
        date += ChronoDuration::days(1);
    }
    if days == 0 {
        0.0
    } else {
        round2(total / f64::from(days))
    }
}
