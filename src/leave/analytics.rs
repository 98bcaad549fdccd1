use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Weekday};

use super::directory::TeamDirectory;
use super::domain::UserId;
use super::store::{LeaveRequestStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{year}-{month} is not a calendar month")]
    InvalidMonth { year: i32, month: u32 },
}

/// One member's leave pattern for a single month, built from their Pending
/// and Approved requests. Rejected and cancelled leave is excluded so the
/// pattern reflects actual or still-possible absence.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserLeavePattern {
    pub user_id: UserId,
    pub username: String,
    pub year: i32,
    pub month: u32,
    /// In-month leave days per leave-type code.
    pub monthly_summary: BTreeMap<String, u32>,
    /// Every in-month date covered by a request, ascending and deduplicated.
    pub leave_dates: Vec<NaiveDate>,
    /// Weekday names that recur in the leave dates; a weekday only appears
    /// once it has been taken at least twice.
    pub frequent_days: BTreeMap<String, u32>,
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Summarizes one user's monthly leave behavior for manager review.
pub struct LeavePatternAnalyzer<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
}

impl<S, D> LeavePatternAnalyzer<S, D>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
{
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self { store, directory }
    }

    pub fn monthly_pattern(
        &self,
        user: UserId,
        year: i32,
        month: u32,
    ) -> Result<UserLeavePattern, AnalyticsError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(AnalyticsError::InvalidMonth { year, month })?;
        let last = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or(AnalyticsError::InvalidMonth { year, month })?
            - ChronoDuration::days(1);

        let username = self
            .directory
            .member(user)
            .map(|member| member.username)
            .unwrap_or_else(|| format!("user-{user}"));

        let mut monthly_summary: BTreeMap<String, u32> = BTreeMap::new();
        let mut dates: Vec<NaiveDate> = Vec::new();

        for request in self.store.list_for_user(user)? {
            if !request.status.counts_for_overlap() {
                continue;
            }
            let from = request.start_date.max(first);
            let to = request.end_date.min(last);
            let mut date = from;
            while date <= to {
                *monthly_summary
                    .entry(request.leave_type.code().to_string())
                    .or_insert(0) += 1;
                dates.push(date);
                date += ChronoDuration::days(1);
            }
        }

        dates.sort();
        dates.dedup();

        let mut weekday_counts: BTreeMap<String, u32> = BTreeMap::new();
        for date in &dates {
            *weekday_counts
                .entry(weekday_name(date.weekday()).to_string())
                .or_insert(0) += 1;
        }
        let frequent_days: BTreeMap<String, u32> = weekday_counts
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .collect();

        Ok(UserLeavePattern {
            user_id: user,
            username,
            year,
            month,
            monthly_summary,
            leave_dates: dates,
            frequent_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave::directory::InMemoryDirectory;
    use crate::leave::domain::{LeaveStatus, LeaveType, Role, TeamId, TeamMember};
    use crate::leave::store::{InMemoryLeaveStore, NewLeaveRequest, StatusTransition};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn fixture() -> LeavePatternAnalyzer<InMemoryLeaveStore, InMemoryDirectory> {
        let store = Arc::new(InMemoryLeaveStore::new());
        let mut directory = InMemoryDirectory::new();
        directory.add_member(TeamMember {
            id: UserId(2),
            username: "asha".into(),
            team_id: TeamId(1),
            role: Role::Associate,
        });
        LeavePatternAnalyzer::new(store, Arc::new(directory))
    }

    fn apply(
        analyzer: &LeavePatternAnalyzer<InMemoryLeaveStore, InMemoryDirectory>,
        leave_type: LeaveType,
        start: NaiveDate,
        end: NaiveDate,
        approve: bool,
    ) {
        let record = analyzer
            .store
            .create(NewLeaveRequest {
                user_id: UserId(2),
                team_id: TeamId(1),
                leave_type,
                start_date: start,
                end_date: end,
                is_half_day: false,
                backup_person: None,
            })
            .expect("create");
        if approve {
            analyzer
                .store
                .transition(
                    record.id,
                    StatusTransition {
                        expected: LeaveStatus::Pending,
                        to: LeaveStatus::Approved,
                        decided_by: Some(UserId(1)),
                        decided_at: Some(Utc::now()),
                        comments: None,
                    },
                )
                .expect("approve");
        }
    }

    #[test]
    fn summary_counts_in_month_days_per_type() {
        let analyzer = fixture();
        // Straddles May/June: only the June days count for June.
        apply(&analyzer, LeaveType::Casual, date(2024, 5, 30), date(2024, 6, 3), true);
        apply(&analyzer, LeaveType::Sick, date(2024, 6, 17), date(2024, 6, 18), false);

        let pattern = analyzer
            .monthly_pattern(UserId(2), 2024, 6)
            .expect("pattern");
        assert_eq!(pattern.username, "asha");
        assert_eq!(pattern.monthly_summary.get("CL"), Some(&3));
        assert_eq!(pattern.monthly_summary.get("Sick"), Some(&2));
        assert_eq!(pattern.leave_dates.first(), Some(&date(2024, 6, 1)));
        assert_eq!(pattern.leave_dates.len(), 5);
    }

    #[test]
    fn frequent_days_require_at_least_two_occurrences() {
        let analyzer = fixture();
        // Two Mondays and one Friday.
        apply(&analyzer, LeaveType::Casual, date(2024, 6, 3), date(2024, 6, 3), true);
        apply(&analyzer, LeaveType::Casual, date(2024, 6, 10), date(2024, 6, 10), true);
        apply(&analyzer, LeaveType::Casual, date(2024, 6, 14), date(2024, 6, 14), true);

        let pattern = analyzer
            .monthly_pattern(UserId(2), 2024, 6)
            .expect("pattern");
        assert_eq!(pattern.frequent_days.get("Monday"), Some(&2));
        assert!(!pattern.frequent_days.contains_key("Friday"));
    }

    #[test]
    fn terminal_requests_are_excluded() {
        let analyzer = fixture();
        apply(&analyzer, LeaveType::Casual, date(2024, 6, 3), date(2024, 6, 4), false);
        let record = analyzer
            .store
            .list_for_user(UserId(2))
            .expect("list")
            .pop()
            .expect("record");
        analyzer
            .store
            .transition(
                record.id,
                StatusTransition {
                    expected: LeaveStatus::Pending,
                    to: LeaveStatus::Rejected,
                    decided_by: Some(UserId(1)),
                    decided_at: Some(Utc::now()),
                    comments: None,
                },
            )
            .expect("reject");

        let pattern = analyzer
            .monthly_pattern(UserId(2), 2024, 6)
            .expect("pattern");
        assert!(pattern.leave_dates.is_empty());
        assert!(pattern.monthly_summary.is_empty());
    }
}
