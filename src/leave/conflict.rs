use chrono::NaiveDate;

use super::domain::{LeaveRequest, RequestId, UserId};

/// Candidate request shape checked before anything is persisted.
#[derive(Debug, Clone, Copy)]
pub struct LeaveCandidate {
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Validation failures raised by the conflict detector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("date range overlaps existing request {conflicting}")]
    OverlapConflict { conflicting: RequestId },
}

/// Validate a candidate against the user's existing requests.
///
/// Pure over its inputs; the store runs it inside the same lock as the
/// subsequent insert so two concurrent applications by one user cannot both
/// pass. `existing` may contain requests in any status and for any user —
/// only the candidate owner's Pending/Approved entries are considered, and
/// `exclude` skips the record being edited.
pub fn check(
    candidate: &LeaveCandidate,
    existing: &[LeaveRequest],
    exclude: Option<RequestId>,
) -> Result<(), ConflictError> {
    if candidate.start_date > candidate.end_date {
        return Err(ConflictError::InvalidRange {
            start: candidate.start_date,
            end: candidate.end_date,
        });
    }

    for request in existing {
        if Some(request.id) == exclude {
            continue;
        }
        if request.user_id != candidate.user_id || !request.status.counts_for_overlap() {
            continue;
        }
        if request.overlaps(candidate.start_date, candidate.end_date) {
            return Err(ConflictError::OverlapConflict {
                conflicting: request.id,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave::domain::{LeaveStatus, LeaveType, TeamId};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn request(id: u64, user: u64, start: NaiveDate, end: NaiveDate, status: LeaveStatus) -> LeaveRequest {
        LeaveRequest {
            id: RequestId(id),
            user_id: UserId(user),
            team_id: TeamId(1),
            leave_type: LeaveType::Casual,
            start_date: start,
            end_date: end,
            is_half_day: false,
            backup_person: None,
            status,
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            comments: None,
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let candidate = LeaveCandidate {
            user_id: UserId(1),
            start_date: date(2024, 6, 12),
            end_date: date(2024, 6, 10),
        };
        assert!(matches!(
            check(&candidate, &[], None),
            Err(ConflictError::InvalidRange { .. })
        ));
    }

    #[test]
    fn reports_overlap_with_conflicting_id() {
        let existing = vec![request(
            7,
            1,
            date(2024, 6, 10),
            date(2024, 6, 12),
            LeaveStatus::Pending,
        )];
        let candidate = LeaveCandidate {
            user_id: UserId(1),
            start_date: date(2024, 6, 11),
            end_date: date(2024, 6, 13),
        };
        assert_eq!(
            check(&candidate, &existing, None),
            Err(ConflictError::OverlapConflict {
                conflicting: RequestId(7)
            })
        );
    }

    #[test]
    fn terminal_statuses_do_not_block() {
        let existing = vec![
            request(1, 1, date(2024, 6, 10), date(2024, 6, 12), LeaveStatus::Rejected),
            request(2, 1, date(2024, 6, 10), date(2024, 6, 12), LeaveStatus::Cancelled),
        ];
        let candidate = LeaveCandidate {
            user_id: UserId(1),
            start_date: date(2024, 6, 10),
            end_date: date(2024, 6, 12),
        };
        assert_eq!(check(&candidate, &existing, None), Ok(()));
    }

    #[test]
    fn other_users_do_not_block() {
        let existing = vec![request(
            3,
            2,
            date(2024, 6, 10),
            date(2024, 6, 12),
            LeaveStatus::Approved,
        )];
        let candidate = LeaveCandidate {
            user_id: UserId(1),
            start_date: date(2024, 6, 10),
            end_date: date(2024, 6, 12),
        };
        assert_eq!(check(&candidate, &existing, None), Ok(()));
    }

    #[test]
    fn excluded_record_is_skipped_when_editing() {
        let existing = vec![request(
            9,
            1,
            date(2024, 6, 10),
            date(2024, 6, 12),
            LeaveStatus::Approved,
        )];
        let candidate = LeaveCandidate {
            user_id: UserId(1),
            start_date: date(2024, 6, 11),
            end_date: date(2024, 6, 14),
        };
        assert_eq!(check(&candidate, &existing, Some(RequestId(9))), Ok(()));
    }

    #[test]
    fn adjacent_ranges_do_not_conflict() {
        let existing = vec![request(
            4,
            1,
            date(2024, 6, 10),
            date(2024, 6, 12),
            LeaveStatus::Approved,
        )];
        let candidate = LeaveCandidate {
            user_id: UserId(1),
            start_date: date(2024, 6, 13),
            end_date: date(2024, 6, 14),
        };
        assert_eq!(check(&candidate, &existing, None), Ok(()));
    }
}
