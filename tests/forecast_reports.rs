//! Integration specifications for the availability forecast, carry-forward,
//! and leave pattern reports, exercised through the service facade and the
//! HTTP router.

mod common {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use leave_engine::config::LeavePolicyConfig;
    use leave_engine::leave::seed::{demo_world, SeedWorld};
    use leave_engine::leave::{
        ApplyLeave, AuthContext, DecisionAction, InMemoryDirectory, InMemoryLeaveStore,
        InMemoryNotifier, LeaveApi, LeaveDecision, LeaveService, RequestId, Role, StaticTokens,
        TeamId, UserId,
    };

    pub(crate) type Service =
        LeaveService<InMemoryLeaveStore, InMemoryDirectory, InMemoryNotifier>;

    pub(crate) struct World {
        pub service: Arc<Service>,
        pub tokens: Arc<StaticTokens>,
    }

    pub(crate) fn world() -> World {
        let SeedWorld {
            store,
            directory,
            notifier,
            tokens,
            ..
        } = demo_world();
        let service = Arc::new(LeaveService::new(
            store,
            directory,
            notifier,
            &LeavePolicyConfig::default(),
        ));
        World { service, tokens }
    }

    pub(crate) fn router(world: &World) -> axum::Router {
        leave_engine::leave::leave_router(LeaveApi {
            service: Arc::clone(&world.service),
            identity: Arc::clone(&world.tokens),
        })
    }

    pub(crate) fn manager() -> AuthContext {
        AuthContext {
            user_id: UserId(1),
            role: Role::Manager,
            team_id: TeamId(1),
        }
    }

    pub(crate) fn member(id: u64) -> AuthContext {
        AuthContext {
            user_id: UserId(id),
            role: Role::Associate,
            team_id: TeamId(1),
        }
    }

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    /// Apply as `user` and approve as priya, using one token per request.
    pub(crate) fn approved_leave(
        world: &World,
        user: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RequestId {
        let record = world
            .service
            .apply(
                &member(user),
                ApplyLeave {
                    leave_type: "CL".to_string(),
                    start_date: start,
                    end_date: end,
                    is_half_day: false,
                    backup_person: None,
                },
            )
            .expect("apply");
        world
            .service
            .decide(
                &manager(),
                LeaveDecision {
                    request: record.id,
                    action: DecisionAction::Approved,
                    comments: None,
                    idempotency_token: Some(format!("seed-{}", record.id)),
                },
            )
            .expect("approve");
        record.id
    }
}

mod forecasting {
    use super::common::*;
    use leave_engine::leave::{ApplyLeave, ForecastStatus, LeaveServiceError, Role, TeamId};

    #[test]
    fn two_absences_in_ten_is_overbooked() {
        let world = world();
        approved_leave(&world, 2, date(2031, 3, 10), date(2031, 3, 10));
        approved_leave(&world, 3, date(2031, 3, 10), date(2031, 3, 11));

        let day = world
            .service
            .day_shrinkage(&manager(), TeamId(1), date(2031, 3, 10))
            .expect("forecast");
        assert_eq!(day.shrinkage_pct, 20.0);
        assert_eq!(day.status, ForecastStatus::Overbooked);
        let names: Vec<&str> = day.on_leave.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["asha", "liam"]);

        let next = world
            .service
            .day_shrinkage(&manager(), TeamId(1), date(2031, 3, 11))
            .expect("forecast");
        assert_eq!(next.shrinkage_pct, 10.0);
        assert_eq!(next.status, ForecastStatus::Tight);
    }

    #[test]
    fn pending_leave_never_moves_the_forecast() {
        let world = world();
        world
            .service
            .apply(
                &member(2),
                ApplyLeave {
                    leave_type: "CL".to_string(),
                    start_date: date(2031, 3, 10),
                    end_date: date(2031, 3, 10),
                    is_half_day: false,
                    backup_person: None,
                },
            )
            .expect("apply");

        let day = world
            .service
            .day_shrinkage(&manager(), TeamId(1), date(2031, 3, 10))
            .expect("forecast");
        assert_eq!(day.shrinkage_pct, 0.0);
        assert_eq!(day.status, ForecastStatus::Safe);
    }

    #[test]
    fn cancellation_restores_availability() {
        let world = world();
        let id = approved_leave(&world, 2, date(2031, 3, 10), date(2031, 3, 10));

        let before = world
            .service
            .day_shrinkage(&manager(), TeamId(1), date(2031, 3, 10))
            .expect("forecast");
        assert_eq!(before.shrinkage_pct, 10.0);

        world.service.cancel(&member(2), id).expect("cancel");

        let after = world
            .service
            .day_shrinkage(&manager(), TeamId(1), date(2031, 3, 10))
            .expect("forecast");
        assert_eq!(after.shrinkage_pct, 0.0);
    }

    #[test]
    fn forecast_is_manager_scoped() {
        let world = world();

        let err = world
            .service
            .day_shrinkage(&member(2), TeamId(1), date(2031, 3, 10))
            .expect_err("associates may not read forecasts");
        assert!(matches!(err, LeaveServiceError::Authorization(_)));

        // The cross-team viewer may read any team.
        let l5 = leave_engine::leave::AuthContext {
            user_id: leave_engine::leave::UserId(15),
            role: Role::L5,
            team_id: TeamId(2),
        };
        world
            .service
            .day_shrinkage(&l5, TeamId(1), date(2031, 3, 10))
            .expect("L5 scope spans teams");
    }

    #[test]
    fn window_reports_shrinkage_per_day() {
        let world = world();
        approved_leave(&world, 2, date(2031, 3, 10), date(2031, 3, 12));

        let snapshot = world
            .service
            .forecast_window(&manager(), TeamId(1), date(2031, 3, 9), date(2031, 3, 13))
            .expect("window");
        assert!(!snapshot.stale);
        let pcts: Vec<f64> = snapshot.days.iter().map(|d| d.shrinkage_pct).collect();
        assert_eq!(pcts, vec![0.0, 10.0, 10.0, 10.0, 0.0]);
    }
}

mod reports {
    use super::common::*;
    use leave_engine::leave::{MonthlyStatus, TeamId, UserId};

    #[test]
    fn carry_forward_tracks_elapsed_weeks() {
        let world = world();
        // asha out the full week of Jun 3-9 2024, liam out Jun 10-13.
        approved_leave(&world, 2, date(2024, 6, 3), date(2024, 6, 9));
        approved_leave(&world, 3, date(2024, 6, 10), date(2024, 6, 13));

        let report = world
            .service
            .carry_forward(&manager(), TeamId(1), 2024, 6)
            .expect("report");

        assert_eq!(report.monthly_target, 20.0);
        assert_eq!(report.weeks[1].shrinkage_pct, 10.0);
        assert_eq!(report.weeks[2].shrinkage_pct, 5.71);
        // The whole month is in the past, so every week has been consumed.
        assert_eq!(report.cumulative_used, 15.71);
        assert_eq!(report.carry_forward, 4.29);
        assert_eq!(report.status, MonthlyStatus::Tight);
    }

    #[test]
    fn exceeded_budget_is_flagged() {
        let world = world();
        // Three of ten out for the whole week of Jun 3-9: that one week
        // already burns past the 20 percent monthly target.
        for user in 2..=4 {
            approved_leave(&world, user, date(2024, 6, 3), date(2024, 6, 9));
        }

        let report = world
            .service
            .carry_forward(&manager(), TeamId(1), 2024, 6)
            .expect("report");
        assert_eq!(report.status, MonthlyStatus::Exceeded);
        assert!(report.carry_forward < 0.0);
    }

    #[test]
    fn leave_pattern_summarizes_month() {
        let world = world();
        approved_leave(&world, 2, date(2024, 6, 3), date(2024, 6, 4));
        approved_leave(&world, 2, date(2024, 6, 10), date(2024, 6, 10));

        let pattern = world
            .service
            .leave_pattern(&manager(), UserId(2), 2024, 6)
            .expect("pattern");
        assert_eq!(pattern.username, "asha");
        assert_eq!(pattern.monthly_summary.get("CL"), Some(&3));
        // Jun 3 and Jun 10 are both Mondays.
        assert_eq!(pattern.frequent_days.get("Monday"), Some(&2));

        // Members may read their own pattern without manager scope.
        world
            .service
            .leave_pattern(&member(2), UserId(2), 2024, 6)
            .expect("own pattern");
    }
}

mod routing {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn forecast_endpoint_returns_window() {
        let world = world();
        approved_leave(&world, 2, date(2031, 3, 10), date(2031, 3, 11));
        let router = router(&world);

        let response = router
            .clone()
            .oneshot(get(
                "/api/v1/leave/team/1/forecast?from=2031-03-09&to=2031-03-12",
                "token-priya",
            ))
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let payload = body_json(response).await;
        assert_eq!(payload.get("status"), Some(&json!("success")));
        assert_eq!(payload.pointer("/data/stale"), Some(&json!(false)));
        let days = payload
            .pointer("/data/days")
            .and_then(Value::as_array)
            .expect("days");
        assert_eq!(days.len(), 4);
        assert_eq!(days[1].get("shrinkage_pct"), Some(&json!(10.0)));
        assert_eq!(days[1].get("status"), Some(&json!("Tight")));
    }

    #[tokio::test]
    async fn half_open_window_is_bad_request() {
        let world = world();
        let router = router(&world);

        let response = router
            .clone()
            .oneshot(get(
                "/api/v1/leave/team/1/forecast?from=2031-03-09",
                "token-priya",
            ))
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_json(response).await;
        assert_eq!(payload.pointer("/error/kind"), Some(&json!("validation")));
    }

    #[tokio::test]
    async fn shrinkage_endpoint_is_forbidden_to_foreign_managers() {
        let world = world();
        let router = router(&world);

        let response = router
            .clone()
            .oneshot(get(
                "/api/v1/leave/team/1/shrinkage?date=2031-03-10",
                "token-sofia",
            ))
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn carry_forward_endpoint_reports_month() {
        let world = world();
        approved_leave(&world, 2, date(2024, 6, 3), date(2024, 6, 9));
        let router = router(&world);

        let response = router
            .clone()
            .oneshot(get(
                "/api/v1/leave/team/1/carry-forward?year=2024&month=6",
                "token-priya",
            ))
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let payload = body_json(response).await;
        assert_eq!(payload.pointer("/data/monthly_target"), Some(&json!(20.0)));
        assert_eq!(payload.pointer("/data/cumulative_used"), Some(&json!(10.0)));
        assert_eq!(payload.pointer("/data/carry_forward"), Some(&json!(10.0)));
        assert_eq!(payload.pointer("/data/status"), Some(&json!("Tight")));
    }

    #[tokio::test]
    async fn pattern_endpoint_returns_summary() {
        let world = world();
        approved_leave(&world, 2, date(2024, 6, 3), date(2024, 6, 4));
        let router = router(&world);

        let response = router
            .clone()
            .oneshot(get(
                "/api/v1/leave/users/2/pattern?year=2024&month=6",
                "token-priya",
            ))
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let payload = body_json(response).await;
        assert_eq!(payload.pointer("/data/username"), Some(&json!("asha")));
        assert_eq!(payload.pointer("/data/monthly_summary/CL"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn on_leave_today_is_open_to_team_members() {
        let world = world();
        let router = router(&world);

        let response = router
            .clone()
            .oneshot(get("/api/v1/leave/team/1/on-leave-today", "token-asha"))
            .await
            .expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);

        let payload = body_json(response).await;
        assert_eq!(payload.pointer("/data/team_id"), Some(&json!(1)));
        assert!(payload.pointer("/data/on_leave").is_some());
    }
}
