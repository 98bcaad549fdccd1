use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::approval::LeaveDecision;
use super::directory::{IdentityResolver, TeamDirectory};
use super::domain::{AuthContext, DecisionAction, RequestId, TeamId, UserId};
use super::notify::NotificationDispatcher;
use super::service::{ApplyLeave, EditLeave, LeaveService, LeaveServiceError};
use super::store::LeaveRequestStore;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Shared router state: the service facade plus the token resolver.
pub struct LeaveApi<S, D, N, I> {
    pub service: Arc<LeaveService<S, D, N>>,
    pub identity: Arc<I>,
}

impl<S, D, N, I> Clone for LeaveApi<S, D, N, I> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            identity: Arc::clone(&self.identity),
        }
    }
}

/// Wire error: envelope kind plus HTTP status.
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "authorization",
            message: "missing or invalid bearer token".to_string(),
        }
    }
}

impl From<LeaveServiceError> for ApiError {
    fn from(err: LeaveServiceError) -> Self {
        let status = match &err {
            LeaveServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            LeaveServiceError::Conflict { .. } => StatusCode::CONFLICT,
            LeaveServiceError::Authorization(_) => StatusCode::FORBIDDEN,
            LeaveServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            LeaveServiceError::ImmutableState(_) | LeaveServiceError::InvalidTransition(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LeaveServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "error",
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

fn success<T: Serialize>(data: T) -> Response {
    Json(json!({ "status": "success", "data": data })).into_response()
}

fn authenticate<I: IdentityResolver>(
    headers: &HeaderMap,
    identity: &I,
) -> Result<AuthContext, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthenticated)?;
    identity
        .resolve(token)
        .ok_or_else(ApiError::unauthenticated)
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    year: i32,
    month: u32,
}

#[derive(Debug, Deserialize)]
struct DecisionBody {
    action: DecisionAction,
    #[serde(default)]
    comments: Option<String>,
}

#[derive(Debug, Serialize)]
struct DecisionResponse<T> {
    #[serde(flatten)]
    request: T,
    replayed: bool,
}

/// All leave endpoints under `/api/v1/leave`.
pub fn leave_router<S, D, N, I>(api: LeaveApi<S, D, N, I>) -> Router
where
    S: LeaveRequestStore + 'static,
    D: TeamDirectory + 'static,
    N: NotificationDispatcher + 'static,
    I: IdentityResolver + 'static,
{
    Router::new()
        .route("/api/v1/leave/apply", post(apply))
        .route("/api/v1/leave/history", get(history))
        .route("/api/v1/leave/balance", get(balance))
        .route("/api/v1/leave/requests/:id", put(edit).delete(cancel))
        .route("/api/v1/leave/requests/:id/cancel", post(cancel))
        .route("/api/v1/leave/requests/:id/decision", post(decide))
        .route("/api/v1/leave/approvals/pending", get(pending_approvals))
        .route("/api/v1/leave/team/:team_id/members", get(team_members))
        .route("/api/v1/leave/team/:team_id/forecast", get(forecast))
        .route("/api/v1/leave/team/:team_id/shrinkage", get(day_shrinkage))
        .route(
            "/api/v1/leave/team/:team_id/on-leave-today",
            get(on_leave_today),
        )
        .route(
            "/api/v1/leave/team/:team_id/carry-forward",
            get(carry_forward),
        )
        .route("/api/v1/leave/users/:user_id/pattern", get(leave_pattern))
        .route("/api/v1/leave/notifications", get(notifications))
        .route(
            "/api/v1/leave/notifications/read",
            post(mark_notifications_read),
        )
        .with_state(api)
}

async fn apply<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    headers: HeaderMap,
    Json(payload): Json<ApplyLeave>,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    let record = api.service.apply(&actor, payload)?;
    Ok((StatusCode::CREATED, success(record)).into_response())
}

async fn history<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.history(&actor)?))
}

async fn balance<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.balance_summary(&actor)))
}

async fn edit<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(changes): Json<EditLeave>,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.edit(&actor, RequestId(id), changes)?))
}

async fn cancel<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.cancel(&actor, RequestId(id))?))
}

async fn decide<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<DecisionBody>,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    let token = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let outcome = api.service.decide(
        &actor,
        LeaveDecision {
            request: RequestId(id),
            action: body.action,
            comments: body.comments,
            idempotency_token: token,
        },
    )?;

    Ok(success(DecisionResponse {
        request: outcome.request,
        replayed: outcome.replayed,
    }))
}

async fn pending_approvals<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.pending_approvals(&actor)?))
}

async fn team_members<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(team_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.team_members(&actor, TeamId(team_id))?))
}

async fn forecast<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(team_id): Path<u64>,
    Query(query): Query<ForecastQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    let snapshot = match (query.from, query.to) {
        (Some(from), Some(to)) => api
            .service
            .forecast_window(&actor, TeamId(team_id), from, to)?,
        (None, None) => api.service.forecast_ahead(&actor, TeamId(team_id))?,
        _ => {
            return Err(LeaveServiceError::Validation(
                "from and to must be supplied together".to_string(),
            )
            .into())
        }
    };
    Ok(success(snapshot))
}

async fn day_shrinkage<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(team_id): Path<u64>,
    Query(query): Query<DateQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.day_shrinkage(
        &actor,
        TeamId(team_id),
        query.date,
    )?))
}

async fn on_leave_today<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(team_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.on_leave_today(&actor, TeamId(team_id))?))
}

async fn carry_forward<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(team_id): Path<u64>,
    Query(query): Query<MonthQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.carry_forward(
        &actor,
        TeamId(team_id),
        query.year,
        query.month,
    )?))
}

async fn leave_pattern<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    Path(user_id): Path<u64>,
    Query(query): Query<MonthQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.leave_pattern(
        &actor,
        UserId(user_id),
        query.year,
        query.month,
    )?))
}

async fn notifications<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    Ok(success(api.service.notifications(&actor)?))
}

async fn mark_notifications_read<S, D, N, I>(
    State(api): State<LeaveApi<S, D, N, I>>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
    N: NotificationDispatcher,
    I: IdentityResolver,
{
    let actor = authenticate(&headers, api.identity.as_ref())?;
    let marked = api.service.mark_notifications_read(&actor)?;
    Ok(success(json!({ "marked_read": marked })))
}
