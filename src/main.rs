use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Duration, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use leave_engine::config::AppConfig;
use leave_engine::error::AppError;
use leave_engine::leave::seed::{demo_world, SeedWorld};
use leave_engine::leave::{
    leave_router, spawn_refresher, AvailabilityForecastEngine, ForecastThresholds, LeaveApi,
    LeaveService, TeamId,
};
use leave_engine::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Leave Engine",
    about = "Run the leave lifecycle and availability forecasting service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print an availability forecast for a team against the demo roster
    Forecast(ForecastArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ForecastArgs {
    /// Team to forecast
    #[arg(long, default_value_t = 1)]
    team: u64,
    /// First forecast day (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,
    /// Number of days to print
    #[arg(long, default_value_t = 14)]
    days: u32,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Forecast(args) => run_forecast_report(args),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let SeedWorld {
        store,
        directory,
        notifier,
        tokens,
        teams,
    } = demo_world();

    let service = Arc::new(LeaveService::new(
        store,
        directory,
        notifier,
        &config.policy,
    ));
    let refresher = spawn_refresher(
        service.forecast_engine(),
        teams,
        config.policy.refresh_period,
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(leave_router(LeaveApi {
            service,
            identity: tokens,
        }))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "leave engine ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.cancel().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

fn run_forecast_report(args: ForecastArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let world = demo_world();

    let engine = AvailabilityForecastEngine::new(
        world.store,
        world.directory,
        ForecastThresholds::from(&config.policy),
        config.policy.forecast_horizon_days,
        config.policy.forecast_staleness,
    );

    let from = args.from.unwrap_or_else(|| Local::now().date_naive());
    let to = from + Duration::days(i64::from(args.days.max(1)) - 1);
    let snapshot = engine
        .forecast(TeamId(args.team), from, to)
        .map_err(|err| AppError::Report(err.to_string()))?;

    println!("Availability forecast for team {}", args.team);
    println!("Window: {} -> {}", from, to);
    for day in &snapshot.days {
        let absentees = if day.on_leave.is_empty() {
            "none".to_string()
        } else {
            day.on_leave
                .iter()
                .map(|entry| entry.username.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "- {} | {:>6.2}% | {} | out: {}",
            day.date,
            day.shrinkage_pct,
            day.status.label(),
            absentees
        );
    }

    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
