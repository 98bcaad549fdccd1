use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, NaiveDate};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::LeavePolicyConfig;

use super::directory::TeamDirectory;
use super::domain::{
    DailyForecast, ForecastSnapshot, ForecastStatus, LeaveStatus, OnLeaveEntry, TeamId,
};
use super::store::{LeaveRequestStore, StoreError};

/// Severity cutoffs, taken from policy configuration at startup.
#[derive(Debug, Clone, Copy)]
pub struct ForecastThresholds {
    pub safe_below: f64,
    pub tight_max: f64,
}

impl ForecastThresholds {
    /// Classify a shrinkage percentage. Strictly below `safe_below` is Safe,
    /// up to and including `tight_max` is Tight, above is Overbooked.
    pub fn classify(&self, shrinkage_pct: f64) -> ForecastStatus {
        if shrinkage_pct < self.safe_below {
            ForecastStatus::Safe
        } else if shrinkage_pct <= self.tight_max {
            ForecastStatus::Tight
        } else {
            ForecastStatus::Overbooked
        }
    }
}

impl From<&LeavePolicyConfig> for ForecastThresholds {
    fn from(policy: &LeavePolicyConfig) -> Self {
        Self {
            safe_below: policy.safe_below_pct,
            tight_max: policy.tight_max_pct,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("forecast window start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
}

#[derive(Clone)]
struct CachedDay {
    forecast: DailyForecast,
    computed_at: Instant,
}

/// Derives per-day shrinkage from approved leave and the team roster.
///
/// Forecasts are a pure projection of store state, recomputed on demand and
/// memoized per `(team, date)` with a staleness bound. A recompute failure
/// falls back to the last cached value with the snapshot marked stale rather
/// than failing the read.
pub struct AvailabilityForecastEngine<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    thresholds: ForecastThresholds,
    horizon_days: u32,
    staleness: Duration,
    cache: Mutex<HashMap<(TeamId, NaiveDate), CachedDay>>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl<S, D> AvailabilityForecastEngine<S, D>
where
    S: LeaveRequestStore,
    D: TeamDirectory,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        thresholds: ForecastThresholds,
        horizon_days: u32,
        staleness: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            thresholds,
            horizon_days,
            staleness,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn thresholds(&self) -> ForecastThresholds {
        self.thresholds
    }

    pub fn roster_size(&self, team: TeamId) -> usize {
        self.directory.team_members(team).len()
    }

    /// Forecast the inclusive window `[from, to]`, clamped to the configured
    /// horizon counted from `from`.
    pub fn forecast(
        &self,
        team: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ForecastSnapshot, ForecastError> {
        if from > to {
            return Err(ForecastError::InvalidWindow {
                start: from,
                end: to,
            });
        }

        let horizon_end = from + ChronoDuration::days(i64::from(self.horizon_days) - 1);
        let end = to.min(horizon_end);

        let mut days = Vec::new();
        let mut stale = false;
        let mut date = from;
        while date <= end {
            let (forecast, served_stale) = self.day(team, date)?;
            stale = stale || served_stale;
            days.push(forecast);
            date += ChronoDuration::days(1);
        }

        Ok(ForecastSnapshot { days, stale })
    }

    /// Single-day view; `stale` in the pair marks a cache entry served past
    /// its freshness bound after a failed recompute.
    pub fn day(&self, team: TeamId, date: NaiveDate) -> Result<(DailyForecast, bool), ForecastError> {
        let key = (team, date);

        {
            let cache = self.cache.lock().expect("forecast cache poisoned");
            if let Some(cached) = cache.get(&key) {
                if cached.computed_at.elapsed() <= self.staleness {
                    return Ok((cached.forecast.clone(), false));
                }
            }
        }

        match self.compute_day(team, date) {
            Ok(forecast) => {
                let mut cache = self.cache.lock().expect("forecast cache poisoned");
                cache.insert(
                    key,
                    CachedDay {
                        forecast: forecast.clone(),
                        computed_at: Instant::now(),
                    },
                );
                Ok((forecast, false))
            }
            Err(err) => {
                let cache = self.cache.lock().expect("forecast cache poisoned");
                if let Some(cached) = cache.get(&key) {
                    tracing::warn!(
                        team = %team,
                        %date,
                        error = %err,
                        "serving stale forecast after failed recompute"
                    );
                    Ok((cached.forecast.clone(), true))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn compute_day(&self, team: TeamId, date: NaiveDate) -> Result<DailyForecast, ForecastError> {
        let approved = self.store.list_for_team(team, Some(LeaveStatus::Approved))?;
        let roster = self.directory.team_members(team);

        let mut on_leave: Vec<OnLeaveEntry> = approved
            .iter()
            .filter(|request| request.covers(date))
            .map(|request| OnLeaveEntry {
                user_id: request.user_id,
                username: self
                    .directory
                    .member(request.user_id)
                    .map(|member| member.username)
                    .unwrap_or_else(|| format!("user-{}", request.user_id)),
                leave_type: request.leave_type,
                is_half_day: request.is_half_day,
            })
            .collect();
        on_leave.sort_by_key(|entry| entry.user_id);

        let shrinkage_pct = if roster.is_empty() {
            0.0
        } else {
            round2(100.0 * on_leave.len() as f64 / roster.len() as f64)
        };

        Ok(DailyForecast {
            date,
            team_id: team,
            shrinkage_pct,
            status: self.thresholds.classify(shrinkage_pct),
            on_leave,
        })
    }

    /// Drop cached days touched by a request so the next read recomputes.
    pub fn invalidate(&self, team: TeamId, start: NaiveDate, end: NaiveDate) {
        let mut cache = self.cache.lock().expect("forecast cache poisoned");
        cache.retain(|(cached_team, date), _| {
            *cached_team != team || *date < start || *date > end
        });
    }

    /// Drop cached days that have fallen behind the rolling window so the
    /// cache stays bounded as dates roll past.
    pub fn evict_before(&self, team: TeamId, cutoff: NaiveDate) {
        let mut cache = self.cache.lock().expect("forecast cache poisoned");
        cache.retain(|(cached_team, date), _| *cached_team != team || *date >= cutoff);
    }

    fn refresh_team(&self, team: TeamId, today: NaiveDate) {
        let end = today + ChronoDuration::days(i64::from(self.horizon_days) - 1);
        self.evict_before(team, today);
        self.invalidate(team, today, end);
        if let Err(err) = self.forecast(team, today, end) {
            tracing::warn!(team = %team, error = %err, "background forecast refresh failed");
        }
    }
}

/// Handle to the background refresher; dropping it without calling
/// [`RefreshHandle::cancel`] leaves the task running until runtime shutdown.
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub async fn cancel(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Periodically rebuild the forecast window for every known team so reads
/// stay warm between invalidations.
pub fn spawn_refresher<S, D>(
    engine: Arc<AvailabilityForecastEngine<S, D>>,
    teams: Vec<TeamId>,
    period: Duration,
) -> RefreshHandle
where
    S: LeaveRequestStore + 'static,
    D: TeamDirectory + 'static,
{
    let (shutdown, mut watcher) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let today = chrono::Local::now().date_naive();
                    for team in &teams {
                        engine.refresh_team(*team, today);
                    }
                    tracing::debug!(teams = teams.len(), "forecast cache refreshed");
                }
                changed = watcher.changed() => {
                    if changed.is_err() || *watcher.borrow() {
                        break;
                    }
                }
            }
        }
    });

    RefreshHandle { shutdown, task }
}
