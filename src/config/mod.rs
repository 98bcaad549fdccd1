use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub policy: LeavePolicyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let policy = LeavePolicyConfig::load()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            policy,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Staffing-risk policy dials shared by the forecast engine and the
/// carry-forward accumulator.
///
/// The severity thresholds are one documented set: a day is `Safe` strictly
/// below `safe_below_pct`, `Tight` up to and including `tight_max_pct`, and
/// `Overbooked` above that. Loading rejects threshold pairs that would break
/// monotonic severity.
#[derive(Debug, Clone)]
pub struct LeavePolicyConfig {
    pub safe_below_pct: f64,
    pub tight_max_pct: f64,
    pub monthly_target_pct: f64,
    pub balance_grant_days: f64,
    pub monthly_leave_cap: u32,
    pub forecast_horizon_days: u32,
    pub forecast_staleness: Duration,
    pub refresh_period: Duration,
}

impl LeavePolicyConfig {
    fn load() -> Result<Self, ConfigError> {
        let mut policy = Self::default();

        if let Ok(raw) = env::var("LEAVE_SAFE_BELOW_PCT") {
            policy.safe_below_pct = parse_policy_f64("LEAVE_SAFE_BELOW_PCT", &raw)?;
        }
        if let Ok(raw) = env::var("LEAVE_TIGHT_MAX_PCT") {
            policy.tight_max_pct = parse_policy_f64("LEAVE_TIGHT_MAX_PCT", &raw)?;
        }
        if let Ok(raw) = env::var("LEAVE_MONTHLY_TARGET_PCT") {
            policy.monthly_target_pct = parse_policy_f64("LEAVE_MONTHLY_TARGET_PCT", &raw)?;
        }
        if let Ok(raw) = env::var("LEAVE_BALANCE_GRANT_DAYS") {
            policy.balance_grant_days = parse_policy_f64("LEAVE_BALANCE_GRANT_DAYS", &raw)?;
        }
        if let Ok(raw) = env::var("LEAVE_MONTHLY_CAP") {
            policy.monthly_leave_cap = parse_policy_u64("LEAVE_MONTHLY_CAP", &raw)? as u32;
        }
        if let Ok(raw) = env::var("LEAVE_FORECAST_HORIZON_DAYS") {
            policy.forecast_horizon_days =
                parse_policy_u64("LEAVE_FORECAST_HORIZON_DAYS", &raw)? as u32;
        }
        if let Ok(raw) = env::var("LEAVE_FORECAST_STALENESS_SECS") {
            policy.forecast_staleness =
                Duration::from_secs(parse_policy_u64("LEAVE_FORECAST_STALENESS_SECS", &raw)?);
        }
        if let Ok(raw) = env::var("LEAVE_REFRESH_PERIOD_SECS") {
            policy.refresh_period =
                Duration::from_secs(parse_policy_u64("LEAVE_REFRESH_PERIOD_SECS", &raw)?);
        }

        if policy.safe_below_pct > policy.tight_max_pct {
            return Err(ConfigError::ThresholdOrdering {
                safe: policy.safe_below_pct,
                tight: policy.tight_max_pct,
            });
        }
        if policy.forecast_horizon_days == 0 {
            return Err(ConfigError::InvalidPolicyValue {
                key: "LEAVE_FORECAST_HORIZON_DAYS",
            });
        }

        Ok(policy)
    }
}

impl Default for LeavePolicyConfig {
    fn default() -> Self {
        Self {
            safe_below_pct: 6.0,
            tight_max_pct: 10.0,
            monthly_target_pct: 20.0,
            balance_grant_days: 10.0,
            monthly_leave_cap: 5,
            forecast_horizon_days: 30,
            forecast_staleness: Duration::from_secs(30),
            refresh_period: Duration::from_secs(300),
        }
    }
}

fn parse_policy_f64(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidPolicyValue { key })?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidPolicyValue { key })
    }
}

fn parse_policy_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidPolicyValue { key })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPolicyValue { key: &'static str },
    ThresholdOrdering { safe: f64, tight: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPolicyValue { key } => {
                write!(f, "{key} must be a non-negative number")
            }
            ConfigError::ThresholdOrdering { safe, tight } => {
                write!(
                    f,
                    "safe threshold {safe} must not exceed tight threshold {tight}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("LEAVE_SAFE_BELOW_PCT");
        env::remove_var("LEAVE_TIGHT_MAX_PCT");
        env::remove_var("LEAVE_MONTHLY_TARGET_PCT");
        env::remove_var("LEAVE_BALANCE_GRANT_DAYS");
        env::remove_var("LEAVE_MONTHLY_CAP");
        env::remove_var("LEAVE_FORECAST_HORIZON_DAYS");
        env::remove_var("LEAVE_FORECAST_STALENESS_SECS");
        env::remove_var("LEAVE_REFRESH_PERIOD_SECS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.policy.safe_below_pct, 6.0);
        assert_eq!(config.policy.tight_max_pct, 10.0);
        assert_eq!(config.policy.balance_grant_days, 10.0);
        assert_eq!(config.policy.monthly_leave_cap, 5);
        assert_eq!(config.policy.forecast_horizon_days, 30);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEAVE_SAFE_BELOW_PCT", "12");
        env::set_var("LEAVE_TIGHT_MAX_PCT", "10");
        let result = AppConfig::load();
        assert!(matches!(
            result,
            Err(ConfigError::ThresholdOrdering { .. })
        ));
        reset_env();
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }
}
