use std::env;
use std::time::Duration;

use crate::engine::matching::NoMatchPolicy;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Tunables of the dispatch core. `Default` mirrors the production defaults.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub topic_capacity: usize,
    pub notification_buffer_size: usize,
    /// Pickup times further out than this are created as SCHEDULED.
    pub schedule_lookahead: Duration,
    pub scheduler_interval: Duration,
    /// Scheduled bookings due within this window are activated.
    pub activation_window: Duration,
    pub search_radius_km: f64,
    pub max_pickup_distance_km: f64,
    pub ride_code_ttl: Duration,
    pub publish_timeout: Duration,
    pub matching_timeout: Duration,
    pub no_match_policy: NoMatchPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            topic_capacity: 100,
            notification_buffer_size: 1024,
            schedule_lookahead: Duration::from_secs(20 * 60),
            scheduler_interval: Duration::from_secs(60),
            activation_window: Duration::from_secs(15 * 60),
            search_radius_km: 2.0,
            max_pickup_distance_km: 5.0,
            ride_code_ttl: Duration::from_secs(60 * 60),
            publish_timeout: Duration::from_millis(2_000),
            matching_timeout: Duration::from_millis(5_000),
            no_match_policy: NoMatchPolicy::Drop,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = DispatchConfig::default();

        let retry_attempts: u32 = parse_or_default("NO_MATCH_RETRY_ATTEMPTS", 0)?;
        let retry_backoff_ms: u64 = parse_or_default("NO_MATCH_RETRY_BACKOFF_MS", 30_000)?;
        let no_match_policy = if retry_attempts == 0 {
            NoMatchPolicy::Drop
        } else {
            NoMatchPolicy::Retry {
                max_attempts: retry_attempts,
                backoff: Duration::from_millis(retry_backoff_ms),
            }
        };

        let dispatch = DispatchConfig {
            topic_capacity: parse_or_default("DISPATCH_TOPIC_CAPACITY", defaults.topic_capacity)?,
            notification_buffer_size: parse_or_default(
                "NOTIFICATION_BUFFER_SIZE",
                defaults.notification_buffer_size,
            )?,
            schedule_lookahead: secs_or_default("SCHEDULE_LOOKAHEAD_SECS", defaults.schedule_lookahead)?,
            scheduler_interval: secs_or_default("SCHEDULER_INTERVAL_SECS", defaults.scheduler_interval)?,
            activation_window: secs_or_default("ACTIVATION_WINDOW_SECS", defaults.activation_window)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", defaults.search_radius_km)?,
            max_pickup_distance_km: parse_or_default(
                "MAX_PICKUP_DISTANCE_KM",
                defaults.max_pickup_distance_km,
            )?,
            ride_code_ttl: secs_or_default("RIDE_CODE_TTL_SECS", defaults.ride_code_ttl)?,
            publish_timeout: millis_or_default("PUBLISH_TIMEOUT_MS", defaults.publish_timeout)?,
            matching_timeout: millis_or_default("MATCHING_TIMEOUT_MS", defaults.matching_timeout)?,
            no_match_policy,
        };

        if dispatch.topic_capacity == 0 {
            return Err(AppError::Internal(
                "DISPATCH_TOPIC_CAPACITY must be > 0".to_string(),
            ));
        }

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 8080)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            dispatch,
        })
    }
}

fn secs_or_default(key: &str, default: Duration) -> Result<Duration, AppError> {
    parse_or_default(key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or_default(key: &str, default: Duration) -> Result<Duration, AppError> {
    parse_or_default(key, default.as_millis() as u64).map(Duration::from_millis)
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{millis_or_default, parse_or_default, DispatchConfig};
    use crate::engine::matching::NoMatchPolicy;

    #[test]
    fn defaults_match_documented_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.topic_capacity, 100);
        assert_eq!(config.schedule_lookahead, Duration::from_secs(1200));
        assert_eq!(config.activation_window, Duration::from_secs(900));
        assert_eq!(config.search_radius_km, 2.0);
        assert_eq!(config.no_match_policy, NoMatchPolicy::Drop);
    }

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let port: u16 = parse_or_default("RIDE_DISPATCH_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(port, 8080);

        let timeout =
            millis_or_default("RIDE_DISPATCH_TEST_UNSET_TIMEOUT", Duration::from_millis(250))
                .unwrap();
        assert_eq!(timeout, Duration::from_millis(250));
    }
}
