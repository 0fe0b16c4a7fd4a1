use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::location::GeoPoint;

/// Upper bound for retention windows; keeps day arithmetic in range.
pub const MAX_RETENTION_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub dispatch: DispatchConfig,
    pub housekeeping: HousekeepingConfig,
}

/// Knobs consumed by the engines.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub pickup_location: Option<GeoPoint>,
    pub geofence_distance_m: f64,
    pub geofence_grace: Duration,
    pub broadcast_throttle: Duration,
    pub lock_timeout: Duration,
    pub strict_transitions: bool,
}

#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    pub interval: Duration,
    pub order_retention_days: i64,
    pub keep_failed_orders: bool,
    pub location_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            dispatch: DispatchConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pickup_location: None,
            geofence_distance_m: 100.0,
            geofence_grace: Duration::from_secs(30),
            broadcast_throttle: Duration::from_millis(1000),
            lock_timeout: Duration::from_millis(5000),
            strict_transitions: false,
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            order_retention_days: 30,
            keep_failed_orders: false,
            location_retention_days: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = Config::default();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )));
            }
        };

        let pickup_location = match (
            parse_optional::<f64>("PICKUP_LOCATION_LAT")?,
            parse_optional::<f64>("PICKUP_LOCATION_LNG")?,
        ) {
            (Some(lat), Some(lng)) => {
                let point = GeoPoint { lat, lng };
                point
                    .validate()
                    .map_err(|err| AppError::Internal(format!("invalid pickup location: {err}")))?;
                Some(point)
            }
            _ => None,
        };

        let dispatch = DispatchConfig {
            pickup_location,
            geofence_distance_m: parse_or_default(
                "GEOFENCE_DISTANCE_METERS",
                defaults.dispatch.geofence_distance_m,
            )?,
            geofence_grace: Duration::from_secs(parse_or_default("GEOFENCE_GRACE_SECS", 30)?),
            broadcast_throttle: Duration::from_millis(parse_or_default(
                "LOCATION_BROADCAST_THROTTLE_MS",
                1000,
            )?),
            lock_timeout: Duration::from_millis(parse_or_default("LOCK_TIMEOUT_MS", 5000)?),
            strict_transitions: parse_or_default("STRICT_TRANSITIONS", false)?,
        };

        let housekeeping = HousekeepingConfig {
            interval: Duration::from_secs(parse_or_default("HOUSEKEEPING_INTERVAL_SECS", 3600)?),
            order_retention_days: parse_or_default(
                "ORDER_RETENTION_DAYS",
                defaults.housekeeping.order_retention_days,
            )?,
            keep_failed_orders: parse_or_default("KEEP_FAILED_ORDERS", false)?,
            location_retention_days: parse_or_default(
                "LOCATION_RETENTION_DAYS",
                defaults.housekeeping.location_retention_days,
            )?,
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            dispatch,
            housekeeping,
        };
        config.validate()?;

        Ok(config)
    }

    /// Rejects values that parse but cannot be used: a zero-capacity event
    /// channel or retention windows outside `0..=MAX_RETENTION_DAYS`.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be greater than zero".to_string(),
            ));
        }
        self.housekeeping.validate()
    }
}

impl HousekeepingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        check_retention("ORDER_RETENTION_DAYS", self.order_retention_days)?;
        check_retention("LOCATION_RETENTION_DAYS", self.location_retention_days)
    }
}

fn check_retention(key: &str, days: i64) -> Result<(), AppError> {
    if !(0..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(AppError::Internal(format!(
            "invalid {key}: {days}, expected 0..={MAX_RETENTION_DAYS}"
        )));
    }
    Ok(())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
