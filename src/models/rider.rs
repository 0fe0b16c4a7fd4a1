use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiderStatus {
    Idle,
    Busy,
    Offline,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Idle => "IDLE",
            RiderStatus::Busy => "BUSY",
            RiderStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for RiderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(RiderStatus::Idle),
            "BUSY" => Ok(RiderStatus::Busy),
            "OFFLINE" => Ok(RiderStatus::Offline),
            other => Err(AppError::Validation(format!(
                "unknown rider status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub branch_id: Option<Uuid>,
    pub status: RiderStatus,
    pub latest_position: Option<GeoPoint>,
    pub battery: Option<u8>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rider {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: None,
            branch_id: None,
            status: RiderStatus::Idle,
            latest_position: None,
            battery: None,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Row shape for the live map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderPosition {
    pub id: Uuid,
    pub name: String,
    pub status: RiderStatus,
    pub lat: f64,
    pub lng: f64,
    pub battery: Option<u8>,
    pub last_seen_at: Option<DateTime<Utc>>,
}
