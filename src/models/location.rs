use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_BATCH_POINTS: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::Validation(format!(
                "lat {} must be between -90 and 90",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "lng {} must be between -180 and 180",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Immutable GPS sample. Rows are only ever appended by the ingestion
/// pipeline and removed by housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderLocation {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub order_id: Option<Uuid>,
    pub lat: f64,
    pub lng: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy: Option<f64>,
    pub battery: Option<u8>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub battery: Option<u8>,
}

impl LocationPoint {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            ts: None,
            accuracy: None,
            speed: None,
            heading: None,
            battery: None,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationBatch {
    pub rider_id: Uuid,
    pub points: Vec<LocationPoint>,
}

impl LocationBatch {
    /// Rejects the whole batch if any point is out of range; nothing is
    /// persisted for a batch that fails here.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.points.is_empty() {
            return Err(AppError::Validation(
                "points must contain at least one sample".to_string(),
            ));
        }
        if self.points.len() > MAX_BATCH_POINTS {
            return Err(AppError::Validation(format!(
                "points may contain at most {MAX_BATCH_POINTS} samples, got {}",
                self.points.len()
            )));
        }

        for (index, point) in self.points.iter().enumerate() {
            point
                .position()
                .validate()
                .map_err(|err| AppError::Validation(format!("points[{index}]: {err}")))?;

            if let Some(battery) = point.battery.filter(|battery| *battery > 100) {
                return Err(AppError::Validation(format!(
                    "points[{index}]: battery {battery} must be between 0 and 100"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{LocationBatch, LocationPoint, MAX_BATCH_POINTS};
    use crate::error::AppError;

    fn batch(points: Vec<LocationPoint>) -> LocationBatch {
        LocationBatch {
            rider_id: Uuid::new_v4(),
            points,
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            batch(vec![]).validate(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn batch_at_limit_is_accepted() {
        let points = (0..MAX_BATCH_POINTS)
            .map(|i| LocationPoint::at(24.86 + i as f64 * 0.0001, 67.0))
            .collect();
        assert!(batch(points).validate().is_ok());
    }

    #[test]
    fn batch_over_limit_is_rejected() {
        let points = (0..=MAX_BATCH_POINTS)
            .map(|_| LocationPoint::at(24.86, 67.0))
            .collect();
        assert!(matches!(
            batch(points).validate(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let bad_lat = batch(vec![LocationPoint::at(91.0, 0.0)]);
        let bad_lng = batch(vec![LocationPoint::at(0.0, -180.5)]);

        assert!(bad_lat.validate().is_err());
        assert!(bad_lng.validate().is_err());
    }

    #[test]
    fn battery_above_100_is_rejected() {
        let mut point = LocationPoint::at(24.86, 67.0);
        point.battery = Some(101);
        assert!(batch(vec![point]).validate().is_err());
    }
}
