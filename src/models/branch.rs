use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Branch {
    /// Whether `time` falls inside the operating window. A window whose
    /// closing time is earlier than its opening time runs past midnight.
    /// Branches without configured hours are always open.
    pub fn is_open_at(&self, time: NaiveTime) -> bool {
        let (Some(opening), Some(closing)) = (self.opening_time, self.closing_time) else {
            return true;
        };

        if closing < opening {
            time >= opening || time < closing
        } else {
            time >= opening && time < closing
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Utc};
    use uuid::Uuid;

    use super::Branch;

    fn branch(opening: Option<&str>, closing: Option<&str>) -> Branch {
        let parse = |s: &str| NaiveTime::parse_from_str(s, "%H:%M").unwrap();
        Branch {
            id: Uuid::new_v4(),
            name: "Clifton".to_string(),
            code: "CLF".to_string(),
            address: None,
            phone: None,
            pickup: None,
            opening_time: opening.map(parse),
            closing_time: closing.map(parse),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn daytime_window() {
        let b = branch(Some("08:00"), Some("22:00"));
        assert!(b.is_open_at(at(8, 0)));
        assert!(b.is_open_at(at(21, 59)));
        assert!(!b.is_open_at(at(22, 0)));
        assert!(!b.is_open_at(at(3, 0)));
    }

    #[test]
    fn overnight_window_spans_midnight() {
        let b = branch(Some("16:00"), Some("04:00"));
        assert!(b.is_open_at(at(16, 0)));
        assert!(b.is_open_at(at(23, 30)));
        assert!(b.is_open_at(at(2, 15)));
        assert!(!b.is_open_at(at(4, 0)));
        assert!(!b.is_open_at(at(12, 0)));
    }

    #[test]
    fn missing_hours_means_always_open() {
        let b = branch(None, Some("04:00"));
        assert!(b.is_open_at(at(12, 0)));
    }
}
