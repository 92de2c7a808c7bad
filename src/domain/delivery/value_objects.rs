use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Delivery Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    EnRoute,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::EnRoute => "en_route",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(DeliveryStatus::Assigned),
            "en_route" => Ok(DeliveryStatus::EnRoute),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

/// Courier position as last reported.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub label: Option<String>,
}

impl Location {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub status: DeliveryStatus,
    pub location: Option<Location>,
    pub comments: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn assigned(order_id: Uuid, seller_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            seller_id,
            status: DeliveryStatus::Assigned,
            location: None,
            comments: None,
            assigned_at: at,
            started_at: None,
            delivered_at: None,
        }
    }

    /// Records a position. The first fix of an assigned delivery starts it.
    pub fn record_location(&mut self, location: Location, at: DateTime<Utc>) {
        if self.status == DeliveryStatus::Assigned && self.location.is_none() {
            self.status = DeliveryStatus::EnRoute;
            self.started_at = Some(at);
        }
        self.location = Some(location);
    }

    pub fn apply_status(&mut self, status: DeliveryStatus, comments: Option<String>, at: DateTime<Utc>) {
        match status {
            DeliveryStatus::EnRoute => {
                self.started_at.get_or_insert(at);
            }
            DeliveryStatus::Delivered => {
                self.delivered_at = Some(at);
            }
            DeliveryStatus::Assigned | DeliveryStatus::Failed => {}
        }
        self.status = status;
        if comments.is_some() {
            self.comments = comments;
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn location(lat: f64, lon: f64) -> Location {
        Location { latitude: lat, longitude: lon, label: None }
    }

    #[test]
    fn test_location_bounds() {
        assert!(location(10.5, -66.9).is_valid());
        assert!(location(90.0, 180.0).is_valid());
        assert!(location(-90.0, -180.0).is_valid());
        assert!(!location(90.1, 0.0).is_valid());
        assert!(!location(0.0, -180.5).is_valid());
        assert!(!location(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_first_location_starts_delivery() {
        let now = Utc::now();
        let mut delivery = Delivery::assigned(Uuid::new_v4(), Uuid::new_v4(), now);

        delivery.record_location(location(10.0, -66.0), now);
        assert_eq!(delivery.status, DeliveryStatus::EnRoute);
        assert_eq!(delivery.started_at, Some(now));

        let later = now + chrono::Duration::minutes(5);
        delivery.record_location(location(10.1, -66.1), later);
        assert_eq!(delivery.started_at, Some(now));
        assert_eq!(delivery.location.as_ref().unwrap().latitude, 10.1);
    }

    #[test]
    fn test_location_after_failure_keeps_status() {
        let now = Utc::now();
        let mut delivery = Delivery::assigned(Uuid::new_v4(), Uuid::new_v4(), now);
        delivery.apply_status(DeliveryStatus::Failed, Some("no one home".into()), now);

        delivery.record_location(location(1.0, 1.0), now);
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.comments.as_deref(), Some("no one home"));
    }

    #[test]
    fn test_delivered_stamps_time() {
        let now = Utc::now();
        let mut delivery = Delivery::assigned(Uuid::new_v4(), Uuid::new_v4(), now);
        delivery.apply_status(DeliveryStatus::Delivered, None, now);
        assert_eq!(delivery.delivered_at, Some(now));
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
    }
}
