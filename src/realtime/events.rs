//! Wire format of the realtime feed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::OutboundMessage;
use crate::db::{Ride, RideStatus};

/// Every frame pushed to a socket is one of these, tagged by `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RideEvent {
    DriverLocation {
        driver_key: String,
        location: Value,
    },
    NewRequest {
        ride: Ride,
    },
    RideStatus {
        ride_id: String,
        status: RideStatus,
        driver_name: String,
    },
}

impl RideEvent {
    /// Build a location event from a raw driver frame. Frames that are not
    /// JSON are forwarded as `{"raw": <text>}`.
    pub fn driver_location(driver_key: &str, frame: &str) -> Self {
        let location = serde_json::from_str::<Value>(frame)
            .unwrap_or_else(|_| serde_json::json!({ "raw": frame }));
        Self::DriverLocation {
            driver_key: driver_key.to_string(),
            location,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DriverLocation { .. } => "driver_location",
            Self::NewRequest { .. } => "new_request",
            Self::RideStatus { .. } => "ride_status",
        }
    }

    pub fn to_message(&self) -> Result<OutboundMessage, serde_json::Error> {
        serde_json::to_string(self).map(OutboundMessage::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_frame_is_parsed_as_json() {
        let event = RideEvent::driver_location("d-7", r#"{"lat": 5.6, "lng": -0.18}"#);
        let json: Value = serde_json::from_str(&event.to_message().unwrap()).unwrap();
        assert_eq!(json["event"], "driver_location");
        assert_eq!(json["driver_key"], "d-7");
        assert_eq!(json["location"]["lat"], 5.6);
    }

    #[test]
    fn test_non_json_frame_is_wrapped_as_raw() {
        let event = RideEvent::driver_location("d-7", "near the mall");
        let json: Value = serde_json::from_str(&event.to_message().unwrap()).unwrap();
        assert_eq!(json["location"], serde_json::json!({ "raw": "near the mall" }));
    }

    #[test]
    fn test_ride_status_shape() {
        let event = RideEvent::RideStatus {
            ride_id: "r-1".to_string(),
            status: RideStatus::Accepted,
            driver_name: "Ama".to_string(),
        };
        assert_eq!(event.name(), "ride_status");
        let json: Value = serde_json::from_str(&event.to_message().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "ride_status",
                "ride_id": "r-1",
                "status": "accepted",
                "driver_name": "Ama",
            })
        );
    }
}
