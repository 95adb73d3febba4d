//! Ride models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Cancelled)
                | (Self::Accepted, Self::Completed)
        )
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RideStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "accepted" => Self::Accepted,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Wallet => "wallet",
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(s: String) -> Self {
        match s.as_str() {
            "wallet" => Self::Wallet,
            _ => Self::Cash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub pickup: String,
    pub dropoff: String,
    pub ride_type: String,
    pub payment_method: String,
    pub promo_code: Option<String>,
    pub distance_km: f64,
    pub duration_min: f64,
    pub surge_multiplier: f64,
    pub fare: f64,
    pub status: String,
    pub created_at: String,
    pub accepted_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
}

impl Ride {
    pub fn status_enum(&self) -> RideStatus {
        RideStatus::from(self.status.clone())
    }

    pub fn payment_method_enum(&self) -> PaymentMethod {
        PaymentMethod::from(self.payment_method.clone())
    }
}

fn default_ride_type() -> String {
    "standard".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRideRequest {
    pub pickup: String,
    pub dropoff: String,
    #[serde(default = "default_ride_type")]
    pub ride_type: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Measured trip distance; zero when the client has no route yet
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub duration_min: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateRideRequest {
    pub stars: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_monotonic() {
        use RideStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Accepted));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateRideRequest =
            serde_json::from_str(r#"{"pickup": "Osu", "dropoff": "Airport"}"#).unwrap();
        assert_eq!(req.ride_type, "standard");
        assert_eq!(req.payment_method, PaymentMethod::Cash);
        assert_eq!(req.distance_km, 0.0);
        assert!(req.promo_code.is_none());
    }

    #[test]
    fn test_unknown_payment_method_is_rejected() {
        let result: Result<CreateRideRequest, _> = serde_json::from_str(
            r#"{"pickup": "Osu", "dropoff": "Airport", "payment_method": "card"}"#,
        );
        assert!(result.is_err());
    }
}
