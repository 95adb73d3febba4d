//! Driver ratings left by riders.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: String,
    pub ride_id: String,
    pub driver_id: String,
    pub rider_id: String,
    pub stars: f64,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResponse {
    pub rating: Rating,
    /// Driver's mean rating after this one was recorded
    pub driver_rating: f64,
}
