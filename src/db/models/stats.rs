//! Admin dashboard DTOs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ride counts per distance zone, e.g. `{"3km-radius": 4}`
pub type Heatmap = BTreeMap<String, i64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOverview {
    pub rides_24h: i64,
    pub revenue_24h: f64,
    pub active_drivers: i64,
    pub hourly_hours: Vec<u32>,
    pub hourly_counts: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapResponse {
    pub heat: Heatmap,
    pub surge: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeResponse {
    pub multiplier: f64,
}
