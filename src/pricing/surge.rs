//! Demand heatmap and the surge multiplier derived from it.
//!
//! Recent rides are bucketed by rounded trip distance ("zones"). The busiest
//! zone drives a linear multiplier: every ten rides adds 1.0, capped.

use chrono::{Duration, Utc};
use sqlx::{Executor, Sqlite};

use crate::config::PricingConfig;
use crate::db::{format_timestamp, Heatmap};

pub const DEFAULT_WINDOW_MINUTES: i64 = 10;
pub const MAX_SURGE: f64 = 3.0;

/// Zone label for a trip distance, e.g. `2.4` -> `"2km-radius"`
pub fn zone_label(distance_km: f64) -> String {
    format!("{}km-radius", distance_km.round() as i64)
}

/// Count rides per zone
pub fn bucket_by_distance<I>(distances: I) -> Heatmap
where
    I: IntoIterator<Item = f64>,
{
    let mut heat = Heatmap::new();
    for distance in distances {
        *heat.entry(zone_label(distance)).or_insert(0) += 1;
    }
    heat
}

/// Multiplier for a heatmap using the default 3x cap
pub fn surge(heat: &Heatmap) -> f64 {
    surge_with_cap(heat, MAX_SURGE)
}

pub fn surge_with_cap(heat: &Heatmap, cap: f64) -> f64 {
    match heat.values().max() {
        None => 1.0,
        Some(&max_load) => (1.0 + max_load as f64 / 10.0).min(cap),
    }
}

/// Rides created in the last `window`, bucketed by zone
pub async fn heatmap<'e, E>(executor: E, window: Duration) -> Result<Heatmap, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let cutoff = format_timestamp(Utc::now() - window);
    let distances: Vec<f64> =
        sqlx::query_scalar("SELECT distance_km FROM rides WHERE created_at >= ?")
            .bind(cutoff)
            .fetch_all(executor)
            .await?;
    Ok(bucket_by_distance(distances))
}

/// Heatmap + multiplier with the configured window and cap.
///
/// Recomputed from the rides table on every call.
#[derive(Debug, Clone, Copy)]
pub struct SurgeEstimator {
    window: Duration,
    cap: f64,
}

impl SurgeEstimator {
    pub fn new(window: Duration, cap: f64) -> Self {
        Self { window, cap }
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self::new(Duration::minutes(config.surge_window_minutes), config.surge_cap)
    }

    pub async fn estimate<'e, E>(&self, executor: E) -> Result<(Heatmap, f64), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let heat = heatmap(executor, self.window).await?;
        let multiplier = surge_with_cap(&heat, self.cap);
        Ok((heat, multiplier))
    }
}

impl Default for SurgeEstimator {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_WINDOW_MINUTES), MAX_SURGE)
    }
}
