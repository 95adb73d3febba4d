//! Fare quotes and demand-based surge.

pub mod fare;
pub mod surge;

pub use fare::FareSchedule;
pub use surge::{bucket_by_distance, heatmap, surge, surge_with_cap, zone_label, SurgeEstimator};
