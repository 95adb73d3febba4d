use crate::config::PricingConfig;
use crate::db::round_cents;

/// Linear fare: base + distance + time, scaled by surge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareSchedule {
    pub base_fare: f64,
    pub per_km: f64,
    pub per_min: f64,
}

impl FareSchedule {
    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            base_fare: config.base_fare,
            per_km: config.per_km,
            per_min: config.per_min,
        }
    }

    /// Price in currency units, rounded to cents
    pub fn quote(&self, distance_km: f64, duration_min: f64, surge: f64) -> f64 {
        let raw = self.base_fare + distance_km * self.per_km + duration_min * self.per_min;
        round_cents(raw * surge)
    }
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self::from_config(&PricingConfig::default())
    }
}
