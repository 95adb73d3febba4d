//! Dashboard aggregates for operators.

use chrono::{Duration, Timelike, Utc};

use super::accounts;
use super::error::ServiceResult;
use crate::db::{format_timestamp, parse_timestamp, AdminOverview, HeatmapResponse, SurgeResponse, User};
use crate::pricing::SurgeEstimator;
use crate::DbPool;

/// Length of the overview window
pub const OVERVIEW_WINDOW_HOURS: i64 = 24;

/// Rides per UTC hour of creation, indexed 0..23. Unparseable stamps are
/// skipped.
pub fn hourly_histogram<'a, I>(timestamps: I) -> (Vec<u32>, Vec<i64>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = vec![0i64; 24];
    for ts in timestamps {
        if let Some(parsed) = parse_timestamp(ts) {
            counts[parsed.hour() as usize] += 1;
        }
    }
    ((0..24).collect(), counts)
}

#[derive(Debug, Clone)]
pub struct AdminService {
    db: DbPool,
    estimator: SurgeEstimator,
}

impl AdminService {
    pub fn new(db: DbPool, estimator: SurgeEstimator) -> Self {
        Self { db, estimator }
    }

    /// Rides and fares booked over the last day, plus the active driver count
    pub async fn overview(&self) -> ServiceResult<AdminOverview> {
        let cutoff = format_timestamp(Utc::now() - Duration::hours(OVERVIEW_WINDOW_HOURS));

        let created: Vec<String> =
            sqlx::query_scalar("SELECT created_at FROM rides WHERE created_at >= ?")
                .bind(&cutoff)
                .fetch_all(&self.db)
                .await?;

        let revenue: f64 = sqlx::query_scalar(
            "SELECT COALESCE(ROUND(SUM(fare), 2), 0.0) FROM rides WHERE created_at >= ?",
        )
        .bind(&cutoff)
        .fetch_one(&self.db)
        .await?;

        let active_drivers: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'driver' AND is_active = 1",
        )
        .fetch_one(&self.db)
        .await?;

        let (hourly_hours, hourly_counts) = hourly_histogram(created.iter().map(String::as_str));

        Ok(AdminOverview {
            rides_24h: created.len() as i64,
            revenue_24h: revenue,
            active_drivers,
            hourly_hours,
            hourly_counts,
        })
    }

    pub async fn heatmap(&self) -> ServiceResult<HeatmapResponse> {
        let (heat, surge) = self.estimator.estimate(&self.db).await?;
        Ok(HeatmapResponse { heat, surge })
    }

    pub async fn surge(&self) -> ServiceResult<SurgeResponse> {
        let (_, multiplier) = self.estimator.estimate(&self.db).await?;
        Ok(SurgeResponse { multiplier })
    }

    pub async fn users(&self) -> ServiceResult<Vec<User>> {
        accounts::list_users(&self.db).await
    }
}
