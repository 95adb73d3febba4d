//! Ride lifecycle: request, accept, complete, cancel, rate.
//!
//! Every mutation runs in one transaction. Status changes are conditional
//! updates on the current status, so two racing requests cannot both move
//! the same ride; the loser sees a conflict.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::error::{ServiceError, ServiceResult};
use super::wallets;
use crate::api::metrics::record_ride_transition;
use crate::db::{
    begin_write, finish, new_id, now_timestamp, CreateRideRequest, PaymentMethod, RateRideRequest, Rating,
    RatingResponse, Ride, RideStatus, TransactionKind, User, UserRole,
};
use crate::pricing::{FareSchedule, SurgeEstimator};
use crate::realtime::RideEventBroadcaster;
use crate::DbPool;

pub const MIN_STARS: f64 = 1.0;
pub const MAX_STARS: f64 = 5.0;

async fn fetch_ride(conn: &mut SqliteConnection, ride_id: &str) -> ServiceResult<Ride> {
    sqlx::query_as::<_, Ride>("SELECT * FROM rides WHERE id = ?")
        .bind(ride_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Ride not found"))
}

async fn driver_name(conn: &mut SqliteConnection, driver_id: Option<&str>) -> ServiceResult<String> {
    let Some(driver_id) = driver_id else {
        return Ok(String::new());
    };
    let driver = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(driver_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(driver
        .map(|d| d.display_name().to_string())
        .unwrap_or_default())
}

/// Explain why a conditional status update matched nothing
fn transition_conflict(ride: &Ride, attempted: RideStatus) -> ServiceError {
    let current = ride.status_enum();
    debug!(ride_id = %ride.id, %current, %attempted, "Rejected status transition");
    match attempted {
        RideStatus::Accepted => ServiceError::conflict(format!("Ride is not pending (status: {})", current)),
        RideStatus::Completed => ServiceError::conflict(format!("Ride is not accepted (status: {})", current)),
        RideStatus::Cancelled => ServiceError::conflict(format!(
            "Only pending rides can be cancelled (status: {})",
            current
        )),
        RideStatus::Pending => ServiceError::conflict("Rides cannot return to pending"),
    }
}

#[derive(Debug, Clone)]
pub struct RideService {
    db: DbPool,
    broadcaster: RideEventBroadcaster,
    estimator: SurgeEstimator,
    fares: FareSchedule,
}

impl RideService {
    pub fn new(
        db: DbPool,
        broadcaster: RideEventBroadcaster,
        estimator: SurgeEstimator,
        fares: FareSchedule,
    ) -> Self {
        Self {
            db,
            broadcaster,
            estimator,
            fares,
        }
    }

    /// Price and persist a ride request, debiting the wallet when asked to,
    /// then announce it to drivers.
    pub async fn create(&self, rider: &User, request: &CreateRideRequest) -> ServiceResult<Ride> {
        if rider.role_enum() != UserRole::Rider {
            return Err(ServiceError::forbidden("Only riders can request rides"));
        }
        for (field, value) in [("distance_km", request.distance_km), ("duration_min", request.duration_min)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ServiceError::validation(field, format!("{} must be a non-negative number", field)));
            }
        }

        let mut tx = begin_write(&self.db).await?;
        let result = self.insert_ride(&mut tx, rider, request).await;
        let ride = finish(tx, result).await?;

        info!(
            ride_id = %ride.id,
            rider_id = %rider.id,
            fare = ride.fare,
            surge = ride.surge_multiplier,
            "Ride requested"
        );
        record_ride_transition(RideStatus::Pending);
        self.broadcaster.new_request(&ride);
        Ok(ride)
    }

    async fn insert_ride(
        &self,
        conn: &mut SqliteConnection,
        rider: &User,
        request: &CreateRideRequest,
    ) -> ServiceResult<Ride> {
        let (_, surge) = self.estimator.estimate(&mut *conn).await?;
        let fare = self.fares.quote(request.distance_km, request.duration_min, surge);
        let id = new_id();

        sqlx::query(
            r#"INSERT INTO rides (
                id, rider_id, pickup, dropoff, ride_type, payment_method, promo_code,
                distance_km, duration_min, surge_multiplier, fare, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)"#,
        )
        .bind(&id)
        .bind(&rider.id)
        .bind(request.pickup.trim())
        .bind(request.dropoff.trim())
        .bind(request.ride_type.trim())
        .bind(request.payment_method.as_str())
        .bind(request.promo_code.as_deref())
        .bind(request.distance_km)
        .bind(request.duration_min)
        .bind(surge)
        .bind(fare)
        .bind(now_timestamp())
        .execute(&mut *conn)
        .await?;

        if request.payment_method == PaymentMethod::Wallet {
            wallets::debit(&mut *conn, &rider.id, fare, &id).await?;
        }

        fetch_ride(conn, &id).await
    }

    /// Rides the user takes part in; admins see everything
    pub async fn list_for(&self, user: &User) -> ServiceResult<Vec<Ride>> {
        let rides = match user.role_enum() {
            UserRole::Rider => {
                sqlx::query_as::<_, Ride>(
                    "SELECT * FROM rides WHERE rider_id = ? ORDER BY created_at DESC",
                )
                .bind(&user.id)
                .fetch_all(&self.db)
                .await?
            }
            UserRole::Driver => {
                sqlx::query_as::<_, Ride>(
                    "SELECT * FROM rides WHERE driver_id = ? ORDER BY created_at DESC",
                )
                .bind(&user.id)
                .fetch_all(&self.db)
                .await?
            }
            UserRole::Admin => {
                sqlx::query_as::<_, Ride>("SELECT * FROM rides ORDER BY created_at DESC")
                    .fetch_all(&self.db)
                    .await?
            }
        };
        Ok(rides)
    }

    /// Open requests, oldest first
    pub async fn list_pending(&self, user: &User) -> ServiceResult<Vec<Ride>> {
        if user.role_enum() == UserRole::Rider {
            return Err(ServiceError::forbidden("Only drivers can browse ride requests"));
        }
        let rides = sqlx::query_as::<_, Ride>(
            "SELECT * FROM rides WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rides)
    }

    pub async fn get(&self, user: &User, ride_id: &str) -> ServiceResult<Ride> {
        let mut conn = self.db.acquire().await?;
        let ride = fetch_ride(&mut conn, ride_id).await?;

        let visible = match user.role_enum() {
            UserRole::Admin => true,
            UserRole::Rider => ride.rider_id == user.id,
            UserRole::Driver => {
                ride.driver_id.as_deref() == Some(user.id.as_str())
                    || ride.status_enum() == RideStatus::Pending
            }
        };
        if !visible {
            // Same answer as a missing ride, so ids cannot be probed
            return Err(ServiceError::not_found("Ride not found"));
        }
        Ok(ride)
    }

    /// Claim a pending ride for `driver`.
    pub async fn accept(&self, driver: &User, ride_id: &str) -> ServiceResult<Ride> {
        if driver.role_enum() != UserRole::Driver {
            return Err(ServiceError::forbidden("Only drivers can accept rides"));
        }

        let mut tx = begin_write(&self.db).await?;
        let result = claim(&mut tx, driver, ride_id).await;
        let ride = finish(tx, result).await?;

        info!(ride_id = %ride.id, driver_id = %driver.id, "Ride accepted");
        record_ride_transition(RideStatus::Accepted);
        self.broadcaster
            .ride_status(&ride.id, RideStatus::Accepted, driver.display_name());
        Ok(ride)
    }

    /// Finish an accepted ride. Drivers may only complete their own rides.
    pub async fn complete(&self, user: &User, ride_id: &str) -> ServiceResult<Ride> {
        let role = user.role_enum();
        if !matches!(role, UserRole::Driver | UserRole::Admin) {
            return Err(ServiceError::forbidden("Only drivers or admins can complete rides"));
        }

        let mut tx = begin_write(&self.db).await?;
        let result = finish_trip(&mut tx, user, ride_id).await;
        let (ride, name) = finish(tx, result).await?;

        info!(ride_id = %ride.id, completed_by = %user.id, "Ride completed");
        record_ride_transition(RideStatus::Completed);
        self.broadcaster.ride_status(&ride.id, RideStatus::Completed, &name);
        Ok(ride)
    }

    /// Withdraw a pending request, refunding a wallet payment.
    pub async fn cancel(&self, user: &User, ride_id: &str) -> ServiceResult<Ride> {
        let mut tx = begin_write(&self.db).await?;
        let result = withdraw(&mut tx, user, ride_id).await;
        let ride = finish(tx, result).await?;

        info!(ride_id = %ride.id, cancelled_by = %user.id, "Ride cancelled");
        record_ride_transition(RideStatus::Cancelled);
        self.broadcaster.ride_status(&ride.id, RideStatus::Cancelled, "");
        Ok(ride)
    }

    /// Record the rider's rating of a completed ride and refresh the
    /// driver's mean rating.
    pub async fn rate(
        &self,
        rider: &User,
        ride_id: &str,
        request: &RateRideRequest,
    ) -> ServiceResult<RatingResponse> {
        if !request.stars.is_finite() || request.stars < MIN_STARS || request.stars > MAX_STARS {
            return Err(ServiceError::validation("stars", "Stars must be between 1 and 5"));
        }

        let mut tx = begin_write(&self.db).await?;
        let result = record_rating(&mut tx, rider, ride_id, request).await;
        let response = finish(tx, result).await?;

        info!(
            ride_id = %ride_id,
            driver_id = %response.rating.driver_id,
            stars = response.rating.stars,
            driver_rating = response.driver_rating,
            "Ride rated"
        );
        Ok(response)
    }
}

async fn record_rating(
    conn: &mut SqliteConnection,
    rider: &User,
    ride_id: &str,
    request: &RateRideRequest,
) -> ServiceResult<RatingResponse> {
    let ride = fetch_ride(conn, ride_id).await?;

    if ride.rider_id != rider.id {
        return Err(ServiceError::forbidden("Only the rider of this ride can rate it"));
    }
    if ride.status_enum() != RideStatus::Completed {
        return Err(ServiceError::conflict("Only completed rides can be rated"));
    }
    let driver_id = ride
        .driver_id
        .clone()
        .ok_or_else(|| ServiceError::conflict("Ride has no driver to rate"))?;

    let already_rated: Option<String> =
        sqlx::query_scalar("SELECT id FROM ratings WHERE ride_id = ?")
            .bind(ride_id)
            .fetch_optional(&mut *conn)
            .await?;
    if already_rated.is_some() {
        return Err(ServiceError::conflict("Ride has already been rated"));
    }

    let rating = Rating {
        id: new_id(),
        ride_id: ride.id.clone(),
        driver_id: driver_id.clone(),
        rider_id: rider.id.clone(),
        stars: request.stars,
        comment: request
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        created_at: now_timestamp(),
    };

    sqlx::query(
        "INSERT INTO ratings (id, ride_id, driver_id, rider_id, stars, comment, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&rating.id)
    .bind(&rating.ride_id)
    .bind(&rating.driver_id)
    .bind(&rating.rider_id)
    .bind(rating.stars)
    .bind(&rating.comment)
    .bind(&rating.created_at)
    .execute(&mut *conn)
    .await?;

    let driver_rating: f64 =
        sqlx::query_scalar("SELECT AVG(stars) FROM ratings WHERE driver_id = ?")
            .bind(&driver_id)
            .fetch_one(&mut *conn)
            .await?;

    sqlx::query("UPDATE users SET rating = ?, updated_at = ? WHERE id = ?")
        .bind(driver_rating)
        .bind(now_timestamp())
        .bind(&driver_id)
        .execute(&mut *conn)
        .await?;

    Ok(RatingResponse {
        rating,
        driver_rating,
    })
}

async fn claim(conn: &mut SqliteConnection, driver: &User, ride_id: &str) -> ServiceResult<Ride> {
    let result = sqlx::query(
        "UPDATE rides SET status = 'accepted', driver_id = ?, accepted_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(&driver.id)
    .bind(now_timestamp())
    .bind(ride_id)
    .execute(&mut *conn)
    .await?;

    let ride = fetch_ride(conn, ride_id).await?;
    if result.rows_affected() == 0 {
        return Err(transition_conflict(&ride, RideStatus::Accepted));
    }
    Ok(ride)
}

/// Complete the ride and look up the driver's name for the status event
async fn finish_trip(
    conn: &mut SqliteConnection,
    user: &User,
    ride_id: &str,
) -> ServiceResult<(Ride, String)> {
    let ride = fetch_ride(conn, ride_id).await?;
    if user.role_enum() == UserRole::Driver && ride.driver_id.as_deref() != Some(user.id.as_str()) {
        return Err(ServiceError::forbidden("Only the assigned driver can complete this ride"));
    }
    if !ride.status_enum().can_transition_to(RideStatus::Completed) {
        return Err(transition_conflict(&ride, RideStatus::Completed));
    }

    let result = sqlx::query(
        "UPDATE rides SET status = 'completed', completed_at = ? WHERE id = ? AND status = 'accepted'",
    )
    .bind(now_timestamp())
    .bind(ride_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(transition_conflict(&ride, RideStatus::Completed));
    }

    let ride = fetch_ride(conn, ride_id).await?;
    let name = driver_name(conn, ride.driver_id.as_deref()).await?;
    Ok((ride, name))
}

async fn withdraw(conn: &mut SqliteConnection, user: &User, ride_id: &str) -> ServiceResult<Ride> {
    let ride = fetch_ride(conn, ride_id).await?;

    let allowed = match user.role_enum() {
        UserRole::Admin => true,
        UserRole::Rider => ride.rider_id == user.id,
        UserRole::Driver => false,
    };
    if !allowed {
        return Err(ServiceError::forbidden("Only the rider or an admin can cancel this ride"));
    }
    if !ride.status_enum().can_transition_to(RideStatus::Cancelled) {
        return Err(transition_conflict(&ride, RideStatus::Cancelled));
    }

    let result = sqlx::query(
        "UPDATE rides SET status = 'cancelled', cancelled_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(now_timestamp())
    .bind(ride_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(transition_conflict(&ride, RideStatus::Cancelled));
    }

    if ride.payment_method_enum() == PaymentMethod::Wallet && ride.fare > 0.0 {
        wallets::credit(
            &mut *conn,
            &ride.rider_id,
            ride.fare,
            TransactionKind::RideRefund,
            Some(&ride.id),
        )
        .await?;
    }

    fetch_ride(conn, ride_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_file, init_memory};
    use crate::realtime::{ConnectionRegistry, PeerRole};
    use crate::services::accounts::create_test_user;
    use crate::services::wallets::WalletService;
    use std::sync::Arc;

    struct Fixture {
        db: DbPool,
        registry: Arc<ConnectionRegistry>,
        rides: RideService,
        rider: User,
        driver: User,
        admin: User,
    }

    async fn fixture() -> Fixture {
        let db = init_memory().await;
        let registry = Arc::new(ConnectionRegistry::new(16));
        let rides = RideService::new(
            db.clone(),
            RideEventBroadcaster::new(registry.clone()),
            SurgeEstimator::default(),
            FareSchedule::default(),
        );
        let rider = create_test_user(&db, "rider@example.com", UserRole::Rider).await;
        let driver = create_test_user(&db, "driver@example.com", UserRole::Driver).await;
        let admin = create_test_user(&db, "admin@example.com", UserRole::Admin).await;
        Fixture {
            db,
            registry,
            rides,
            rider,
            driver,
            admin,
        }
    }

    fn request(distance_km: f64, duration_min: f64, payment_method: PaymentMethod) -> CreateRideRequest {
        CreateRideRequest {
            pickup: "Osu Oxford Street".to_string(),
            dropoff: "Kotoka Airport".to_string(),
            ride_type: "standard".to_string(),
            payment_method,
            promo_code: None,
            distance_km,
            duration_min,
        }
    }

    async fn completed_ride(f: &Fixture, driver: &User) -> Ride {
        let ride = f
            .rides
            .create(&f.rider, &request(4.0, 10.0, PaymentMethod::Cash))
            .await
            .unwrap();
        f.rides.accept(driver, &ride.id).await.unwrap();
        f.rides.complete(driver, &ride.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_prices_ride_and_notifies_drivers() {
        let f = fixture().await;
        let (_id, mut driver_rx) = f.registry.connect(PeerRole::Driver, "driver-key");

        let ride = f
            .rides
            .create(&f.rider, &request(10.0, 20.0, PaymentMethod::Cash))
            .await
            .unwrap();

        assert_eq!(ride.status_enum(), RideStatus::Pending);
        assert_eq!(ride.surge_multiplier, 1.0);
        assert_eq!(ride.fare, 13.4);
        assert!(ride.driver_id.is_none());

        let event: serde_json::Value = serde_json::from_str(&driver_rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["event"], "new_request");
        assert_eq!(event["ride"]["id"], ride.id.as_str());
    }

    #[tokio::test]
    async fn test_surge_reflects_recent_demand() {
        let f = fixture().await;
        for _ in 0..5 {
            f.rides
                .create(&f.rider, &request(1.2, 0.0, PaymentMethod::Cash))
                .await
                .unwrap();
        }

        // Five recent rides in the 1km zone -> 1.5x
        let ride = f
            .rides
            .create(&f.rider, &request(0.0, 0.0, PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(ride.surge_multiplier, 1.5);
        assert_eq!(ride.fare, 7.5);
    }

    #[tokio::test]
    async fn test_only_riders_request_rides() {
        let f = fixture().await;
        let err = f
            .rides
            .create(&f.driver, &request(1.0, 1.0, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_negative_distance_is_rejected() {
        let f = fixture().await;
        let err = f
            .rides
            .create(&f.rider, &request(-1.0, 1.0, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { field: "distance_km", .. }));
    }

    #[tokio::test]
    async fn test_wallet_ride_debits_balance() {
        let f = fixture().await;
        let wallets = WalletService::new(f.db.clone(), 50.0);
        wallets.topup(&f.rider).await.unwrap();

        let ride = f
            .rides
            .create(&f.rider, &request(10.0, 20.0, PaymentMethod::Wallet))
            .await
            .unwrap();

        assert_eq!(ride.payment_method, "wallet");
        assert_eq!(wallets.wallet(&f.rider).await.unwrap().balance, 36.6);
    }

    #[tokio::test]
    async fn test_wallet_ride_with_insufficient_balance_is_not_created() {
        let f = fixture().await;
        let wallets = WalletService::new(f.db.clone(), 5.0);
        wallets.topup(&f.rider).await.unwrap();

        let err = f
            .rides
            .create(&f.rider, &request(10.0, 20.0, PaymentMethod::Wallet))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientFunds { .. }));

        assert!(f.rides.list_for(&f.rider).await.unwrap().is_empty());
        assert_eq!(wallets.wallet(&f.rider).await.unwrap().balance, 5.0);
    }

    #[tokio::test]
    async fn test_accept_moves_pending_to_accepted_and_broadcasts() {
        let f = fixture().await;
        let ride = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();
        let (_id, mut rider_rx) = f.registry.connect(PeerRole::Rider, "any-rider");

        let accepted = f.rides.accept(&f.driver, &ride.id).await.unwrap();
        assert_eq!(accepted.status_enum(), RideStatus::Accepted);
        assert_eq!(accepted.driver_id.as_deref(), Some(f.driver.id.as_str()));
        assert!(accepted.accepted_at.is_some());

        let event: serde_json::Value = serde_json::from_str(&rider_rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["event"], "ride_status");
        assert_eq!(event["status"], "accepted");
        assert_eq!(event["driver_name"], "driver@example.com");
    }

    #[tokio::test]
    async fn test_accept_requires_driver_role() {
        let f = fixture().await;
        let ride = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();

        for user in [&f.rider, &f.admin] {
            let err = f.rides.accept(user, &ride.id).await.unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden(_)));
        }
        let unchanged = f.rides.get(&f.admin, &ride.id).await.unwrap();
        assert_eq!(unchanged.status_enum(), RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_accept_non_pending_ride_fails() {
        let f = fixture().await;
        let other_driver = create_test_user(&f.db, "other@example.com", UserRole::Driver).await;
        let ride = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();
        f.rides.accept(&f.driver, &ride.id).await.unwrap();

        let err = f.rides.accept(&other_driver, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m.contains("not pending")));

        let ride = f.rides.get(&f.admin, &ride.id).await.unwrap();
        assert_eq!(ride.driver_id.as_deref(), Some(f.driver.id.as_str()));
    }

    #[tokio::test]
    async fn test_accept_unknown_ride_is_not_found() {
        let f = fixture().await;
        let err = f.rides.accept(&f.driver, "missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    async fn insert_user(db: &DbPool, email: &str, role: UserRole) -> User {
        let id = new_id();
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, full_name, role, created_at, updated_at) VALUES (?, ?, 'unused', ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(email)
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await
        .unwrap();
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&id)
            .fetch_one(db)
            .await
            .unwrap()
    }

    fn shared_pool_service(db: &DbPool) -> RideService {
        RideService::new(
            db.clone(),
            RideEventBroadcaster::new(Arc::new(ConnectionRegistry::new(16))),
            SurgeEstimator::default(),
            FareSchedule::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_accepts_on_shared_pool() {
        let (_dir, db) = init_file().await;
        let rides = shared_pool_service(&db);
        let rider = insert_user(&db, "rider@example.com", UserRole::Rider).await;
        let mut drivers = Vec::new();
        for i in 0..8 {
            drivers.push(insert_user(&db, &format!("driver{}@example.com", i), UserRole::Driver).await);
        }

        for _ in 0..5 {
            // Runs after the previous round's losers, so it also checks
            // that a rejected accept leaves no lock behind
            let ride = rides
                .create(&rider, &request(3.0, 8.0, PaymentMethod::Cash))
                .await
                .unwrap();

            let tasks: Vec<_> = drivers
                .iter()
                .cloned()
                .map(|driver| {
                    let rides = rides.clone();
                    let ride_id = ride.id.clone();
                    tokio::spawn(async move { rides.accept(&driver, &ride_id).await })
                })
                .collect();

            let mut winners = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(accepted) => {
                        winners += 1;
                        assert_eq!(accepted.status_enum(), RideStatus::Accepted);
                    }
                    Err(ServiceError::Conflict(message)) => assert!(message.contains("not pending")),
                    Err(other) => panic!("unexpected error: {other:?}"),
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_creates_on_shared_pool() {
        let (_dir, db) = init_file().await;
        let rides = shared_pool_service(&db);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let rider = insert_user(&db, &format!("rider{}@example.com", i), UserRole::Rider).await;
            let rides = rides.clone();
            tasks.push(tokio::spawn(async move {
                rides
                    .create(&rider, &request(2.0, 6.0, PaymentMethod::Cash))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rides")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_wallet_rides_never_overdraw() {
        let (_dir, db) = init_file().await;
        let rides = shared_pool_service(&db);
        let rider = insert_user(&db, "rider@example.com", UserRole::Rider).await;
        WalletService::new(db.clone(), 50.0).topup(&rider).await.unwrap();

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let rides = rides.clone();
                let rider = rider.clone();
                tokio::spawn(async move {
                    rides
                        .create(&rider, &request(10.0, 20.0, PaymentMethod::Wallet))
                        .await
                })
            })
            .collect();

        let mut charged = 0.0;
        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(ride) => {
                    accepted += 1;
                    charged += ride.fare;
                }
                Err(ServiceError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        let wallet = WalletService::new(db.clone(), 50.0).wallet(&rider).await.unwrap();
        assert!(accepted >= 1);
        assert!(wallet.balance >= 0.0);
        assert!((50.0 - charged - wallet.balance).abs() < 1e-6);

        // Failed debits leave no ride behind
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rides")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, accepted);
    }

    #[tokio::test]
    async fn test_complete_rules() {
        let f = fixture().await;
        let other_driver = create_test_user(&f.db, "other@example.com", UserRole::Driver).await;
        let ride = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();

        // Not accepted yet
        let err = f.rides.complete(&f.admin, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        f.rides.accept(&f.driver, &ride.id).await.unwrap();

        let err = f.rides.complete(&f.rider, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = f.rides.complete(&other_driver, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let done = f.rides.complete(&f.admin, &ride.id).await.unwrap();
        assert_eq!(done.status_enum(), RideStatus::Completed);
        assert!(done.completed_at.is_some());

        let err = f.rides.complete(&f.driver, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_refunds_wallet_ride() {
        let f = fixture().await;
        let wallets = WalletService::new(f.db.clone(), 50.0);
        wallets.topup(&f.rider).await.unwrap();
        let ride = f
            .rides
            .create(&f.rider, &request(10.0, 20.0, PaymentMethod::Wallet))
            .await
            .unwrap();

        let cancelled = f.rides.cancel(&f.rider, &ride.id).await.unwrap();
        assert_eq!(cancelled.status_enum(), RideStatus::Cancelled);
        assert_eq!(wallets.wallet(&f.rider).await.unwrap().balance, 50.0);

        let kinds: Vec<String> = wallets
            .transactions(&f.rider)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds, vec!["ride_refund", "ride_debit", "topup"]);

        // Terminal: cannot be accepted afterwards
        let err = f.rides.accept(&f.driver, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let f = fixture().await;
        let stranger = create_test_user(&f.db, "stranger@example.com", UserRole::Rider).await;
        let ride = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();

        for user in [&stranger, &f.driver] {
            let err = f.rides.cancel(user, &ride.id).await.unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden(_)));
        }

        f.rides.accept(&f.driver, &ride.id).await.unwrap();
        let err = f.rides.cancel(&f.rider, &ride.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_driver_rating_is_mean_of_all_ratings() {
        let f = fixture().await;
        let mut expected = Vec::new();

        for stars in [5.0, 3.0, 4.0, 1.0] {
            let ride = completed_ride(&f, &f.driver).await;
            let response = f
                .rides
                .rate(&f.rider, &ride.id, &RateRideRequest { stars, comment: None })
                .await
                .unwrap();
            expected.push(stars);
            let mean = expected.iter().sum::<f64>() / expected.len() as f64;
            assert_eq!(response.driver_rating, mean);
        }

        let driver = crate::services::accounts::find_by_id(&f.db, &f.driver.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(driver.rating, 3.25);
    }

    #[tokio::test]
    async fn test_rating_rules() {
        let f = fixture().await;
        let pending = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();
        let five = RateRideRequest { stars: 5.0, comment: Some("  smooth ride ".to_string()) };

        let err = f.rides.rate(&f.rider, &pending.id, &five).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let ride = completed_ride(&f, &f.driver).await;
        let err = f
            .rides
            .rate(&f.rider, &ride.id, &RateRideRequest { stars: 6.0, comment: None })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { field: "stars", .. }));

        let err = f.rides.rate(&f.driver, &ride.id, &five).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let rated = f.rides.rate(&f.rider, &ride.id, &five).await.unwrap();
        assert_eq!(rated.rating.comment.as_deref(), Some("smooth ride"));

        let err = f.rides.rate(&f.rider, &ride.id, &five).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m.contains("already")));
    }

    #[tokio::test]
    async fn test_visibility() {
        let f = fixture().await;
        let stranger = create_test_user(&f.db, "stranger@example.com", UserRole::Rider).await;
        let ride = f
            .rides
            .create(&f.rider, &request(3.0, 8.0, PaymentMethod::Cash))
            .await
            .unwrap();

        assert!(f.rides.get(&f.rider, &ride.id).await.is_ok());
        assert!(f.rides.get(&f.driver, &ride.id).await.is_ok());
        assert!(matches!(
            f.rides.get(&stranger, &ride.id).await,
            Err(ServiceError::NotFound(_))
        ));

        assert_eq!(f.rides.list_pending(&f.driver).await.unwrap().len(), 1);
        assert!(f.rides.list_pending(&f.rider).await.is_err());

        f.rides.accept(&f.driver, &ride.id).await.unwrap();
        assert!(f.rides.list_pending(&f.driver).await.unwrap().is_empty());
        assert_eq!(f.rides.list_for(&f.driver).await.unwrap().len(), 1);
        assert_eq!(f.rides.list_for(&f.rider).await.unwrap().len(), 1);
        assert!(f.rides.list_for(&stranger).await.unwrap().is_empty());
    }
}
