use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_comment, validate_location, validate_promo_code, validate_ride_type, validate_stars,
    validate_trip_measure, MAX_DISTANCE_KM, MAX_DURATION_MIN,
};
use crate::db::{CreateRideRequest, RateRideRequest, RatingResponse, Ride, User};
use crate::AppState;

fn validate_create_request(req: &CreateRideRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("pickup", validate_location(&req.pickup, "Pickup"));
    errors.check("dropoff", validate_location(&req.dropoff, "Dropoff"));
    errors.check("ride_type", validate_ride_type(&req.ride_type));
    errors.check("promo_code", validate_promo_code(&req.promo_code));
    errors.check(
        "distance_km",
        validate_trip_measure(req.distance_km, "Distance", MAX_DISTANCE_KM),
    );
    errors.check(
        "duration_min",
        validate_trip_measure(req.duration_min, "Duration", MAX_DURATION_MIN),
    );
    errors.finish()
}

/// Request a ride
pub async fn create_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<Ride>), ApiError> {
    validate_create_request(&req)?;
    let ride = state.rides.create(&user, &req).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

pub async fn my_rides(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Ride>>, ApiError> {
    Ok(Json(state.rides.list_for(&user).await?))
}

pub async fn pending_rides(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Ride>>, ApiError> {
    Ok(Json(state.rides.list_pending(&user).await?))
}

pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Ride>, ApiError> {
    Ok(Json(state.rides.get(&user, &id).await?))
}

pub async fn accept_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Ride>, ApiError> {
    Ok(Json(state.rides.accept(&user, &id).await?))
}

pub async fn complete_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Ride>, ApiError> {
    Ok(Json(state.rides.complete(&user, &id).await?))
}

pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Ride>, ApiError> {
    Ok(Json(state.rides.cancel(&user, &id).await?))
}

/// Rate the driver of a completed ride
pub async fn rate_ride(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<RateRideRequest>,
) -> Result<(StatusCode, Json<RatingResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("stars", validate_stars(req.stars));
    errors.check("comment", validate_comment(&req.comment));
    errors.finish()?;

    let rating = state.rides.rate(&user, &id, &req).await?;
    Ok((StatusCode::CREATED, Json(rating)))
}
