//! Input validation for API requests.
//!
//! Each check returns `Err(message)` for the caller to attach to a field;
//! use `ValidationErrorBuilder` from the `error` module to collect them.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email shape: local part, one `@`, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();

    /// Ride classes: lowercase words joined by dashes or underscores
    static ref RIDE_TYPE_REGEX: Regex = Regex::new(r"^[a-z][a-z0-9_-]*$").unwrap();

    static ref PROMO_CODE_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_LOCATION_LEN: usize = 255;
/// Longest trip accepted, in km
pub const MAX_DISTANCE_KM: f64 = 1000.0;
/// Longest trip accepted, in minutes
pub const MAX_DURATION_MIN: f64 = 1440.0;

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password is too short (min {} characters)",
            MIN_PASSWORD_LEN
        ));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password is too long (max {} characters)",
            MAX_PASSWORD_LEN
        ));
    }

    Ok(())
}

/// Validate an optional display name
pub fn validate_full_name(full_name: &Option<String>) -> Result<(), String> {
    if let Some(name) = full_name {
        if name.chars().count() > 100 {
            return Err("Full name is too long (max 100 characters)".to_string());
        }
        if name.chars().any(|c| c.is_control()) {
            return Err("Full name contains invalid characters".to_string());
        }
    }

    Ok(())
}

/// Validate a pickup or dropoff description
pub fn validate_location(location: &str, label: &str) -> Result<(), String> {
    let location = location.trim();
    if location.is_empty() {
        return Err(format!("{} is required", label));
    }

    if location.len() > MAX_LOCATION_LEN {
        return Err(format!(
            "{} is too long (max {} characters)",
            label, MAX_LOCATION_LEN
        ));
    }

    Ok(())
}

pub fn validate_ride_type(ride_type: &str) -> Result<(), String> {
    if ride_type.len() > 32 || !RIDE_TYPE_REGEX.is_match(ride_type.trim()) {
        return Err("Invalid ride type".to_string());
    }

    Ok(())
}

pub fn validate_promo_code(promo_code: &Option<String>) -> Result<(), String> {
    if let Some(code) = promo_code {
        if code.is_empty() {
            return Ok(());
        }
        if code.len() > 32 || !PROMO_CODE_REGEX.is_match(code) {
            return Err("Promo code must be up to 32 letters, digits, dashes or underscores".to_string());
        }
    }

    Ok(())
}

/// Validate a trip distance or duration against its upper bound
pub fn validate_trip_measure(value: f64, label: &str, max: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number", label));
    }

    if value > max {
        return Err(format!("{} must be at most {}", label, max));
    }

    Ok(())
}

pub fn validate_stars(stars: f64) -> Result<(), String> {
    if !stars.is_finite() || !(1.0..=5.0).contains(&stars) {
        return Err("Stars must be between 1 and 5".to_string());
    }

    Ok(())
}

pub fn validate_comment(comment: &Option<String>) -> Result<(), String> {
    if let Some(c) = comment {
        if c.chars().count() > 1000 {
            return Err("Comment is too long (max 1000 characters)".to_string());
        }
    }

    Ok(())
}

/// Validate a websocket peer key taken from the URL path
pub fn validate_peer_key(key: &str) -> Result<(), String> {
    if key.is_empty() || key.len() > 128 {
        return Err("Connection key must be 1-128 characters".to_string());
    }

    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("Connection key cannot contain whitespace".to_string());
    }

    Ok(())
}
