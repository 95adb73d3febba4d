//! Signup, credential checks and user lookups.

use tracing::info;

use super::error::{ServiceError, ServiceResult};
use crate::crypto::{hash_password, verify_password};
use crate::db::{new_id, now_timestamp, SignupRequest, User, UserRole};
use crate::DbPool;

pub async fn find_by_id(db: &DbPool, id: &str) -> ServiceResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn find_by_email(db: &DbPool, email: &str) -> ServiceResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn list_users(db: &DbPool) -> ServiceResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC")
        .fetch_all(db)
        .await?;
    Ok(users)
}

async fn insert_user(
    db: &DbPool,
    email: &str,
    password: &str,
    full_name: Option<&str>,
    role: UserRole,
) -> ServiceResult<User> {
    let password_hash = hash_password(password)
        .map_err(|e| ServiceError::Internal(format!("Failed to hash password: {}", e)))?;
    let id = new_id();
    let now = now_timestamp();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, full_name, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(&password_hash)
    .bind(full_name)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    find_by_id(db, &id)
        .await?
        .ok_or_else(|| ServiceError::Internal("User vanished after insert".to_string()))
}

/// Register a rider or driver. Admin accounts only come from configuration.
pub async fn signup(db: &DbPool, request: &SignupRequest) -> ServiceResult<User> {
    if request.role == UserRole::Admin {
        return Err(ServiceError::forbidden(
            "Admin accounts cannot be created through signup",
        ));
    }

    let email = request.email.trim().to_lowercase();
    if find_by_email(db, &email).await?.is_some() {
        return Err(ServiceError::conflict("Email already registered"));
    }

    let full_name = request
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let user = insert_user(db, &email, &request.password, full_name, request.role).await?;
    info!(user_id = %user.id, role = %request.role, "User signed up");
    Ok(user)
}

/// Check an email/password pair. Unknown email and wrong password are
/// indistinguishable to the caller.
pub async fn authenticate(db: &DbPool, email: &str, password: &str) -> ServiceResult<User> {
    let user = find_by_email(db, email)
        .await?
        .ok_or(ServiceError::InvalidCredentials)?;

    if !user.is_active || !verify_password(password, &user.password_hash) {
        return Err(ServiceError::InvalidCredentials);
    }
    Ok(user)
}

/// Create the configured admin account if it does not exist yet
pub async fn ensure_admin_user(db: &DbPool, email: &str, password: &str) -> ServiceResult<()> {
    let email = email.trim().to_lowercase();
    if find_by_email(db, &email).await?.is_some() {
        return Ok(());
    }

    insert_user(db, &email, password, Some("Administrator"), UserRole::Admin).await?;
    info!("Created admin user: {}", email);
    Ok(())
}

#[cfg(test)]
pub(crate) async fn create_test_user(db: &DbPool, email: &str, role: UserRole) -> User {
    insert_user(db, email, "s3cret-pass", Some(email), role)
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn signup_request(email: &str, role: UserRole) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            password: "s3cret-pass".to_string(),
            full_name: Some("  Esi Owusu ".to_string()),
            role,
        }
    }

    #[tokio::test]
    async fn test_signup_normalizes_and_stores_user() {
        let db = init_memory().await;
        let user = signup(&db, &signup_request(" Esi@Example.com ", UserRole::Driver))
            .await
            .unwrap();

        assert_eq!(user.email, "esi@example.com");
        assert_eq!(user.full_name.as_deref(), Some("Esi Owusu"));
        assert_eq!(user.role_enum(), UserRole::Driver);
        assert_eq!(user.rating, 5.0);
        assert_ne!(user.password_hash, "s3cret-pass");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let db = init_memory().await;
        signup(&db, &signup_request("esi@example.com", UserRole::Rider))
            .await
            .unwrap();

        let err = signup(&db, &signup_request("ESI@example.com", UserRole::Driver))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_signup_cannot_create_admin() {
        let db = init_memory().await;
        let err = signup(&db, &signup_request("boss@example.com", UserRole::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        assert!(list_users(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let db = init_memory().await;
        signup(&db, &signup_request("esi@example.com", UserRole::Rider))
            .await
            .unwrap();

        let user = authenticate(&db, "esi@example.com", "s3cret-pass").await.unwrap();
        assert_eq!(user.email, "esi@example.com");

        assert!(matches!(
            authenticate(&db, "esi@example.com", "wrong").await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&db, "nobody@example.com", "s3cret-pass").await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let db = init_memory().await;
        ensure_admin_user(&db, "admin@example.com", "admin-pass").await.unwrap();
        ensure_admin_user(&db, "admin@example.com", "admin-pass").await.unwrap();

        let users = list_users(&db).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role_enum(), UserRole::Admin);
    }
}
