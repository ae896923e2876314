//! Administrative accounts

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use uuid::Uuid;

use crate::models::{User, UserRole};
use crate::store::Store;
use crate::{AppError, AppResult};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(e.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::InternalError("Invalid password hash".to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::InvalidCredentials)
}

/// Create the bootstrap admin when the users table is empty.
/// Returns the created user, or `None` if accounts already exist.
pub async fn ensure_admin(store: &dyn Store, email: &str, password: &str) -> AppResult<Option<User>> {
    if store.count_users().await? > 0 {
        return Ok(None);
    }

    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        name: Some("Administrator".to_string()),
        role: UserRole::Admin,
        is_active: true,
        last_login: None,
        created_at: Utc::now(),
    };
    let user = store.create_user(&user).await?;

    tracing::info!("Bootstrap admin created: {}", user.email);
    Ok(Some(user))
}

/// Check a login attempt and stamp `last_login`
pub async fn authenticate(store: &dyn Store, email: &str, password: &str) -> AppResult<User> {
    let user = store
        .find_user_by_email(email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    verify_password(password, &user.password_hash)?;
    store.record_login(user.id, Utc::now()).await?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).is_ok());
        assert!(matches!(verify_password("hunter3", &hash), Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_once() {
        let store = MemoryStore::new();

        let admin = ensure_admin(&store, "admin@example.com", "pw").await.unwrap();
        assert_eq!(admin.unwrap().role, UserRole::Admin);

        assert!(ensure_admin(&store, "other@example.com", "pw").await.unwrap().is_none());
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = MemoryStore::new();
        ensure_admin(&store, "admin@example.com", "pw").await.unwrap();

        let user = authenticate(&store, "admin@example.com", "pw").await.unwrap();
        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());

        assert!(matches!(
            authenticate(&store, "admin@example.com", "nope").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&store, "ghost@example.com", "pw").await,
            Err(AppError::InvalidCredentials)
        ));
    }
}
