//! Account management: registration, login, self-service and the admin-scoped
//! variants.
//!
//! Passwords are stored as bcrypt hashes (cost 10) and compared with the
//! library's own constant-time verify. The admin endpoints refuse to operate on
//! the caller's own account; self-service routes exist for that.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AdminUser, AuthUser, Role, issue_token},
    error::{AppError, is_foreign_key_violation},
    state::AppState,
};

const HASH_COST: u32 = 10;

/// Public representation; the password hash is never selected into it.
#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, email, name, phone, role, created_at";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 10, message = "Phone must be at least 10 digits"))]
    pub phone: String,
    pub accepts_terms: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(email(message = "Invalid email or password"))]
    pub email: String,
    #[validate(length(min = 1, message = "Invalid email or password"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMePayload {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 10, message = "Phone must be at least 10 digits"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordPayload {
    #[validate(length(min = 1, message = "The old password is required"))]
    pub old_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

/// Admin updates may also touch email and role, which self-service cannot.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdatePayload {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 10, message = "Phone must be at least 10 digits"))]
    pub phone: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    pub role: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if !payload.accepts_terms {
        return Err(AppError::Invalid("The terms of service must be accepted"));
    }

    let email = payload.email.trim();
    let taken: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(&state.pool)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict("This email is already in use"));
    }

    let hash = bcrypt::hash(&payload.password, HASH_COST)?;

    let user: User = sqlx::query_as(
        "INSERT INTO users (id, email, name, phone, password_hash, role) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, email, name, phone, role, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(payload.name.trim())
    .bind(payload.phone.trim())
    .bind(&hash)
    .bind(Role::Client.as_str())
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let row: Option<(Uuid, String, String, String)> =
        sqlx::query_as("SELECT id, name, role, password_hash FROM users WHERE email = $1")
            .bind(payload.email.trim())
            .fetch_optional(&state.pool)
            .await?;

    let Some((id, name, role, hash)) = row else {
        return Err(AppError::Unauthenticated("Invalid email or password"));
    };

    if !bcrypt::verify(&payload.password, &hash)? {
        return Err(AppError::Unauthenticated("Invalid email or password"));
    }

    let token = issue_token(&state.config.jwt_secret, id, &name, &role)?;

    Ok(Json(json!({ "message": "Login successful", "token": token })))
}

pub async fn get_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<User>, AppError> {
    fetch_user(&state, user.id).await.map(Json)
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdateMePayload>,
) -> Result<Json<User>, AppError> {
    payload.validate()?;

    let updated: User = sqlx::query_as(&format!(
        "UPDATE users SET name = COALESCE($2, name), phone = COALESCE($3, phone) \
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(user.id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.phone.as_deref().map(str::trim))
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    Ok(Json(updated))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<StatusCode, AppError> {
    payload.validate()?;

    let hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&state.pool)
        .await?;
    let hash = hash.ok_or(AppError::NotFound("User"))?;

    if !bcrypt::verify(&payload.old_password, &hash)? {
        return Err(AppError::Unauthenticated("The old password is incorrect"));
    }

    let new_hash = bcrypt::hash(&payload.new_password, HASH_COST)?;
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(user.id)
        .bind(&new_hash)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    delete_account(&state, user.id).await
}

// --- Admin-scoped ---

pub async fn list(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<User>>, AppError> {
    let users: Vec<User> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    fetch_user(&state, id).await.map(Json)
}

pub async fn update_by_id(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdatePayload>,
) -> Result<Json<User>, AppError> {
    if id == admin.id {
        return Err(AppError::Forbidden(
            "Use the self-service endpoints to manage your own account",
        ));
    }
    payload.validate()?;

    let role = match payload.role.as_deref() {
        Some(r) => Some(
            Role::parse(r)
                .ok_or(AppError::Invalid("Role must be CLIENT or ADMIN"))?
                .as_str(),
        ),
        None => None,
    };

    if let Some(email) = payload.email.as_deref() {
        let taken: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND id <> $2")
                .bind(email.trim())
                .bind(id)
                .fetch_optional(&state.pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::Conflict("This email is already in use"));
        }
    }

    let updated: User = sqlx::query_as(&format!(
        "UPDATE users SET \
            name = COALESCE($2, name), \
            phone = COALESCE($3, phone), \
            email = COALESCE($4, email), \
            role = COALESCE($5, role) \
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.phone.as_deref().map(str::trim))
    .bind(payload.email.as_deref().map(str::trim))
    .bind(role)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    Ok(Json(updated))
}

pub async fn delete_by_id(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if id == admin.id {
        return Err(AppError::Forbidden(
            "Use the self-service endpoints to manage your own account",
        ));
    }

    delete_account(&state, id).await
}

async fn fetch_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Shared by self-deletion and the admin delete. An account referenced by any
/// order is kept; the RESTRICT violation surfaces as a conflict.
async fn delete_account(state: &AppState, id: Uuid) -> Result<StatusCode, AppError> {
    match sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
    {
        Ok(res) if res.rows_affected() == 0 => Err(AppError::NotFound("User")),
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::Conflict(
            "This user is associated with existing orders and cannot be deleted",
        )),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_verify_rejects_wrong_password() {
        // Low cost keeps the test fast; verify is cost-agnostic.
        let hash = bcrypt::hash("right-password", 4).unwrap();

        assert!(bcrypt::verify("right-password", &hash).unwrap());
        assert!(!bcrypt::verify("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_register_payload_rejects_bad_fields() {
        let payload = RegisterPayload {
            name: "Jo".to_string(),
            email: "not-an-email".to_string(),
            password: "12345".to_string(),
            phone: "123".to_string(),
            accepts_terms: true,
        };
        let errors = payload.validate().unwrap_err();

        assert!(errors.field_errors().contains_key("name"));
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("password"));
        assert!(errors.field_errors().contains_key("phone"));
    }

    #[test]
    fn test_register_payload_accepts_valid_fields() {
        let payload = RegisterPayload {
            name: "Joana Silva".to_string(),
            email: "joana@example.com".to_string(),
            password: "secret-password".to_string(),
            phone: "4199998888".to_string(),
            accepts_terms: true,
        };

        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_partial_update_payload_allows_missing_fields() {
        let payload = UpdateMePayload {
            name: None,
            phone: Some("41988887777".to_string()),
        };

        assert!(payload.validate().is_ok());
    }
}
