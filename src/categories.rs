//! Menu categories. Reads are public; mutations require the admin role.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{auth::AdminUser, error::AppError, state::AppState};

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryPayload {
    #[validate(length(min = 2, message = "Description must be at least 2 characters"))]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryPayload {
    #[validate(length(min = 2, message = "Description must be at least 2 characters"))]
    pub description: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(payload): Json<CreateCategoryPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let description = payload.description.trim();

    // Uniqueness is by value, not by constraint.
    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM categories WHERE description = $1")
        .bind(description)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_some() {
        return Err(AppError::Conflict("This category already exists"));
    }

    let category: Category = sqlx::query_as(
        "INSERT INTO categories (id, description) VALUES ($1, $2) \
         RETURNING id, description, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(description)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Category>>, AppError> {
    let categories: Vec<Category> = sqlx::query_as(
        "SELECT id, description, created_at FROM categories ORDER BY description ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(categories))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, AppError> {
    let category: Category =
        sqlx::query_as("SELECT id, description, created_at FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or(AppError::NotFound("Category"))?;

    Ok(Json(category))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryPayload>,
) -> Result<Json<Category>, AppError> {
    payload.validate()?;

    let category: Category = sqlx::query_as(
        "UPDATE categories SET description = COALESCE($2, description) \
         WHERE id = $1 RETURNING id, description, created_at",
    )
    .bind(id)
    .bind(payload.description.as_deref().map(str::trim))
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Category"))?;

    Ok(Json(category))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE category_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if in_use > 0 {
        return Err(AppError::Conflict(
            "This category has items and cannot be deleted",
        ));
    }

    let res = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Category"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payload_rejects_short_description() {
        let payload = CreateCategoryPayload {
            description: "a".to_string(),
        };

        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_update_payload_allows_absent_description() {
        let payload = UpdateCategoryPayload { description: None };

        assert!(payload.validate().is_ok());
    }
}
