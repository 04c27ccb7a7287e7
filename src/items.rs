//! Menu items. Every item belongs to exactly one category; the category is
//! validated to exist before a create or a re-parenting update. A missing
//! category is a client input error (400), distinct from "item not found".

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{auth::AdminUser, categories::Category, error::AppError, state::AppState};

/// Listing row: the parent category contributes only its description.
#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: Uuid,
    pub description: String,
    pub unit_price: Decimal,
    pub category_id: Uuid,
    pub category_description: String,
    pub created_at: DateTime<Utc>,
}

/// Detail row: carries the full parent category.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    pub id: Uuid,
    pub description: String,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub category: Category,
}

#[derive(Debug, FromRow)]
struct ItemCategoryRow {
    id: Uuid,
    description: String,
    unit_price: Decimal,
    created_at: DateTime<Utc>,
    category_id: Uuid,
    category_description: String,
    category_created_at: DateTime<Utc>,
}

impl From<ItemCategoryRow> for ItemDetail {
    fn from(row: ItemCategoryRow) -> Self {
        Self {
            id: row.id,
            description: row.description,
            unit_price: row.unit_price,
            created_at: row.created_at,
            category: Category {
                id: row.category_id,
                description: row.category_description,
                created_at: row.category_created_at,
            },
        }
    }
}

const DETAIL_QUERY: &str = "SELECT i.id, i.description, i.unit_price, i.created_at, \
        c.id AS category_id, c.description AS category_description, c.created_at AS category_created_at \
     FROM items i JOIN categories c ON c.id = i.category_id \
     WHERE i.id = $1";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemPayload {
    #[validate(length(min = 3, message = "Description must be at least 3 characters"))]
    pub description: String,
    pub unit_price: Decimal,
    pub category_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemPayload {
    #[validate(length(min = 3, message = "Description must be at least 3 characters"))]
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(payload): Json<CreateItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if payload.unit_price <= Decimal::ZERO {
        return Err(AppError::Invalid("Unit price must be positive"));
    }
    ensure_category_exists(&state, payload.category_id).await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO items (id, description, unit_price, category_id) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(payload.description.trim())
        .bind(payload.unit_price)
        .bind(payload.category_id)
        .execute(&state.pool)
        .await?;

    let item = fetch_detail(&state, id).await?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ItemSummary>>, AppError> {
    let items: Vec<ItemSummary> = sqlx::query_as(
        "SELECT i.id, i.description, i.unit_price, i.category_id, \
                c.description AS category_description, i.created_at \
         FROM items i JOIN categories c ON c.id = i.category_id \
         ORDER BY i.description ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(items))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ItemDetail>, AppError> {
    let item = fetch_detail(&state, id).await?;

    Ok(Json(item))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateItemPayload>,
) -> Result<Json<ItemDetail>, AppError> {
    payload.validate()?;
    if let Some(price) = payload.unit_price {
        if price <= Decimal::ZERO {
            return Err(AppError::Invalid("Unit price must be positive"));
        }
    }
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(&state, category_id).await?;
    }

    let res = sqlx::query(
        "UPDATE items SET \
            description = COALESCE($2, description), \
            unit_price = COALESCE($3, unit_price), \
            category_id = COALESCE($4, category_id) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(payload.description.as_deref().map(str::trim))
    .bind(payload.unit_price)
    .bind(payload.category_id)
    .execute(&state.pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Item"));
    }

    let item = fetch_detail(&state, id).await?;

    Ok(Json(item))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let referenced: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE item_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if referenced > 0 {
        return Err(AppError::Conflict(
            "This item appears in existing orders and cannot be deleted",
        ));
    }

    let res = sqlx::query("DELETE FROM items WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Item"));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_detail(state: &AppState, id: Uuid) -> Result<ItemDetail, AppError> {
    let row: ItemCategoryRow = sqlx::query_as(DETAIL_QUERY)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("Item"))?;

    Ok(row.into())
}

async fn ensure_category_exists(state: &AppState, category_id: Uuid) -> Result<(), AppError> {
    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?;

    if exists.is_none() {
        return Err(AppError::Invalid("Category does not exist"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payload_rejects_short_description() {
        let payload = CreateItemPayload {
            description: "ab".to_string(),
            unit_price: Decimal::new(1050, 2),
            category_id: Uuid::new_v4(),
        };

        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_detail_carries_full_category() {
        let row = ItemCategoryRow {
            id: Uuid::new_v4(),
            description: "X-Salada".to_string(),
            unit_price: Decimal::new(2590, 2),
            created_at: Utc::now(),
            category_id: Uuid::new_v4(),
            category_description: "Lanches".to_string(),
            category_created_at: Utc::now(),
        };
        let category_id = row.category_id;

        let detail: ItemDetail = row.into();
        assert_eq!(detail.category.id, category_id);
        assert_eq!(detail.category.description, "Lanches");
        assert_eq!(detail.unit_price, Decimal::new(2590, 2));
    }
}
