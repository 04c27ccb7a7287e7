//! Address book, scoped to the calling user.
//!
//! Addresses are shared rows: a user "owns" an address through the
//! `user_addresses` association, and deleting one only removes that
//! association. Lookups resolve existence and ownership together so a caller
//! cannot distinguish "no such address" from "someone else's address".

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

use crate::{auth::AuthUser, error::AppError, state::AppState};

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub street: String,
    pub number: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub created_at: DateTime<Utc>,
}

const ADDRESS_COLUMNS: &str = "id, street, number, district, city, state, zip_code, created_at";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddressPayload {
    #[validate(length(min = 3, message = "Street must be at least 3 characters"))]
    pub street: String,
    #[validate(length(min = 1, message = "Number is required"))]
    pub number: String,
    #[validate(length(min = 3, message = "District must be at least 3 characters"))]
    pub district: String,
    #[validate(length(min = 3, message = "City must be at least 3 characters"))]
    pub city: String,
    #[validate(length(equal = 2, message = "State must be a 2-letter code"))]
    pub state: String,
    #[validate(length(equal = 8, message = "Zip code must be 8 digits"))]
    pub zip_code: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddressPayload {
    #[validate(length(min = 3, message = "Street must be at least 3 characters"))]
    pub street: Option<String>,
    #[validate(length(min = 1, message = "Number is required"))]
    pub number: Option<String>,
    #[validate(length(min = 3, message = "District must be at least 3 characters"))]
    pub district: Option<String>,
    #[validate(length(min = 3, message = "City must be at least 3 characters"))]
    pub city: Option<String>,
    #[validate(length(equal = 2, message = "State must be a 2-letter code"))]
    pub state: Option<String>,
    #[validate(length(equal = 8, message = "Zip code must be 8 digits"))]
    pub zip_code: Option<String>,
}

fn ensure_numeric_zip(zip_code: &str) -> Result<(), AppError> {
    if !zip_code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Invalid("Zip code must contain only digits"));
    }
    Ok(())
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateAddressPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_numeric_zip(&payload.zip_code)?;

    // Row creation and association commit together.
    let mut tx = state.pool.begin().await?;

    let address: Address = sqlx::query_as(&format!(
        "INSERT INTO addresses (id, street, number, district, city, state, zip_code) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ADDRESS_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(payload.street.trim())
    .bind(payload.number.trim())
    .bind(payload.district.trim())
    .bind(payload.city.trim())
    .bind(payload.state.trim().to_uppercase())
    .bind(payload.zip_code.trim())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_addresses (user_id, address_id) VALUES ($1, $2)")
        .bind(user.id)
        .bind(address.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Address>>, AppError> {
    let addresses: Vec<Address> = sqlx::query_as(
        "SELECT a.id, a.street, a.number, a.district, a.city, a.state, a.zip_code, a.created_at \
         FROM addresses a JOIN user_addresses ua ON ua.address_id = a.id \
         WHERE ua.user_id = $1 ORDER BY a.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(addresses))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Address>, AppError> {
    let address = find_owned(&state.pool, id, user.id)
        .await?
        .ok_or(AppError::AddressNotOwned)?;

    Ok(Json(address))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAddressPayload>,
) -> Result<Json<Address>, AppError> {
    payload.validate()?;
    if let Some(zip_code) = payload.zip_code.as_deref() {
        ensure_numeric_zip(zip_code)?;
    }

    find_owned(&state.pool, id, user.id)
        .await?
        .ok_or(AppError::AddressNotOwned)?;

    let address: Address = sqlx::query_as(&format!(
        "UPDATE addresses SET \
            street = COALESCE($2, street), \
            number = COALESCE($3, number), \
            district = COALESCE($4, district), \
            city = COALESCE($5, city), \
            state = COALESCE($6, state), \
            zip_code = COALESCE($7, zip_code) \
         WHERE id = $1 RETURNING {ADDRESS_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.street.as_deref().map(str::trim))
    .bind(payload.number.as_deref().map(str::trim))
    .bind(payload.district.as_deref().map(str::trim))
    .bind(payload.city.as_deref().map(str::trim))
    .bind(payload.state.as_deref().map(|s| s.trim().to_uppercase()))
    .bind(payload.zip_code.as_deref().map(str::trim))
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(address))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    find_owned(&state.pool, id, user.id)
        .await?
        .ok_or(AppError::AddressNotOwned)?;

    // Only the association goes; the row may be shared with other users.
    sqlx::query("DELETE FROM user_addresses WHERE user_id = $1 AND address_id = $2")
        .bind(user.id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Resolves an address only if it exists AND is associated with the given
/// user. Also used by the order workflow for its ownership check.
pub async fn find_owned<'e, E>(
    executor: E,
    address_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Address>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as(
        "SELECT a.id, a.street, a.number, a.district, a.city, a.state, a.zip_code, a.created_at \
         FROM addresses a JOIN user_addresses ua ON ua.address_id = a.id \
         WHERE a.id = $1 AND ua.user_id = $2",
    )
    .bind(address_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payload_enforces_fixed_lengths() {
        let payload = CreateAddressPayload {
            street: "Rua das Flores".to_string(),
            number: "100".to_string(),
            district: "Centro".to_string(),
            city: "Curitiba".to_string(),
            state: "PRR".to_string(),
            zip_code: "800100".to_string(),
        };
        let errors = payload.validate().unwrap_err();

        assert!(errors.field_errors().contains_key("state"));
        assert!(errors.field_errors().contains_key("zip_code"));
    }

    #[test]
    fn test_zip_code_must_be_numeric() {
        assert!(ensure_numeric_zip("80010000").is_ok());
        assert!(ensure_numeric_zip("8001000a").is_err());
        assert!(ensure_numeric_zip("80010-00").is_err());
    }
}
