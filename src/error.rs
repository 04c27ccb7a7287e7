//! Closed error taxonomy for the whole service.
//!
//! Every domain failure is a tagged variant; the status code comes from a
//! single lookup in [`IntoResponse`]. Handlers never match on message text.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::orders::OrderStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Invalid(&'static str),

    #[error("One or more items were not found")]
    UnknownItems,

    #[error("Cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Address not found or does not belong to this user")]
    AddressNotOwned,

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Invalid(_)
            | AppError::UnknownItems
            | AppError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::AddressNotOwned => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(e) if is_unique_violation(e) || is_foreign_key_violation(e) => {
                StatusCode::CONFLICT
            }
            AppError::Database(_) | AppError::Hash(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::Validation(errors) = &self {
            let body = json!({ "message": "Validation error", "errors": errors });
            return (status, Json(body)).into_response();
        }

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Unhandled failure: {self}");
            "Internal server error".to_string()
        } else if let AppError::Database(e) = &self {
            // Conflict status here means a constraint violation backstop.
            if is_unique_violation(e) {
                "Value already in use".to_string()
            } else {
                "Resource is referenced by existing records".to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().and_then(|d| d.code()).as_deref(),
        Some("23505")
    )
}

pub fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().and_then(|d| d.code()).as_deref(),
        Some("23503")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Invalid("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::UnknownItems.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Unauthenticated("no token").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("admins only").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::NotFound("Order").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::AddressNotOwned.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Conflict("email taken").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transition_error_is_bad_request() {
        let err = AppError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Cannot transition order from DELIVERED to PENDING"
        );
    }

    #[test]
    fn test_not_found_message_names_the_entity() {
        assert_eq!(AppError::NotFound("Category").to_string(), "Category not found");
    }
}
