//! # Order workflow
//!
//! Order creation is the one multi-step write in the system and runs as a
//! single transaction: address ownership is checked, the order row and all of
//! its line items are inserted, and the whole thing commits or nothing does.
//!
//! Line-item prices are snapshotted from the items table at order time.
//! Client-supplied prices are never trusted, and later price changes do not
//! rewrite history.
//!
//! Fulfillment follows a fixed machine rather than free-text statuses:
//!
//! ```text
//! PENDING ──> PREPARING ──> READY ──> DELIVERED
//!    │            │
//!    └────────────┴──> CANCELLED
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    addresses::{self, Address},
    auth::{AdminUser, AuthUser, Role},
    error::AppError,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Debit,
    Credit,
    Pix,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Debit => "DEBIT",
            PaymentMethod::Credit => "CREDIT",
            PaymentMethod::Pix => "PIX",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CASH" => Some(PaymentMethod::Cash),
            "DEBIT" => Some(PaymentMethod::Debit),
            "CREDIT" => Some(PaymentMethod::Credit),
            "PIX" => Some(PaymentMethod::Pix),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PREPARING" => Some(OrderStatus::Preparing),
            "READY" => Some(OrderStatus::Ready),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// DELIVERED and CANCELLED are terminal.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (Pending, Preparing)
                | (Pending, Cancelled)
                | (Preparing, Ready)
                | (Preparing, Cancelled)
                | (Ready, Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    pub payment_method: String,
    pub address_id: Uuid,
    #[validate(length(min = 1, message = "An order needs at least one item"), nested)]
    pub items: Vec<OrderItemPayload>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemPayload {
    pub item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusPayload {
    #[validate(length(min = 3, message = "Status is required"))]
    pub status: String,
}

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: Uuid,
    pub item_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub email: String,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    payment_method: String,
    status: String,
    client_id: Uuid,
    created_by_id: Uuid,
    address_id: Uuid,
    created_at: DateTime<Utc>,
    client_name: Option<String>,
    client_email: Option<String>,
}

/// Full order graph returned by creation and reads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub id: Uuid,
    pub payment_method: String,
    pub status: String,
    pub client_id: Uuid,
    pub created_by_id: Uuid,
    pub address_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub items: Vec<OrderLine>,
}

impl OrderDetail {
    fn from_row(row: OrderRow, items: Vec<OrderLine>, address: Option<Address>) -> Self {
        let client = match (row.client_name, row.client_email) {
            (Some(name), Some(email)) => Some(ClientInfo { name, email }),
            _ => None,
        };

        Self {
            id: row.id,
            payment_method: row.payment_method,
            status: row.status,
            client_id: row.client_id,
            created_by_id: row.created_by_id,
            address_id: row.address_id,
            created_at: row.created_at,
            client,
            address,
            items,
        }
    }
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let method = PaymentMethod::parse(&payload.payment_method)
        .ok_or(AppError::Invalid("Invalid payment method"))?;

    // Resolve every requested item in one batch. A count mismatch means an
    // unknown (or duplicated) id; nothing has been written yet.
    let requested: Vec<Uuid> = payload.items.iter().map(|line| line.item_id).collect();
    let priced: Vec<(Uuid, Decimal)> =
        sqlx::query_as("SELECT id, unit_price FROM items WHERE id = ANY($1)")
            .bind(&requested)
            .fetch_all(&state.pool)
            .await?;
    if priced.len() != requested.len() {
        return Err(AppError::UnknownItems);
    }
    let prices: HashMap<Uuid, Decimal> = priced.into_iter().collect();

    let mut line_ids = Vec::with_capacity(payload.items.len());
    let mut quantities = Vec::with_capacity(payload.items.len());
    let mut unit_prices = Vec::with_capacity(payload.items.len());
    for line in &payload.items {
        let price = prices.get(&line.item_id).ok_or(AppError::UnknownItems)?;
        line_ids.push(Uuid::new_v4());
        quantities.push(line.quantity);
        unit_prices.push(*price);
    }

    let mut tx = state.pool.begin().await?;

    // Ownership check inside the transaction; an early return drops the
    // transaction and rolls everything back.
    addresses::find_owned(&mut *tx, payload.address_id, user.id)
        .await?
        .ok_or(AppError::AddressNotOwned)?;

    let order_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO orders (id, payment_method, status, client_id, created_by_id, address_id) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(order_id)
    .bind(method.as_str())
    .bind(OrderStatus::Pending.as_str())
    .bind(user.id)
    .bind(user.id)
    .bind(payload.address_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO order_items (id, order_id, item_id, quantity, unit_price) \
         SELECT t.id, $1, t.item_id, t.quantity, t.unit_price \
         FROM UNNEST($2::uuid[], $3::uuid[], $4::int4[], $5::numeric[]) \
             AS t(id, item_id, quantity, unit_price)",
    )
    .bind(order_id)
    .bind(&line_ids)
    .bind(&requested)
    .bind(&quantities)
    .bind(&unit_prices)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let order = load_order(&state.pool, order_id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderDetail>>, AppError> {
    let rows: Vec<OrderRow> = match user.role {
        Role::Admin => {
            sqlx::query_as(
                "SELECT o.id, o.payment_method, o.status, o.client_id, o.created_by_id, \
                        o.address_id, o.created_at, \
                        u.name AS client_name, u.email AS client_email \
                 FROM orders o JOIN users u ON u.id = o.client_id \
                 ORDER BY o.created_at DESC",
            )
            .fetch_all(&state.pool)
            .await?
        }
        Role::Client => {
            sqlx::query_as(
                "SELECT o.id, o.payment_method, o.status, o.client_id, o.created_by_id, \
                        o.address_id, o.created_at, \
                        NULL::text AS client_name, NULL::text AS client_email \
                 FROM orders o WHERE o.client_id = $1 \
                 ORDER BY o.created_at DESC",
            )
            .bind(user.id)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let order_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut lines = load_lines(&state.pool, &order_ids).await?;

    let orders = rows
        .into_iter()
        .map(|row| {
            let items = lines.remove(&row.id).unwrap_or_default();
            OrderDetail::from_row(row, items, None)
        })
        .collect();

    Ok(Json(orders))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetail>, AppError> {
    let order = load_order(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    if user.role == Role::Client && order.client_id != user.id {
        return Err(AppError::Forbidden("You do not have access to this order"));
    }

    Ok(Json(order))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Json<OrderDetail>, AppError> {
    payload.validate()?;
    let next = OrderStatus::parse(payload.status.trim())
        .ok_or(AppError::Invalid("Unknown order status"))?;

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let current = current.ok_or(AppError::NotFound("Order"))?;
    let current = OrderStatus::parse(&current)
        .ok_or_else(|| AppError::Internal("Stored order status is not recognized".into()))?;

    if !current.can_transition(next) {
        return Err(AppError::InvalidTransition {
            from: current,
            to: next,
        });
    }

    sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(next.as_str())
        .execute(&state.pool)
        .await?;

    let order = load_order(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    Ok(Json(order))
}

/// Loads the complete order graph: order, line items with item details, the
/// delivery address and the client identity.
async fn load_order(pool: &PgPool, id: Uuid) -> Result<Option<OrderDetail>, AppError> {
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT o.id, o.payment_method, o.status, o.client_id, o.created_by_id, \
                o.address_id, o.created_at, \
                u.name AS client_name, u.email AS client_email \
         FROM orders o JOIN users u ON u.id = o.client_id \
         WHERE o.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut lines = load_lines(pool, &[row.id]).await?;
    let items = lines.remove(&row.id).unwrap_or_default();

    let address: Option<Address> = sqlx::query_as(
        "SELECT id, street, number, district, city, state, zip_code, created_at \
         FROM addresses WHERE id = $1",
    )
    .bind(row.address_id)
    .fetch_optional(pool)
    .await?;

    Ok(Some(OrderDetail::from_row(row, items, address)))
}

async fn load_lines(
    pool: &PgPool,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderLine>>, AppError> {
    #[derive(FromRow)]
    struct LineRow {
        order_id: Uuid,
        id: Uuid,
        item_id: Uuid,
        description: String,
        quantity: i32,
        unit_price: Decimal,
    }

    let rows: Vec<LineRow> = sqlx::query_as(
        "SELECT oi.order_id, oi.id, oi.item_id, i.description, oi.quantity, oi.unit_price \
         FROM order_items oi JOIN items i ON i.id = oi.item_id \
         WHERE oi.order_id = ANY($1)",
    )
    .bind(order_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in rows {
        grouped.entry(row.order_id).or_default().push(OrderLine {
            id: row.id,
            item_id: row.item_id,
            description: row.description,
            quantity: row.quantity,
            unit_price: row.unit_price,
        });
    }

    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        use OrderStatus::*;

        assert!(Pending.can_transition(Preparing));
        assert!(Preparing.can_transition(Ready));
        assert!(Ready.can_transition(Delivered));
    }

    #[test]
    fn test_cancellation_only_from_early_states() {
        use OrderStatus::*;

        assert!(Pending.can_transition(Cancelled));
        assert!(Preparing.can_transition(Cancelled));
        assert!(!Ready.can_transition(Cancelled));
        assert!(!Delivered.can_transition(Cancelled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        use OrderStatus::*;

        for next in [Pending, Preparing, Ready, Delivered, Cancelled] {
            assert!(!Delivered.can_transition(next));
            assert!(!Cancelled.can_transition(next));
        }
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        use OrderStatus::*;

        assert!(!Pending.can_transition(Ready));
        assert!(!Pending.can_transition(Delivered));
        assert!(!Preparing.can_transition(Pending));
        assert!(!Ready.can_transition(Preparing));
        assert!(!Pending.can_transition(Pending));
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("SHIPPED"), None);
        assert_eq!(OrderStatus::parse("pending"), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("CASH"), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::parse("PIX"), Some(PaymentMethod::Pix));
        assert_eq!(PaymentMethod::parse("BITCOIN"), None);
    }

    #[test]
    fn test_order_payload_rejects_zero_quantity() {
        let payload = CreateOrderPayload {
            payment_method: "CASH".to_string(),
            address_id: Uuid::new_v4(),
            items: vec![OrderItemPayload {
                item_id: Uuid::new_v4(),
                quantity: 0,
            }],
        };

        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_order_payload_rejects_empty_items() {
        let payload = CreateOrderPayload {
            payment_method: "CASH".to_string(),
            address_id: Uuid::new_v4(),
            items: vec![],
        };

        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_order_payload_accepts_valid_lines() {
        let payload = CreateOrderPayload {
            payment_method: "DEBIT".to_string(),
            address_id: Uuid::new_v4(),
            items: vec![
                OrderItemPayload {
                    item_id: Uuid::new_v4(),
                    quantity: 2,
                },
                OrderItemPayload {
                    item_id: Uuid::new_v4(),
                    quantity: 1,
                },
            ],
        };

        assert!(payload.validate().is_ok());
    }
}
