use crate::errors::ServiceError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub color: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailsResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub shipping_address: String,
    pub pin_code: String,
    pub is_provisional: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
}

/// Fetches an order with its line items.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = OrderDetailsResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetailsResponse>, ServiceError> {
    let order = state
        .services
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let items = state
        .services
        .orders
        .items_for_order(&*state.db, order_id)
        .await?
        .into_iter()
        .map(|item| OrderItemResponse {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            color: item.color,
            size: item.size,
        })
        .collect();

    Ok(Json(OrderDetailsResponse {
        id: order.id,
        user_id: order.user_id,
        status: order.status.as_str().to_string(),
        total_amount: order.total_amount,
        currency: order.currency,
        payment_intent_id: order.payment_intent_id,
        checkout_session_id: order.checkout_session_id,
        shipping_address: order.shipping_address,
        pin_code: order.pin_code,
        is_provisional: order.is_provisional,
        created_at: order.created_at,
        updated_at: order.updated_at,
        items,
    }))
}
