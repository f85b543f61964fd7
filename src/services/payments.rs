use crate::db::DbPool;
use crate::entities::User;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{IntentMetadata, PaymentGateway};
use crate::services::inventory::InventoryService;
use crate::services::orders::{NewOrder, NewOrderItem, OrderService};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Checkout request: the cart and its destination.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "shipping address must not be empty"))]
    pub shipping_address: String,
    #[validate(length(min = 1, message = "pin code must not be empty"))]
    pub pin_code: String,
    pub items: Vec<CartItemRequest>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub color: String,
    pub size: String,
    /// Offer codes apply per line item, not per cart.
    #[serde(default)]
    pub applied_offer_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub order_id: Uuid,
}

/// Converts a major-unit amount to the gateway's minor units (cents).
/// Half-cent amounts round away from zero.
pub(crate) fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::InternalError("order total out of range".to_string()))
}

/// Coordinates checkout: validates the cart, reserves stock, records the
/// order, and creates the gateway payment intent, all within one database
/// transaction.
///
/// The gateway call happens while the transaction is still open. If the
/// gateway refuses or times out, the transaction rolls back and neither the
/// order nor any stock decrement survives.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderService>,
    inventory: InventoryService,
    event_sender: EventSender,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<OrderService>,
        inventory: InventoryService,
        event_sender: EventSender,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            orders,
            inventory,
            event_sender,
            currency,
        }
    }

    fn validate_request(request: &CreatePaymentIntentRequest) -> Result<(), ServiceError> {
        request.validate()?;
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "items must not be empty".to_string(),
            ));
        }
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<CreatePaymentIntentResponse, ServiceError> {
        Self::validate_request(&request)?;

        let user = User::find_by_id(request.user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("User {} not found", request.user_id))
            })?;

        let txn = self.db.begin().await?;

        let mut total = Decimal::ZERO;
        let mut order_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = self.inventory.load(&txn, item.product_id).await?;
            self.inventory.check_eligibility(
                &product,
                &request.pin_code,
                &item.color,
                &item.size,
            )?;

            let unit_price = product.discounted_price(item.applied_offer_code.as_deref());
            self.inventory.reserve(&txn, &product, item.quantity).await?;

            total += unit_price * Decimal::from(item.quantity);
            order_items.push(NewOrderItem {
                product_id: product.id,
                quantity: item.quantity,
                unit_price,
                color: Some(item.color.clone()),
                size: Some(item.size.clone()),
            });
        }

        let order = self
            .orders
            .insert_order_with_items(
                &txn,
                NewOrder {
                    user_id: user.id,
                    currency: self.currency.clone(),
                    total_amount: total,
                    shipping_address: request.shipping_address.clone(),
                    pin_code: request.pin_code.clone(),
                    is_provisional: false,
                    items: order_items,
                },
            )
            .await?;

        let metadata = IntentMetadata {
            order_id: order.id,
            user_id: user.id,
        };
        let intent = self
            .gateway
            .create_intent(to_minor_units(total)?, &self.currency, &metadata)
            .await?;

        self.orders
            .bind_payment_intent(&txn, order.id, &intent.id)
            .await?;

        txn.commit().await?;

        info!(
            order_id = %order.id,
            intent_id = %intent.id,
            total = %total,
            "payment intent created"
        );

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order.id)).await {
            warn!("failed to publish order-created event: {}", e);
        }
        if let Err(e) = self
            .event_sender
            .send(Event::PaymentIntentCreated {
                order_id: order.id,
                intent_id: intent.id.clone(),
            })
            .await
        {
            warn!("failed to publish intent-created event: {}", e);
        }

        Ok(CreatePaymentIntentResponse {
            client_secret: intent.client_secret,
            order_id: order.id,
        })
    }
}
