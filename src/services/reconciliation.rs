use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus};
use crate::entities::{Product, User};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    self, GatewayEvent, IntentMetadata, IntentObject, PaymentGateway, SessionLineItem,
};
use crate::services::inventory::InventoryService;
use crate::services::orders::{NewOrder, OrderService, TransitionOutcome};
use crate::services::payments::to_minor_units;
use crate::services::retry::RetryPolicy;
use sea_orm::{EntityTrait, TransactionTrait};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// How a verified webhook was resolved. All three are acknowledged to the
/// gateway; only signature or parse failures bounce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event applied (or recognized as a duplicate and skipped).
    Received,
    /// Verification passed but processing failed; acknowledged anyway so the
    /// gateway stops redelivering. The failure is logged for operators.
    ProcessedWithErrors,
    /// Intent-created events answer with a redirect to the hosted checkout.
    Redirect(String),
}

/// Applies gateway webhook events to local state.
///
/// Ordering guarantees from the gateway are weak: deliveries repeat, arrive
/// out of order, and can race the checkout transaction that creates the
/// order they reference. Every mutation therefore goes through the order
/// repository's compare-and-set, which makes redelivery a no-op.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    orders: Arc<OrderService>,
    inventory: InventoryService,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    currency: String,
    webhook_secret: String,
    signature_tolerance_secs: u64,
    lookup_retry: RetryPolicy,
}

impl ReconciliationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        orders: Arc<OrderService>,
        inventory: InventoryService,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        currency: String,
        webhook_secret: String,
        signature_tolerance_secs: u64,
        lookup_retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            orders,
            inventory,
            gateway,
            event_sender,
            currency,
            webhook_secret,
            signature_tolerance_secs,
            lookup_retry,
        }
    }

    /// Entry point for raw webhook deliveries.
    ///
    /// The signature is verified over the exact bytes received; only
    /// verification or parse failures surface as errors (HTTP 400). Anything
    /// that goes wrong after verification is logged and acknowledged, since
    /// redelivering an event we could not process will not fix it.
    #[instrument(skip_all)]
    pub async fn handle_event(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        gateway::verify_event_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            self.signature_tolerance_secs,
        )?;
        let event = GatewayEvent::parse(payload)?;

        match self.dispatch(event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("webhook processing failed after verification: {}", e);
                Ok(WebhookOutcome::ProcessedWithErrors)
            }
        }
    }

    async fn dispatch(&self, event: GatewayEvent) -> Result<WebhookOutcome, ServiceError> {
        match event {
            GatewayEvent::IntentCreated(obj) => self.handle_intent_created(obj).await,
            GatewayEvent::PaymentSucceeded(obj) => self.handle_payment_succeeded(obj).await,
            GatewayEvent::PaymentFailed(obj) => self.handle_payment_failed(obj).await,
            GatewayEvent::Other { event_type } => {
                info!(event_type = %event_type, "ignoring unhandled gateway event");
                Ok(WebhookOutcome::Received)
            }
        }
    }

    /// Finds the order an event refers to, preferring the metadata order id
    /// and falling back to the intent id. Retries briefly because the event
    /// can outrun the checkout transaction's commit.
    async fn find_order(
        &self,
        order_id: Option<Uuid>,
        intent_id: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError> {
        if order_id.is_none() && intent_id.is_none() {
            return Ok(None);
        }

        let orders = &self.orders;
        self.lookup_retry
            .until_some(move || async move {
                if let Some(id) = order_id {
                    if let Some(found) = orders.find_by_id(id).await? {
                        return Ok(Some(found));
                    }
                }
                if let Some(intent) = intent_id {
                    return orders.find_by_payment_intent(intent).await;
                }
                Ok(None)
            })
            .await
    }

    /// `payment_intent.created`: build the hosted checkout session for the
    /// order and answer with its URL.
    async fn handle_intent_created(
        &self,
        object: IntentObject,
    ) -> Result<WebhookOutcome, ServiceError> {
        let order = self
            .find_order(object.metadata.order_uuid(), object.id.as_deref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("Order for created intent not found".to_string())
            })?;

        if order.status == OrderStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is already completed",
                order.id
            )));
        }

        let user = User::find_by_id(order.user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", order.user_id))
            })?;

        let items = self.orders.items_for_order(&*self.db, order.id).await?;
        let mut line_items = Vec::with_capacity(items.len());
        for item in &items {
            let name = Product::find_by_id(item.product_id)
                .one(&*self.db)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| "Item".to_string());
            line_items.push(SessionLineItem {
                name,
                unit_amount: to_minor_units(item.unit_price)?,
                quantity: item.quantity,
            });
        }

        let metadata = IntentMetadata {
            order_id: order.id,
            user_id: user.id,
        };
        let session = self
            .gateway
            .create_checkout_session(&line_items, &user.email, &metadata, &order.shipping_address)
            .await?;

        self.orders
            .bind_checkout_session(&*self.db, order.id, &session.id)
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::CheckoutSessionCreated {
                order_id: order.id,
                session_id: session.id.clone(),
            })
            .await
        {
            warn!("failed to publish session-created event: {}", e);
        }

        Ok(WebhookOutcome::Redirect(session.url))
    }

    /// `payment_intent.succeeded`: complete the order.
    ///
    /// Stock was already reserved when the intent was created, so success
    /// never touches inventory; the only mutation is the status
    /// compare-and-set, which absorbs duplicates and out-of-order retries.
    async fn handle_payment_succeeded(
        &self,
        object: IntentObject,
    ) -> Result<WebhookOutcome, ServiceError> {
        let found = self
            .find_order(object.metadata.order_uuid(), object.id.as_deref())
            .await?;

        let Some(order) = found else {
            // Sandbox traffic and events that never carried an order
            // reference cannot be matched; record them so the books balance.
            if object.is_test() || object.metadata.order_id.is_none() {
                return self.record_provisional_order(&object).await;
            }
            error!(
                intent_id = object.id.as_deref().unwrap_or("<none>"),
                "no order matches a live payment success event"
            );
            return Ok(WebhookOutcome::Received);
        };

        match self
            .orders
            .transition_status(
                &*self.db,
                order.id,
                OrderStatus::Pending,
                OrderStatus::Completed,
            )
            .await?
        {
            TransitionOutcome::Applied => {
                info!(order_id = %order.id, "payment confirmed, order completed");
                if let Err(e) = self.event_sender.send(Event::OrderCompleted(order.id)).await {
                    warn!("failed to publish order-completed event: {}", e);
                }
            }
            TransitionOutcome::Stale => {
                info!(
                    order_id = %order.id,
                    status = order.status.as_str(),
                    "success event was a duplicate or arrived out of order, skipped"
                );
            }
        }

        Ok(WebhookOutcome::Received)
    }

    /// Records an order for an unmatchable payment success: gateway test
    /// traffic, or an event that carries no order reference at all.
    /// Provisional orders never participate in inventory accounting.
    async fn record_provisional_order(
        &self,
        object: &IntentObject,
    ) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let order = self
            .orders
            .insert_order_with_items(
                &txn,
                NewOrder {
                    user_id: object.metadata.user_uuid().unwrap_or_else(Uuid::nil),
                    currency: self.currency.clone(),
                    total_amount: object.amount_decimal(),
                    shipping_address: "unknown".to_string(),
                    pin_code: "unknown".to_string(),
                    is_provisional: true,
                    items: Vec::new(),
                },
            )
            .await?;

        if let Some(intent_id) = object.id.as_deref() {
            self.orders
                .bind_payment_intent(&txn, order.id, intent_id)
                .await?;
        }
        self.orders
            .transition_status(&txn, order.id, OrderStatus::Pending, OrderStatus::Completed)
            .await?;

        txn.commit().await?;

        info!(
            order_id = %order.id,
            intent_id = object.id.as_deref().unwrap_or("<none>"),
            "recorded provisional order for unmatched test payment"
        );
        if let Err(e) = self
            .event_sender
            .send(Event::ProvisionalOrderRecorded(order.id))
            .await
        {
            warn!("failed to publish provisional-order event: {}", e);
        }

        Ok(WebhookOutcome::Received)
    }

    /// `payment_intent.payment_failed`: fail the order and hand its
    /// reservation back to stock.
    ///
    /// The release is gated on winning the compare-and-set, so redelivered
    /// failure events can never restore the same units twice. Transition and
    /// release commit together.
    async fn handle_payment_failed(
        &self,
        object: IntentObject,
    ) -> Result<WebhookOutcome, ServiceError> {
        let found = self
            .find_order(object.metadata.order_uuid(), object.id.as_deref())
            .await?;

        let Some(order) = found else {
            warn!(
                intent_id = object.id.as_deref().unwrap_or("<none>"),
                "no order matches a payment failure event"
            );
            return Ok(WebhookOutcome::Received);
        };

        let txn = self.db.begin().await?;
        let outcome = self
            .orders
            .transition_status(&txn, order.id, OrderStatus::Pending, OrderStatus::Failed)
            .await?;

        match outcome {
            TransitionOutcome::Applied => {
                let mut released = Vec::new();
                if !order.is_provisional {
                    let items = self.orders.items_for_order(&txn, order.id).await?;
                    for item in &items {
                        self.inventory
                            .release(&txn, item.product_id, item.quantity)
                            .await?;
                        released.push((item.product_id, item.quantity));
                    }
                }
                txn.commit().await?;

                info!(order_id = %order.id, "payment failed, order failed and stock restored");
                if let Err(e) = self
                    .event_sender
                    .send(Event::OrderPaymentFailed(order.id))
                    .await
                {
                    warn!("failed to publish payment-failed event: {}", e);
                }
                for (product_id, quantity) in released {
                    if let Err(e) = self
                        .event_sender
                        .send(Event::InventoryReleased {
                            product_id,
                            quantity,
                        })
                        .await
                    {
                        warn!("failed to publish inventory-released event: {}", e);
                    }
                }
            }
            TransitionOutcome::Stale => {
                // Nothing changed; let the transaction roll back on drop.
                info!(
                    order_id = %order.id,
                    status = order.status.as_str(),
                    "failure event was a duplicate or arrived out of order, skipped"
                );
            }
        }

        Ok(WebhookOutcome::Received)
    }
}
