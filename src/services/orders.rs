use crate::db::DbPool;
use crate::entities::order::{self, Entity as Order, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::errors::ServiceError;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A fully-specified order ready for insertion, items included.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub currency: String,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub pin_code: String,
    pub is_provisional: bool,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub color: Option<String>,
    pub size: Option<String>,
}

/// Result of a compare-and-set status transition.
///
/// `Stale` means another writer got there first (the precondition status no
/// longer held). It is a success outcome, not an error: duplicate webhook
/// deliveries land here and must be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Stale,
}

/// Repository for orders and their line items.
///
/// Write paths that need to join a larger transaction are generic over
/// `ConnectionTrait`; read conveniences use the owned pool.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Inserts an order plus its items on the caller's connection. Status
    /// always starts at `pending`; webhooks advance it later.
    pub async fn insert_order_with_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_order: NewOrder,
    ) -> Result<order::Model, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(new_order.user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(new_order.total_amount),
            currency: Set(new_order.currency),
            payment_intent_id: Set(None),
            checkout_session_id: Set(None),
            shipping_address: Set(new_order.shipping_address),
            pin_code: Set(new_order.pin_code),
            is_provisional: Set(new_order.is_provisional),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let inserted = model.insert(conn).await?;

        if !new_order.items.is_empty() {
            let items: Vec<order_item::ActiveModel> = new_order
                .items
                .into_iter()
                .map(|item| order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                    unit_price: Set(item.unit_price),
                    color: Set(item.color),
                    size: Set(item.size),
                })
                .collect();
            OrderItem::insert_many(items).exec(conn).await?;
        }

        debug!(order_id = %order_id, "order inserted");
        Ok(inserted)
    }

    pub async fn find_by_id(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find_by_id(order_id).one(&*self.db).await?)
    }

    pub async fn find_by_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::PaymentIntentId.eq(intent_id))
            .one(&*self.db)
            .await?)
    }

    /// Line items for an order, on the caller's connection.
    pub async fn items_for_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(conn)
            .await?)
    }

    /// Binds the gateway intent id to an order, exactly once. A second bind
    /// attempt with a different id is a conflict.
    pub async fn bind_payment_intent<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        intent_id: &str,
    ) -> Result<(), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match &order.payment_intent_id {
            Some(existing) if existing == intent_id => return Ok(()),
            Some(existing) => {
                return Err(ServiceError::Conflict(format!(
                    "Order {} is already bound to payment intent {}",
                    order_id, existing
                )))
            }
            None => {}
        }

        let mut active: order::ActiveModel = order.into();
        active.payment_intent_id = Set(Some(intent_id.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(conn).await?;
        Ok(())
    }

    /// Records the checkout-session id produced during reconciliation.
    pub async fn bind_checkout_session<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        session_id: &str,
    ) -> Result<(), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = order.into();
        active.checkout_session_id = Set(Some(session_id.to_string()));
        active.updated_at = Set(Some(Utc::now()));
        active.update(conn).await?;
        Ok(())
    }

    /// Compare-and-set status transition.
    ///
    /// The precondition is enforced in the UPDATE's WHERE clause, so races
    /// between webhook retries, the expiry sweeper and duplicate deliveries
    /// resolve without locks: exactly one caller observes `Applied`.
    ///
    /// A transition the state machine forbids outright is rejected before
    /// touching the database.
    pub async fn transition_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<TransitionOutcome, ServiceError> {
        if !expected.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Order status cannot change from {} to {}",
                expected.as_str(),
                next.as_str()
            )));
        }

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(next))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(expected))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            debug!(
                order_id = %order_id,
                expected = expected.as_str(),
                next = next.as_str(),
                "status transition was stale"
            );
            return Ok(TransitionOutcome::Stale);
        }

        info!(
            order_id = %order_id,
            from = expected.as_str(),
            to = next.as_str(),
            "order status updated"
        );
        Ok(TransitionOutcome::Applied)
    }

    /// Pending, non-provisional orders created at or before `cutoff`. These
    /// are checkouts whose payment never resolved; the expiry sweeper fails
    /// them and restores their stock.
    pub async fn find_expired_pending(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::IsProvisional.eq(false))
            .filter(order::Column::CreatedAt.lte(cutoff))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
