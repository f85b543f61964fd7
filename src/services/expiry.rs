use crate::db::DbPool;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory::InventoryService;
use crate::services::orders::{OrderService, TransitionOutcome};
use chrono::Utc;
use sea_orm::TransactionTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Background sweep that fails pending orders whose payment never resolved
/// and returns their reserved stock.
///
/// Without it, a checkout whose gateway events are lost (or whose shopper
/// walks away) would hold its reservation forever. Each expiry goes through
/// the same compare-and-set as the webhook paths, so a success event landing
/// mid-sweep wins or loses cleanly, never both.
pub struct ReservationSweeper {
    db: Arc<DbPool>,
    orders: Arc<OrderService>,
    inventory: InventoryService,
    event_sender: EventSender,
    ttl: Duration,
    interval: Duration,
}

impl ReservationSweeper {
    pub fn new(
        db: Arc<DbPool>,
        orders: Arc<OrderService>,
        inventory: InventoryService,
        event_sender: EventSender,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            orders,
            inventory,
            event_sender,
            ttl,
            interval,
        }
    }

    /// Spawns the periodic sweep loop. Runs until the process exits.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(0) => {}
                    Ok(expired) => info!(expired = expired, "reservation sweep completed"),
                    Err(e) => error!("reservation sweep failed: {}", e),
                }
            }
        })
    }

    /// One pass: expire every pending, non-provisional order older than the
    /// TTL. Returns how many orders were expired.
    ///
    /// Orders are handled one per transaction so a single contended order
    /// cannot wedge the whole sweep.
    pub async fn sweep_once(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ttl)
                .map_err(|e| ServiceError::InternalError(format!("invalid ttl: {}", e)))?;

        let stale = self.orders.find_expired_pending(cutoff).await?;
        let mut expired = 0u64;

        for order in stale {
            let txn = self.db.begin().await?;
            let outcome = self
                .orders
                .transition_status(&txn, order.id, OrderStatus::Pending, OrderStatus::Failed)
                .await?;

            if outcome != TransitionOutcome::Applied {
                // A webhook resolved the order between the scan and here.
                continue;
            }

            let items = self.orders.items_for_order(&txn, order.id).await?;
            for item in &items {
                self.inventory
                    .release(&txn, item.product_id, item.quantity)
                    .await?;
            }
            txn.commit().await?;
            expired += 1;

            info!(order_id = %order.id, "expired stale reservation");
            if let Err(e) = self
                .event_sender
                .send(Event::OrderReservationExpired(order.id))
                .await
            {
                warn!("failed to publish reservation-expired event: {}", e);
            }
        }

        Ok(expired)
    }
}
