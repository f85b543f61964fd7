pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::inventory::InventoryService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;
use crate::services::reconciliation::ReconciliationService;
use crate::services::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Service container wired into the router state.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub inventory: InventoryService,
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone()));
        let inventory = InventoryService::new();

        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway.clone(),
            orders.clone(),
            inventory,
            event_sender.clone(),
            config.currency.clone(),
        ));

        let lookup_retry = RetryPolicy::fixed(
            config.webhook_lookup_attempts,
            Duration::from_millis(config.webhook_lookup_delay_ms),
        );
        let reconciliation = Arc::new(ReconciliationService::new(
            db,
            orders.clone(),
            inventory,
            gateway,
            event_sender,
            config.currency.clone(),
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
            lookup_retry,
        ));

        Self {
            orders,
            inventory,
            payments,
            reconciliation,
        }
    }
}
