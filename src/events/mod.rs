use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted after state changes commit. Consumed for
/// operational visibility; failures to deliver never affect the owning
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    PaymentIntentCreated {
        order_id: Uuid,
        intent_id: String,
    },
    CheckoutSessionCreated {
        order_id: Uuid,
        session_id: String,
    },
    OrderCompleted(Uuid),
    OrderPaymentFailed(Uuid),
    ProvisionalOrderRecorded(Uuid),
    OrderReservationExpired(Uuid),
    InventoryReleased {
        product_id: Uuid,
        quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Runs for the lifetime of
/// the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(id) => info!(order_id = %id, "order created"),
            Event::PaymentIntentCreated {
                order_id,
                intent_id,
            } => {
                info!(order_id = %order_id, intent_id = %intent_id, "payment intent created")
            }
            Event::CheckoutSessionCreated {
                order_id,
                session_id,
            } => {
                info!(order_id = %order_id, session_id = %session_id, "checkout session created")
            }
            Event::OrderCompleted(id) => info!(order_id = %id, "order completed"),
            Event::OrderPaymentFailed(id) => info!(order_id = %id, "order payment failed"),
            Event::ProvisionalOrderRecorded(id) => {
                info!(order_id = %id, "provisional order recorded")
            }
            Event::OrderReservationExpired(id) => {
                info!(order_id = %id, "order reservation expired")
            }
            Event::InventoryReleased {
                product_id,
                quantity,
            } => {
                info!(product_id = %product_id, quantity = quantity, "inventory released")
            }
        }
    }
}
