#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::config::AppConfig;
use storefront_api::entities::{product, user, Product};
use storefront_api::errors::ServiceError;
use storefront_api::events::{self, EventSender};
use storefront_api::gateway::{
    self, CheckoutSession, IntentMetadata, PaymentGateway, PaymentIntent, SessionLineItem,
};
use storefront_api::{app_router, db, AppState};

/// Recorded gateway-side view of an intent creation.
#[derive(Debug, Clone)]
pub struct RecordedIntent {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub order_id: Uuid,
    pub user_id: Uuid,
}

/// In-process gateway double: hands out deterministic intent and session
/// ids, records every call, and can be scripted to refuse intents.
pub struct RecordingGateway {
    pub intents: Mutex<Vec<RecordedIntent>>,
    pub sessions: Mutex<Vec<CheckoutSession>>,
    pub fail_intents: AtomicBool,
    counter: AtomicU32,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            intents: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            fail_intents: AtomicBool::new(false),
            counter: AtomicU32::new(0),
        }
    }

    pub fn last_intent(&self) -> RecordedIntent {
        self.intents
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no intent was created")
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "gateway refused the intent".to_string(),
            ));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_test_{}", n);
        self.intents.lock().unwrap().push(RecordedIntent {
            id: id.clone(),
            amount_minor,
            currency: currency.to_string(),
            order_id: metadata.order_id,
            user_id: metadata.user_id,
        });

        Ok(PaymentIntent {
            client_secret: format!("{}_secret", id),
            id,
        })
    }

    async fn create_checkout_session(
        &self,
        _line_items: &[SessionLineItem],
        _customer_email: &str,
        _metadata: &IntentMetadata,
        _shipping_address: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session = CheckoutSession {
            id: format!("cs_test_{}", n),
            url: format!("https://gateway.example.com/checkout/cs_test_{}", n),
        };
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Test application backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir
            .path()
            .join(format!("storefront_{}.db", Uuid::new_v4().simple()));

        let mut cfg =
            AppConfig::with_database_url(format!("sqlite://{}?mode=rwc", db_path.display()));
        // Keep webhook lookup retries fast so negative-path tests stay quick.
        cfg.webhook_lookup_attempts = 2;
        cfg.webhook_lookup_delay_ms = 10;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(RecordingGateway::new());
        let state = AppState::new(
            db_arc,
            Arc::new(cfg),
            gateway.clone() as Arc<dyn PaymentGateway>,
            event_sender,
        );
        let router = app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> axum::response::Response {
        self.request(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Method::GET, uri, None, &[]).await
    }

    /// Posts a webhook delivery with a valid signature over `payload`.
    pub async fn post_signed_webhook(&self, payload: &Value) -> axum::response::Response {
        let body = payload.to_string();
        let header = gateway::sign_payload(
            body.as_bytes(),
            &self.state.config.payment_webhook_secret,
            Utc::now().timestamp(),
        );
        self.post_webhook_raw(body, Some(&header)).await
    }

    /// Posts a webhook delivery with an arbitrary (or missing) signature.
    pub async fn post_webhook_raw(
        &self,
        body: String,
        signature: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header(gateway::SIGNATURE_HEADER, sig);
        }

        let request = builder.body(Body::from(body)).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_user(&self, email: &str) -> user::Model {
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            name: Set("Test Shopper".to_string()),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("seed user for tests")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, inventory: i32) -> product::Model {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            offer_code: Set(None),
            offer_discount: Set(None),
            colors: Set(vec!["red", "blue"].into()),
            sizes: Set(vec!["M", "L"].into()),
            available_pin_codes: Set(vec!["560001", "110001"].into()),
            inventory: Set(inventory),
        };
        model
            .insert(&*self.state.db)
            .await
            .expect("seed product for tests")
    }

    pub async fn product_inventory(&self, product_id: Uuid) -> i32 {
        Product::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .inventory
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Body of a checkout request for one product.
pub fn checkout_body(user_id: Uuid, product_id: Uuid, quantity: i32) -> Value {
    json!({
        "userId": user_id,
        "shippingAddress": "12 Hill Road, Bengaluru",
        "pinCode": "560001",
        "items": [
            { "productId": product_id, "quantity": quantity, "color": "red", "size": "M" }
        ]
    })
}

/// Gateway event envelope for a payment intent.
pub fn intent_event(
    event_type: &str,
    intent_id: &str,
    order_id: Option<Uuid>,
    amount_minor: i64,
    is_test: bool,
) -> Value {
    let mut metadata = json!({ "is_test_payment": if is_test { "true" } else { "false" } });
    if let Some(id) = order_id {
        metadata["order_id"] = json!(id.to_string());
    }

    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "amount": amount_minor,
                "metadata": metadata
            }
        }
    })
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status for response"
    );
}
