//! Thin client for the external payment gateway: intent/checkout-session
//! creation and inbound webhook signature verification.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature, `t=<unix>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "gateway-signature";

/// An in-progress payment attempt at the gateway, correlated to a local
/// order via metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Hosted checkout session created during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Correlation metadata embedded in every gateway object we create.
#[derive(Debug, Clone, Serialize)]
pub struct IntentMetadata {
    pub order_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    /// Minor units (cents), gateway convention.
    pub unit_amount: i64,
    pub quantity: i32,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError>;

    async fn create_checkout_session(
        &self,
        line_items: &[SessionLineItem],
        customer_email: &str,
        metadata: &IntentMetadata,
        shipping_address: &str,
    ) -> Result<CheckoutSession, ServiceError>;
}

/// HTTP implementation against the gateway's REST API. All calls carry a
/// bounded timeout; a timeout aborts the caller's enclosing transaction.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(api_base: String, secret_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base,
            secret_key,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "metadata": {
                "order_id": metadata.order_id,
                "user_id": metadata.user_id,
                "is_test_payment": "false",
            },
        });

        let response = self
            .client
            .post(self.endpoint("/v1/payment_intents"))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway intent: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway intent returned {}",
                response.status()
            )));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway intent body: {}", e)))
    }

    async fn create_checkout_session(
        &self,
        line_items: &[SessionLineItem],
        customer_email: &str,
        metadata: &IntentMetadata,
        shipping_address: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let body = serde_json::json!({
            "mode": "payment",
            "line_items": line_items,
            "customer_email": customer_email,
            "metadata": {
                "order_id": metadata.order_id,
                "user_id": metadata.user_id,
            },
            "shipping_address": shipping_address,
        });

        let response = self
            .client
            .post(self.endpoint("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway session: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway session returned {}",
                response.status()
            )));
        }

        response.json::<CheckoutSession>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("gateway session body: {}", e))
        })
    }
}

/// Correlation metadata carried on inbound events. Gateway metadata values
/// are strings on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_test_payment: Option<String>,
}

impl EventMetadata {
    pub fn order_uuid(&self) -> Option<Uuid> {
        self.order_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn user_uuid(&self) -> Option<Uuid> {
        self.user_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// The gateway object an event describes (the payment intent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentObject {
    #[serde(default)]
    pub id: Option<String>,
    /// Minor units.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl IntentObject {
    pub fn is_test(&self) -> bool {
        self.metadata.is_test_payment.as_deref() == Some("true")
    }

    /// Amount in major units, for audit records of unmatched events.
    pub fn amount_decimal(&self) -> Decimal {
        Decimal::new(self.amount.unwrap_or(0), 2)
    }
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: IntentObject,
}

/// Gateway notifications as a closed set: unknown types land in `Other` and
/// are acknowledged without mutation.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    IntentCreated(IntentObject),
    PaymentSucceeded(IntentObject),
    PaymentFailed(IntentObject),
    Other { event_type: String },
}

impl GatewayEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, ServiceError> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::InvalidSignature(format!("malformed event body: {}", e)))?;

        Ok(match envelope.event_type.as_str() {
            "payment_intent.created" => Self::IntentCreated(envelope.data.object),
            "payment_intent.succeeded" => Self::PaymentSucceeded(envelope.data.object),
            "payment_intent.payment_failed" => Self::PaymentFailed(envelope.data.object),
            other => Self::Other {
                event_type: other.to_string(),
            },
        })
    }
}

/// Verifies the `t=..,v1=..` signature header over `"{t}.{payload}"`.
pub fn verify_event_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), ServiceError> {
    let header = signature_header
        .ok_or_else(|| ServiceError::InvalidSignature("missing signature header".to_string()))?;

    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", val)) => ts = val,
            Some(("v1", val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return Err(ServiceError::InvalidSignature(
            "malformed signature header".to_string(),
        ));
    }

    let ts_i: i64 = ts
        .parse()
        .map_err(|_| ServiceError::InvalidSignature("invalid signature timestamp".to_string()))?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return Err(ServiceError::InvalidSignature(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(payload, secret, ts_i);
    if constant_time_eq(&expected, v1) {
        Ok(())
    } else {
        Err(ServiceError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

/// Builds a valid signature header for a payload. Counterpart of
/// `verify_event_signature`; used by webhook senders and tests.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        compute_signature(payload, secret, timestamp)
    )
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
