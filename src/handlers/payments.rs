use crate::errors::ServiceError;
use crate::services::payments::{CreatePaymentIntentRequest, CreatePaymentIntentResponse};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};

/// Creates a payment intent for a cart.
///
/// Reserves stock, records the order, and returns the gateway client secret
/// the storefront needs to confirm the payment.
#[utoipa::path(
    post,
    path = "/api/v1/payments/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = CreatePaymentIntentResponse),
        (status = 400, description = "Invalid cart or destination", body = crate::errors::ErrorResponse),
        (status = 404, description = "User or product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.payments.create_payment_intent(request).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Payment routes, nested under `/payments`.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/webhook", post(super::payment_webhooks::payment_webhook))
}
