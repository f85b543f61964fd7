use crate::errors::ServiceError;
use crate::gateway;
use crate::services::reconciliation::WebhookOutcome;
use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;

/// Receives gateway webhook deliveries.
///
/// The body is taken raw because the signature covers the exact bytes sent;
/// re-serializing a parsed value would break verification. Responses follow
/// the gateway's retry contract: 400 only when the delivery itself is
/// unverifiable, 200 for everything else, and 303 when an intent-created
/// event produces a hosted checkout session.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 303, description = "Redirect to hosted checkout"),
        (status = 400, description = "Missing or invalid signature", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let signature = headers
        .get(gateway::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .services
        .reconciliation
        .handle_event(&body, signature)
        .await?;

    Ok(match outcome {
        WebhookOutcome::Redirect(url) => Redirect::to(&url).into_response(),
        WebhookOutcome::Received => {
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        WebhookOutcome::ProcessedWithErrors => (
            StatusCode::OK,
            Json(json!({ "received": true, "warnings": true })),
        )
            .into_response(),
    })
}
