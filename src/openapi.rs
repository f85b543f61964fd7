use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::orders::{OrderDetailsResponse, OrderItemResponse};
use crate::services::payments::{
    CartItemRequest, CreatePaymentIntentRequest, CreatePaymentIntentResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Order and payment coordination: checkout, inventory reservation, and gateway webhook reconciliation."
    ),
    paths(
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::orders::get_order,
    ),
    components(schemas(
        CreatePaymentIntentRequest,
        CartItemRequest,
        CreatePaymentIntentResponse,
        OrderDetailsResponse,
        OrderItemResponse,
        ErrorResponse,
    )),
    tags(
        (name = "payments", description = "Checkout and webhook reconciliation"),
        (name = "orders", description = "Order lookup"),
    )
)]
pub struct ApiDoc;

/// Swagger UI at `/docs`, serving the generated document from
/// `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
