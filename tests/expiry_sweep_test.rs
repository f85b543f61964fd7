mod common;

use axum::http::StatusCode;
use common::{body_json, checkout_body, intent_event, TestApp};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::time::Duration;
use storefront_api::entities::{order, Order};
use storefront_api::services::expiry::ReservationSweeper;
use uuid::Uuid;

fn sweeper(app: &TestApp, ttl: Duration) -> ReservationSweeper {
    ReservationSweeper::new(
        app.state.db.clone(),
        app.state.services.orders.clone(),
        app.state.services.inventory,
        app.state.event_sender.clone(),
        ttl,
        Duration::from_secs(300),
    )
}

async fn checkout(app: &TestApp) -> (Uuid, String, Uuid) {
    let user = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 5).await;

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            checkout_body(user.id, product.id, 2),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let order_id: Uuid = body["orderId"].as_str().unwrap().parse().unwrap();
    (order_id, app.gateway.last_intent().id, product.id)
}

async fn backdate_order(app: &TestApp, order_id: Uuid, hours: i64) {
    Order::update_many()
        .col_expr(
            order::Column::CreatedAt,
            Expr::value(Utc::now() - ChronoDuration::hours(hours)),
        )
        .filter(order::Column::Id.eq(order_id))
        .exec(&*app.state.db)
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_pending_order_fails_and_restores_stock() {
    let app = TestApp::new().await;
    let (order_id, _, product_id) = checkout(&app).await;
    assert_eq!(app.product_inventory(product_id).await, 3);

    backdate_order(&app, order_id, 2).await;

    let expired = sweeper(&app, Duration::from_secs(1800))
        .sweep_once()
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, order::OrderStatus::Failed);
    assert_eq!(app.product_inventory(product_id).await, 5);
}

#[tokio::test]
async fn fresh_pending_orders_are_left_alone() {
    let app = TestApp::new().await;
    let (order_id, _, product_id) = checkout(&app).await;

    let expired = sweeper(&app, Duration::from_secs(1800))
        .sweep_once()
        .await
        .unwrap();
    assert_eq!(expired, 0);

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, order::OrderStatus::Pending);
    assert_eq!(app.product_inventory(product_id).await, 3);
}

#[tokio::test]
async fn resolved_orders_are_not_swept() {
    let app = TestApp::new().await;
    let (order_id, intent_id, product_id) = checkout(&app).await;

    let success = intent_event(
        "payment_intent.succeeded",
        &intent_id,
        Some(order_id),
        4000,
        false,
    );
    let response = app.post_signed_webhook(&success).await;
    assert_eq!(response.status(), StatusCode::OK);

    backdate_order(&app, order_id, 2).await;

    let expired = sweeper(&app, Duration::from_secs(1800))
        .sweep_once()
        .await
        .unwrap();
    assert_eq!(expired, 0);

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, order::OrderStatus::Completed);
    // Sold stock stays sold.
    assert_eq!(app.product_inventory(product_id).await, 3);
}

#[tokio::test]
async fn provisional_orders_are_excluded_from_the_sweep() {
    let app = TestApp::new().await;

    // Provisional orders complete on insert, but guard the filter anyway by
    // checking none are picked up even when backdated.
    let payload = intent_event("payment_intent.succeeded", "pi_sandbox_9", None, 4000, true);
    app.post_signed_webhook(&payload).await;

    let provisional = Order::find()
        .filter(order::Column::IsProvisional.eq(true))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    backdate_order(&app, provisional.id, 2).await;

    let expired = sweeper(&app, Duration::from_secs(1800))
        .sweep_once()
        .await
        .unwrap();
    assert_eq!(expired, 0);
}
