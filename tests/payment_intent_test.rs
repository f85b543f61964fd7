mod common;

use axum::http::StatusCode;
use common::{body_json, checkout_body, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use std::sync::atomic::Ordering;
use storefront_api::entities::{order, order_item, Order, OrderItem};
use uuid::Uuid;

#[tokio::test]
async fn checkout_creates_order_and_reserves_stock() {
    let app = TestApp::new().await;
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
    assert!(body["clientSecret"].as_str().unwrap().ends_with("_secret"));

    // Stock was reserved inside the checkout transaction.
    assert_eq!(app.product_inventory(product.id).await, 3);

    // The order is pending, bound to the gateway intent, with snapshotted items.
    let order = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, order::OrderStatus::Pending);
    assert_eq!(order.total_amount, dec!(40.00));
    assert!(!order.is_provisional);

    let recorded = app.gateway.last_intent();
    assert_eq!(order.payment_intent_id.as_deref(), Some(recorded.id.as_str()));
    assert_eq!(recorded.amount_minor, 4000);
    assert_eq!(recorded.order_id, order_id);

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_price, dec!(20.00));
    assert_eq!(items[0].color.as_deref(), Some("red"));
}

#[tokio::test]
async fn offer_codes_apply_per_line_item() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let shirt = app.seed_product("Linen Shirt", dec!(20.00), 5).await;
    let scarf = app.seed_product("Wool Scarf", dec!(15.00), 5).await;

    for (product, code) in [(&shirt, "SUMMER10"), (&scarf, "WINTER20")] {
        let mut active: storefront_api::entities::product::ActiveModel = product.clone().into();
        active.offer_code = Set(Some(code.to_string()));
        active.offer_discount = Set(Some(dec!(2.50)));
        active.update(&*app.state.db).await.unwrap();
    }

    // Code on the shirt line only; the scarf stays full price even though it
    // has a discount configured.
    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            json!({
                "userId": user.id,
                "shippingAddress": "12 Hill Road, Bengaluru",
                "pinCode": "560001",
                "items": [
                    {
                        "productId": shirt.id, "quantity": 2,
                        "color": "red", "size": "M",
                        "appliedOfferCode": "SUMMER10"
                    },
                    {
                        "productId": scarf.id, "quantity": 1,
                        "color": "red", "size": "M"
                    }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // 2 * (20.00 - 2.50) + 15.00 = 50.00
    assert_eq!(app.gateway.last_intent().amount_minor, 5000);

    // Snapshotted unit prices reflect the per-item discount.
    let items = OrderItem::find().all(&*app.state.db).await.unwrap();
    let shirt_line = items.iter().find(|i| i.product_id == shirt.id).unwrap();
    let scarf_line = items.iter().find(|i| i.product_id == scarf.id).unwrap();
    assert_eq!(shirt_line.unit_price, dec!(17.50));
    assert_eq!(scarf_line.unit_price, dec!(15.00));
}

#[tokio::test]
async fn insufficient_stock_rejects_and_leaves_no_trace() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 1).await;

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            checkout_body(user.id, product.id, 3),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(app.product_inventory(product.id).await, 1);
    let orders = Order::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
    assert!(app.gateway.intents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn gateway_refusal_rolls_back_order_and_reservation() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 5).await;

    app.gateway.fail_intents.store(true, Ordering::SeqCst);

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            checkout_body(user.id, product.id, 2),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // The reservation and the order insert were both undone.
    assert_eq!(app.product_inventory(product.id).await, 5);
    let orders = Order::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn unknown_user_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 5).await;

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            checkout_body(Uuid::new_v4(), product.id, 1),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.product_inventory(product.id).await, 5);
}

#[tokio::test]
async fn undeliverable_pin_code_is_rejected() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 5).await;

    let mut body = checkout_body(user.id, product.id, 1);
    body["pinCode"] = json!("999999");

    let response = app
        .post_json("/api/v1/payments/create-payment-intent", body)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.product_inventory(product.id).await, 5);
}

#[tokio::test]
async fn unavailable_variant_is_rejected() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 5).await;

    let mut body = checkout_body(user.id, product.id, 1);
    body["items"][0]["size"] = json!("XXL");

    let response = app
        .post_json("/api/v1/payments/create-payment-intent", body)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            json!({
                "userId": user.id,
                "shippingAddress": "12 Hill Road, Bengaluru",
                "pinCode": "560001",
                "items": []
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn partial_failure_in_a_multi_item_cart_reserves_nothing() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let plenty = app.seed_product("Linen Shirt", dec!(20.00), 10).await;
    let scarce = app.seed_product("Wool Scarf", dec!(15.00), 1).await;

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            json!({
                "userId": user.id,
                "shippingAddress": "12 Hill Road, Bengaluru",
                "pinCode": "560001",
                "items": [
                    { "productId": plenty.id, "quantity": 2, "color": "red", "size": "M" },
                    { "productId": scarce.id, "quantity": 5, "color": "red", "size": "M" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The first item's reservation rolled back with the transaction.
    assert_eq!(app.product_inventory(plenty.id).await, 10);
    assert_eq!(app.product_inventory(scarce.id).await, 1);
}

#[tokio::test]
async fn order_lookup_returns_details() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Linen Shirt", dec!(20.00), 5).await;

    let response = app
        .post_json(
            "/api/v1/payments/create-payment-intent",
            checkout_body(user.id, product.id, 1),
        )
        .await;
    let created = body_json(response).await;
    let order_id = created["orderId"].as_str().unwrap();

    let response = app.get(&format!("/api/v1/orders/{}", order_id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["id"].as_str().unwrap(), order_id);
    assert_eq!(body["status"], "pending");
    let total: rust_decimal::Decimal = body["totalAmount"].as_str().unwrap().parse().unwrap();
    assert_eq!(total, dec!(20.00));
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body["paymentIntentId"].as_str().is_some());
}

#[tokio::test]
async fn missing_order_lookup_is_not_found() {
    let app = TestApp::new().await;
    let response = app.get(&format!("/api/v1/orders/{}", Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
