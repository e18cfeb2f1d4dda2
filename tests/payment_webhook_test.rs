mod common;

use axum::http::{Method, StatusCode};
use dropshop_api::entities::order::{self, OrderStatus, PaymentStatus};
use sea_orm::EntityTrait;
use std::time::Duration;

use common::{response_text, TestApp};

#[tokio::test]
async fn missing_parameters_are_bad_params() {
    let app = TestApp::new().await;

    for query in [
        "",
        "OutSum=8990",
        "OutSum=8990&InvId=1",
        "InvId=1&SignatureValue=deadbeef",
        "OutSum=8990&InvId=notanumber&SignatureValue=deadbeef",
    ] {
        let response = app.payment_result(query).await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "query {query:?}"
        );
        assert_eq!(response_text(response).await, "Bad params");
    }
}

#[tokio::test]
async fn tampered_signature_changes_nothing() {
    let app = TestApp::new().await;
    let placed = app.place_order(7).await;

    // Garbage signature
    let response = app
        .payment_result(&format!(
            "OutSum=8990&InvId={}&SignatureValue=deadbeef",
            placed.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_text(response).await, "Invalid signature");

    // Signature valid for a different amount
    let wrong = app.result_signature("1", placed.id);
    let response = app
        .payment_result(&format!(
            "OutSum=8990&InvId={}&SignatureValue={}",
            placed.id, wrong
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_text(response).await, "Invalid signature");

    let stored = order::Entity::find_by_id(placed.id)
        .one(&*app.state.db)
        .await
        .expect("query order")
        .expect("order exists");
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(stored.status, OrderStatus::WaitingPayment);
    assert_eq!(app.sink.delivered_count(), 0);
}

#[tokio::test]
async fn valid_signature_for_unknown_invoice_is_not_found() {
    let app = TestApp::new().await;

    let signature = app.result_signature("8990", 424_242);
    let response = app
        .payment_result(&format!(
            "OutSum=8990&InvId=424242&SignatureValue={}",
            signature
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_text(response).await, "Unknown invoice");
}

#[tokio::test]
async fn valid_confirmation_marks_the_order_paid_and_notifies_once() {
    let app = TestApp::new().await;
    let placed = app.place_order(7).await;

    let signature = app.result_signature("8990", placed.id);
    let response = app
        .payment_result(&format!(
            "OutSum=8990&InvId={}&SignatureValue={}",
            placed.id, signature
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, format!("OK{}", placed.id));

    let stored = order::Entity::find_by_id(placed.id)
        .one(&*app.state.db)
        .await
        .expect("query order")
        .expect("order exists");
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::PaidAccepted);

    // Notification delivery runs on a spawned task
    assert!(app.sink.wait_for(1).await, "payment notification delivered");
    let delivered = app.sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].user_id, 7);
    assert!(delivered[0].text.contains("✅ Оплата получена!"));
    assert!(delivered[0].text.contains(&format!("№{}", placed.id)));
}

#[tokio::test]
async fn replayed_confirmation_acknowledges_without_side_effects() {
    let app = TestApp::new().await;
    let placed = app.place_order(7).await;

    let signature = app.result_signature("8990", placed.id);
    let query = format!(
        "OutSum=8990&InvId={}&SignatureValue={}",
        placed.id, signature
    );

    let first = app.payment_result(&query).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(app.sink.wait_for(1).await, "first confirmation notifies");

    let after_first = order::Entity::find_by_id(placed.id)
        .one(&*app.state.db)
        .await
        .expect("query order")
        .expect("order exists");

    let replay = app.payment_result(&query).await;
    assert_eq!(replay.status(), StatusCode::OK);
    assert_eq!(response_text(replay).await, format!("OK{}", placed.id));

    // Give a would-be duplicate notification time to surface
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.sink.delivered_count(), 1, "no duplicate notification");

    let after_replay = order::Entity::find_by_id(placed.id)
        .one(&*app.state.db)
        .await
        .expect("query order")
        .expect("order exists");
    assert_eq!(after_replay, after_first, "replay must not touch the row");
}

#[tokio::test]
async fn uppercase_signature_is_accepted() {
    let app = TestApp::new().await;
    let placed = app.place_order(7).await;

    let signature = app.result_signature("8990", placed.id).to_ascii_uppercase();
    let response = app
        .payment_result(&format!(
            "OutSum=8990&InvId={}&SignatureValue={}",
            placed.id, signature
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn amount_string_is_verified_as_sent_without_normalization() {
    let app = TestApp::new().await;
    let placed = app.place_order(7).await;

    // The provider formats the amount its own way; the signature covers that
    // exact string
    let signature = app.result_signature("8990.000000", placed.id);
    let response = app
        .payment_result(&format!(
            "OutSum=8990.000000&InvId={}&SignatureValue={}",
            placed.id, signature
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, format!("OK{}", placed.id));
}

#[tokio::test]
async fn sha256_shop_configuration_verifies_sha256_results() {
    let app = TestApp::with_config(|cfg| {
        cfg.payment.signature_alg = "SHA256".to_string();
    })
    .await;
    let placed = app.place_order(7).await;

    let signature = app.result_signature("8990", placed.id);
    assert_eq!(signature.len(), 64);

    let response = app
        .payment_result(&format!(
            "OutSum=8990&InvId={}&SignatureValue={}",
            placed.id, signature
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn landing_pages_render_plain_text() {
    let app = TestApp::new().await;

    let success = app.request(Method::GET, "/robokassa/success", None).await;
    assert_eq!(success.status(), StatusCode::OK);
    assert!(response_text(success).await.contains("Оплата принята"));

    let fail = app.request(Method::GET, "/robokassa/fail", None).await;
    assert_eq!(fail.status(), StatusCode::OK);
    assert!(response_text(fail).await.contains("не прошла"));
}
