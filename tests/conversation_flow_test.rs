mod common;

use axum::http::{Method, StatusCode};
use dropshop_api::entities::order::{self, DeliveryMethod, OrderStatus, PaymentStatus};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn free_text_outside_a_flow_shows_the_menu() {
    let app = TestApp::new().await;

    let replies = app.send_text(7, "привет").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.starts_with("👋 Привет!"));

    let actions: Vec<&str> = replies[0]
        .buttons
        .iter()
        .map(|b| b.action.as_str())
        .collect();
    assert_eq!(actions, vec!["catalog", "my_orders", "info", "support"]);
}

#[tokio::test]
async fn full_pickup_flow_issues_a_payment_link() {
    let app = TestApp::new().await;
    let user = 7;

    let catalog = app.send_callback(user, "catalog").await;
    assert_eq!(catalog[0].text, "Выберите модель:");
    assert_eq!(catalog[0].buttons.len(), 5);
    assert_eq!(catalog[0].buttons[0].label, "Axis");
    assert_eq!(catalog[0].buttons[0].action, "model:1001");

    let card = app.send_callback(user, "model:1001").await;
    assert!(card[0].text.contains("Axis"));
    assert!(card[0].text.contains("Цена: 8990 ₽"));
    assert!(card[0].text.contains("Выберите цвет:"));
    assert_eq!(card[0].buttons[0].label, "белый/чёрный");
    assert_eq!(card[0].buttons[0].action, "color:0");
    assert_eq!(card[0].media.as_deref(), Some("axis1.jpg"));

    let sizes = app.send_callback(user, "color:0").await;
    assert_eq!(sizes[0].text, "Выберите размер:");
    assert!(sizes[0].buttons.iter().any(|b| b.action == "size:42"));

    let name_prompt = app.send_callback(user, "size:42").await;
    assert_eq!(name_prompt[0].text, "Отлично! Для оформления введите ФИО:");

    let phone_prompt = app.send_text(user, "Иван Иванов").await;
    assert!(phone_prompt[0].text.contains("Введите телефон"));

    let rejected = app.send_text(user, "12345").await;
    assert_eq!(rejected[0].text, "Некорректный формат. Пример: +79991234567");

    let delivery = app.send_text(user, "+79991234567").await;
    assert_eq!(delivery[0].text, "Выберите способ доставки:");
    let actions: Vec<&str> = delivery[0]
        .buttons
        .iter()
        .map(|b| b.action.as_str())
        .collect();
    assert_eq!(actions, vec!["delivery:pickup", "delivery:courier"]);

    let address_prompt = app.send_callback(user, "delivery:pickup").await;
    assert!(address_prompt[0].text.contains("пункта выдачи"));

    let review = app.send_text(user, "Москва, ул. Тверская, 1").await;
    assert!(review[0].text.starts_with("Проверьте данные:"));
    assert!(review[0].text.contains("Модель: Axis"));
    assert!(review[0].text.contains("белый/чёрный / 42"));
    assert!(review[0].text.contains("ФИО: Иван Иванов"));
    assert!(review[0].text.contains("Телефон: +79991234567"));
    assert!(review[0].text.contains("Доставка: пункт выдачи"));
    assert!(review[0].text.contains("Цена к оплате: 8990 ₽"));
    assert_eq!(review[0].buttons[0].action, "confirm");

    let confirmed = app.send_callback(user, "confirm").await;
    assert_eq!(confirmed.len(), 2);
    assert!(confirmed[0].text.contains("Перейдите к оплате по ссылке (8990 ₽)"));
    assert!(confirmed[1].text.contains("После успешной оплаты"));

    let stored = order::Entity::find()
        .one(&*app.state.db)
        .await
        .expect("query orders")
        .expect("order stored");
    assert_eq!(stored.user_id, user);
    assert_eq!(stored.product_id, 1001);
    assert_eq!(stored.color, "белый/чёрный");
    assert_eq!(stored.size, 42);
    assert_eq!(stored.delivery_method, DeliveryMethod::PickupPoint);
    assert_eq!(stored.city, "Москва, ул. Тверская, 1");
    assert_eq!(stored.address, "Москва, ул. Тверская, 1");
    assert_eq!(stored.pickup_point.as_deref(), Some("Москва, ул. Тверская, 1"));
    assert_eq!(stored.status, OrderStatus::WaitingPayment);
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(stored.amount, 8990);
    assert_eq!(stored.invoice_id, Some(stored.id));

    let link = stored.payment_url.expect("payment link persisted");
    assert!(link.starts_with("https://auth.robokassa.ru/Merchant/Index.aspx?"));
    assert!(link.contains("OutSum=8990"));
    assert!(link.contains(&format!("InvId={}", stored.id)));
    assert!(link.contains("IsTest=1"));
    assert!(confirmed[0].text.contains(&link));
}

#[tokio::test]
async fn courier_flow_stores_address_and_optional_comment() {
    let app = TestApp::new().await;

    // First buyer leaves a courier comment
    let user = 71;
    app.send_callback(user, "catalog").await;
    app.send_callback(user, "model:1002").await;
    app.send_callback(user, "color:1").await;
    app.send_callback(user, "size:41").await;
    app.send_text(user, "Пётр Петров").await;
    app.send_text(user, "89991234567").await;

    let address_prompt = app.send_callback(user, "delivery:courier").await;
    assert_eq!(address_prompt[0].text, "Введите адрес доставки:");

    let comment_prompt = app.send_text(user, "Казань, ул. Баумана, 5, кв. 12").await;
    assert!(comment_prompt[0].text.contains("Комментарий для курьера"));

    let review = app.send_text(user, "Позвонить за час").await;
    assert!(review[0].text.contains("Доставка: курьер"));
    app.send_callback(user, "confirm").await;

    let stored = order::Entity::find()
        .filter(order::Column::UserId.eq(user))
        .one(&*app.state.db)
        .await
        .expect("query orders")
        .expect("courier order stored");
    assert_eq!(stored.delivery_method, DeliveryMethod::Courier);
    assert_eq!(stored.city, "Казань, ул. Баумана, 5, кв. 12");
    assert_eq!(stored.address, "Казань, ул. Баумана, 5, кв. 12");
    assert_eq!(stored.pickup_point, None);
    assert_eq!(stored.courier_comment.as_deref(), Some("Позвонить за час"));

    // Second buyer declines the comment with a dash
    let user = 72;
    app.send_callback(user, "catalog").await;
    app.send_callback(user, "model:1002").await;
    app.send_callback(user, "color:1").await;
    app.send_callback(user, "size:41").await;
    app.send_text(user, "Анна Сидорова").await;
    app.send_text(user, "+79995554433").await;
    app.send_callback(user, "delivery:courier").await;
    app.send_text(user, "Тула, пр. Ленина, 10").await;
    app.send_text(user, "-").await;
    app.send_callback(user, "confirm").await;

    let stored = order::Entity::find()
        .filter(order::Column::UserId.eq(user))
        .one(&*app.state.db)
        .await
        .expect("query orders")
        .expect("dash order stored");
    assert_eq!(stored.courier_comment, None);
}

#[tokio::test]
async fn invalid_input_reprompts_without_advancing() {
    let app = TestApp::new().await;
    let user = 7;

    app.send_callback(user, "catalog").await;
    app.send_callback(user, "model:1001").await;
    app.send_callback(user, "color:0").await;

    // Unknown token and an out-of-run size both re-prompt the size step
    let reprompt = app.send_callback(user, "bogus").await;
    assert_eq!(reprompt[0].text, "Выберите размер кнопкой.");
    let reprompt = app.send_callback(user, "size:99").await;
    assert_eq!(reprompt[0].text, "Выберите размер кнопкой.");

    app.send_callback(user, "size:42").await;

    // Blank name is not a name
    let reprompt = app.send_text(user, "   ").await;
    assert_eq!(reprompt[0].text, "Введите ФИО:");

    // Confirming out of order re-prompts instead of creating anything
    let reprompt = app.send_callback(user, "confirm").await;
    assert_eq!(reprompt[0].text, "Введите ФИО:");

    let count = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count orders");
    assert_eq!(count, 0, "no order may exist before a reviewed confirm");
}

#[tokio::test]
async fn stale_model_button_reopens_the_catalog() {
    let app = TestApp::new().await;

    let replies = app.send_callback(7, "model:9999").await;
    assert_eq!(replies[0].text, "Выберите модель:");
}

#[tokio::test]
async fn reopening_the_catalog_discards_the_collected_draft() {
    let app = TestApp::new().await;
    let user = 7;

    app.send_callback(user, "catalog").await;
    app.send_callback(user, "model:1001").await;
    app.send_callback(user, "color:0").await;
    app.send_callback(user, "size:42").await;
    app.send_text(user, "Иван Иванов").await;
    app.send_text(user, "+79991234567").await;
    app.send_callback(user, "delivery:pickup").await;
    let review = app.send_text(user, "Москва, ул. Тверская, 1").await;
    assert!(review[0].text.starts_with("Проверьте данные:"));

    // Starting over wipes the reviewed draft
    app.send_callback(user, "catalog").await;
    let reprompt = app.send_callback(user, "confirm").await;
    assert_eq!(reprompt[0].text, "Выберите модель кнопкой из списка.");

    let count = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count orders");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn info_and_support_answer_from_configuration() {
    let app = TestApp::new().await;

    let info = app.send_callback(7, "info").await;
    assert!(info[0].text.contains("всего 300 пар"));
    assert!(info[0].text.contains("8990 ₽"));

    let support = app.send_callback(7, "support").await;
    assert_eq!(support[0].text, "Напишите оператору: @dropshop_support");
}

#[tokio::test]
async fn my_orders_lists_recent_orders_with_status() {
    let app = TestApp::new().await;
    let user = 7;

    let empty = app.send_callback(user, "my_orders").await;
    assert_eq!(empty[0].text, "У вас пока нет заказов.");

    let placed = app.place_order(user).await;

    let listed = app.send_callback(user, "my_orders").await;
    assert!(listed[0].text.starts_with("Ваши последние заказы:"));
    assert!(listed[0]
        .text
        .contains(&format!("• №{}: 🕓 Ожидание оплаты", placed.id)));
}

#[tokio::test]
async fn chat_update_requires_text_or_callback() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/chat/update",
            Some(json!({ "user_id": 7 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
