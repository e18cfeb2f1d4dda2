use crate::{
    chat::{Button, OutboundMessage},
    crm::CrmClient,
    entities::order::{DeliveryMethod, OrderStatus},
    errors::ServiceError,
    services::{CatalogService, CheckoutDraft, CheckoutService, FinalizeOutcome, OrderService},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, instrument};

use super::session::{ConversationState, Session, SessionStore};

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\+7|8)\d{10}$").unwrap());

/// Drives the order-collection conversation
///
/// Consumes free text or opaque callback tokens for one user at a time and
/// produces the outbound prompts for the transport to render. All durable
/// effects go through `CheckoutService`; everything else lives in the
/// session store.
pub struct ConversationEngine {
    sessions: SessionStore,
    catalog: Arc<CatalogService>,
    orders: Arc<OrderService>,
    checkout: Arc<CheckoutService>,
    crm: Option<Arc<CrmClient>>,
    support_contact: String,
    drop_limit: u64,
    price_rub: i64,
}

impl ConversationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<CatalogService>,
        orders: Arc<OrderService>,
        checkout: Arc<CheckoutService>,
        crm: Option<Arc<CrmClient>>,
        support_contact: String,
        drop_limit: u64,
        price_rub: i64,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            catalog,
            orders,
            checkout,
            crm,
            support_contact,
            drop_limit,
            price_rub,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles a free-text message from a user
    #[instrument(skip(self, text), fields(user_id))]
    pub async fn handle_text(
        &self,
        user_id: i64,
        text: &str,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        let mut session = self.sessions.get(user_id);
        let input = text.trim();

        let replies = match session.state {
            ConversationState::EnterName => {
                if input.is_empty() {
                    vec![self.prompt(user_id, ConversationState::EnterName)]
                } else {
                    session.full_name = Some(input.to_string());
                    session.state = ConversationState::EnterPhone;
                    vec![self.prompt(user_id, ConversationState::EnterPhone)]
                }
            }
            ConversationState::EnterPhone => {
                if PHONE_RE.is_match(input) {
                    session.phone = Some(input.to_string());
                    session.state = ConversationState::ChooseDelivery;
                    vec![self.delivery_choice(user_id)]
                } else {
                    vec![OutboundMessage::text(
                        user_id,
                        "Некорректный формат. Пример: +79991234567",
                    )]
                }
            }
            ConversationState::EnterPickupAddress => {
                if input.is_empty() {
                    vec![self.prompt(user_id, ConversationState::EnterPickupAddress)]
                } else {
                    // One combined city+address line; the pickup point is the
                    // same line.
                    session.city = Some(input.to_string());
                    session.address = Some(input.to_string());
                    session.pickup_point = Some(input.to_string());
                    self.advance_to_review(user_id, &mut session).await?
                }
            }
            ConversationState::EnterCourierAddress => {
                if input.is_empty() {
                    vec![self.prompt(user_id, ConversationState::EnterCourierAddress)]
                } else {
                    session.city = Some(input.to_string());
                    session.address = Some(input.to_string());
                    session.state = ConversationState::EnterCourierComment;
                    vec![self.prompt(user_id, ConversationState::EnterCourierComment)]
                }
            }
            ConversationState::EnterCourierComment => {
                session.courier_comment = if input == "-" {
                    None
                } else {
                    Some(input.to_string())
                };
                self.advance_to_review(user_id, &mut session).await?
            }
            _ => self.greeting(user_id),
        };

        self.sessions.put(user_id, session);
        Ok(replies)
    }

    /// Handles a structured callback token from a user
    #[instrument(skip(self), fields(user_id, action))]
    pub async fn handle_callback(
        &self,
        user_id: i64,
        action: &str,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        match action {
            "order" | "catalog" => return self.open_catalog(user_id).await,
            "my_orders" => return self.my_orders(user_id).await,
            "info" => {
                return Ok(vec![OutboundMessage::text(
                    user_id,
                    format!(
                        "Первая коллекция нашего дропа.\n\
                         Лимитированный выпуск: всего {} пар.\n\
                         Современные повседневные кроссовки по цене {} ₽ \
                         (доставка включена).\nДоставка по России.",
                        self.drop_limit, self.price_rub
                    ),
                )]);
            }
            "support" => {
                return Ok(vec![OutboundMessage::text(
                    user_id,
                    format!("Напишите оператору: {}", self.support_contact),
                )]);
            }
            "confirm" => return self.confirm_order(user_id).await,
            _ => {}
        }

        if let Some((kind, value)) = action.split_once(':') {
            match kind {
                "model" => {
                    if let Ok(product_id) = value.parse::<i32>() {
                        return self.select_model(user_id, product_id).await;
                    }
                }
                "color" => {
                    if let Ok(index) = value.parse::<usize>() {
                        return self.pick_color(user_id, index).await;
                    }
                }
                "size" => {
                    if let Ok(size) = value.parse::<i32>() {
                        return self.pick_size(user_id, size).await;
                    }
                }
                "delivery" => return self.choose_delivery(user_id, value).await,
                _ => {}
            }
        }

        let state = self.sessions.get(user_id).state;
        Ok(vec![self.prompt(user_id, state)])
    }

    /// Opens the catalog: advisory admission check, then a fresh session
    ///
    /// Re-opening mid-flow discards every collected field. The check here is
    /// only a courtesy; finalize re-checks authoritatively.
    async fn open_catalog(&self, user_id: i64) -> Result<Vec<OutboundMessage>, ServiceError> {
        if !self.orders.admission_open().await? {
            return Ok(vec![OutboundMessage::text(
                user_id,
                format!(
                    "❌ Предзаказ закрыт: лимит дропа ({} пар) достигнут.",
                    self.drop_limit
                ),
            )]);
        }

        let products = self.catalog.list().await?;
        if products.is_empty() {
            return Ok(vec![OutboundMessage::text(
                user_id,
                "Каталог пуст. Загляните позже.",
            )]);
        }

        let mut session = self.sessions.reset(user_id);
        session.state = ConversationState::SelectProduct;
        self.sessions.put(user_id, session);

        let buttons = products
            .iter()
            .map(|p| Button::new(&p.name, format!("model:{}", p.id)))
            .collect();
        Ok(vec![
            OutboundMessage::text(user_id, "Выберите модель:").with_buttons(buttons),
        ])
    }

    /// Shows the product card with its color variants
    async fn select_model(
        &self,
        user_id: i64,
        product_id: i32,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        let Some(product) = self.catalog.get(product_id).await? else {
            return self.open_catalog(user_id).await;
        };

        let mut session = self.sessions.get(user_id);
        session.model_id = Some(product.id);
        session.variant_index = 0;
        session.state = ConversationState::SelectColor;
        self.sessions.put(user_id, session);

        let variants = product.variant_list();
        let price = if product.price > 0 {
            product.price
        } else {
            self.price_rub
        };

        let mut card = OutboundMessage::text(
            user_id,
            format!(
                "{}\n{}\nЦена: {} ₽\n\nВыберите цвет:",
                product.name, product.description, price
            ),
        )
        .with_buttons(
            variants
                .iter()
                .enumerate()
                .map(|(index, v)| Button::new(&v.color, format!("color:{}", index)))
                .collect(),
        );
        if let Some(first) = variants.first() {
            card = card.with_media(&first.image);
        }

        Ok(vec![card])
    }

    /// Commits a color variant and asks for the size
    async fn pick_color(
        &self,
        user_id: i64,
        index: usize,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        let mut session = self.sessions.get(user_id);
        let Some(model_id) = session.model_id else {
            return self.open_catalog(user_id).await;
        };
        let Some(product) = self.catalog.get(model_id).await? else {
            return self.open_catalog(user_id).await;
        };

        let variants = product.variant_list();
        let Some(variant) = variants.get(index) else {
            return Ok(vec![self.prompt(user_id, ConversationState::SelectColor)]);
        };

        session.variant_index = index;
        session.product_id = Some(product.id);
        session.color = Some(variant.color.clone());
        session.state = ConversationState::SelectSize;
        self.sessions.put(user_id, session);

        let sizes = available_sizes(&product.size_list());
        let reply = OutboundMessage::text(user_id, "Выберите размер:")
            .with_buttons(
                sizes
                    .iter()
                    .map(|size| Button::new(size.to_string(), format!("size:{}", size)))
                    .collect(),
            )
            .with_media(&variant.image);

        Ok(vec![reply])
    }

    /// Commits a size and starts contact collection
    async fn pick_size(
        &self,
        user_id: i64,
        size: i32,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        let mut session = self.sessions.get(user_id);
        let Some(product_id) = session.product_id else {
            return self.open_catalog(user_id).await;
        };
        let Some(product) = self.catalog.get(product_id).await? else {
            return self.open_catalog(user_id).await;
        };

        if !available_sizes(&product.size_list()).contains(&size) {
            return Ok(vec![self.prompt(user_id, ConversationState::SelectSize)]);
        }

        session.size = Some(size);
        session.state = ConversationState::EnterName;
        self.sessions.put(user_id, session);

        Ok(vec![OutboundMessage::text(
            user_id,
            "Отлично! Для оформления введите ФИО:",
        )])
    }

    /// Commits a delivery method and asks for its address fields
    async fn choose_delivery(
        &self,
        user_id: i64,
        method: &str,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        let mut session = self.sessions.get(user_id);
        if session.state != ConversationState::ChooseDelivery {
            let state = session.state;
            return Ok(vec![self.prompt(user_id, state)]);
        }

        let reply = match method {
            "pickup" => {
                session.delivery_method = Some(DeliveryMethod::PickupPoint);
                session.state = ConversationState::EnterPickupAddress;
                self.prompt(user_id, ConversationState::EnterPickupAddress)
            }
            "courier" => {
                session.delivery_method = Some(DeliveryMethod::Courier);
                session.state = ConversationState::EnterCourierAddress;
                self.prompt(user_id, ConversationState::EnterCourierAddress)
            }
            _ => return Ok(vec![self.delivery_choice(user_id)]),
        };

        self.sessions.put(user_id, session);
        Ok(vec![reply])
    }

    /// Finalizes the reviewed draft into a stored order with a payment link
    async fn confirm_order(&self, user_id: i64) -> Result<Vec<OutboundMessage>, ServiceError> {
        let mut session = self.sessions.get(user_id);
        if session.state != ConversationState::Review {
            let state = session.state;
            return Ok(vec![self.prompt(user_id, state)]);
        }

        let Some(draft) = draft_from(&session, user_id) else {
            self.sessions.reset(user_id);
            return Ok(vec![self.session_expired(user_id)]);
        };

        match self.checkout.finalize_order(draft).await? {
            FinalizeOutcome::Created { order } => {
                session.state = ConversationState::PaymentLinkIssued;
                session.draft_order_id = Some(order.id);
                self.sessions.put(user_id, session);

                info!(user_id, order_id = order.id, "Payment link issued");
                let link = order.payment_url.as_deref().unwrap_or_default();
                Ok(vec![
                    OutboundMessage::text(
                        user_id,
                        format!("Перейдите к оплате по ссылке ({} ₽):\n{}", order.amount, link),
                    ),
                    OutboundMessage::text(
                        user_id,
                        "После успешной оплаты вы получите подтверждение здесь. Спасибо!",
                    ),
                ])
            }
            FinalizeOutcome::AdmissionClosed => Ok(vec![OutboundMessage::text(
                user_id,
                format!(
                    "❌ Предзаказ закрыт: достигнут лимит {} пар.",
                    self.drop_limit
                ),
            )]),
            FinalizeOutcome::SessionExpired => {
                self.sessions.reset(user_id);
                Ok(vec![self.session_expired(user_id)])
            }
        }
    }

    /// Order history with CRM status projection
    ///
    /// Orders carrying a lead id show the CRM pipeline stage mapped back onto
    /// the lifecycle; the stored status is the fallback.
    async fn my_orders(&self, user_id: i64) -> Result<Vec<OutboundMessage>, ServiceError> {
        let orders = self.orders.list_for_user(user_id).await?;
        if orders.is_empty() {
            return Ok(vec![OutboundMessage::text(user_id, "У вас пока нет заказов.")]);
        }

        let mut lines = String::from("Ваши последние заказы:\n");
        for order in &orders {
            let mut status = order.status;
            if let (Some(crm), Some(lead_id)) = (&self.crm, order.crm_lead_id) {
                if let Some(external) = crm.fetch_status(lead_id).await {
                    status = external;
                }
            }
            lines.push_str(&format!("• №{}: {}\n", order.id, status_label(&status)));
        }

        Ok(vec![OutboundMessage::text(user_id, lines)])
    }

    /// Builds the review summary and moves the session onto it
    async fn advance_to_review(
        &self,
        user_id: i64,
        session: &mut Session,
    ) -> Result<Vec<OutboundMessage>, ServiceError> {
        let Some(product_id) = session.product_id else {
            *session = Session::default();
            return Ok(vec![self.session_expired(user_id)]);
        };
        let Some(product) = self.catalog.get(product_id).await? else {
            *session = Session::default();
            return Ok(vec![self.session_expired(user_id)]);
        };

        let price = if product.price > 0 {
            product.price
        } else {
            self.price_rub
        };
        let delivery = match session.delivery_method {
            Some(DeliveryMethod::PickupPoint) => "пункт выдачи",
            Some(DeliveryMethod::Courier) => "курьер",
            None => {
                *session = Session::default();
                return Ok(vec![self.session_expired(user_id)]);
            }
        };

        let text = format!(
            "Проверьте данные:\n\
             • Модель: {}\n\
             • Цвет/размер: {} / {}\n\
             • ФИО: {}\n\
             • Телефон: {}\n\
             • Доставка: {}\n\
             • Адрес: {}\n\
             Цена к оплате: {} ₽",
            product.name,
            session.color.as_deref().unwrap_or("-"),
            session.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            session.full_name.as_deref().unwrap_or("-"),
            session.phone.as_deref().unwrap_or("-"),
            delivery,
            session.address.as_deref().unwrap_or("-"),
            price
        );

        session.state = ConversationState::Review;
        Ok(vec![OutboundMessage::text(user_id, text)
            .with_buttons(vec![Button::new("Оформить предзаказ ✅", "confirm")])])
    }

    fn delivery_choice(&self, user_id: i64) -> OutboundMessage {
        OutboundMessage::text(user_id, "Выберите способ доставки:").with_buttons(vec![
            Button::new("Пункт выдачи", "delivery:pickup"),
            Button::new("Курьер", "delivery:courier"),
        ])
    }

    fn greeting(&self, user_id: i64) -> Vec<OutboundMessage> {
        vec![OutboundMessage::text(
            user_id,
            "👋 Привет! Добро пожаловать в магазин первого дропа.\nВыберите действие:",
        )
        .with_buttons(vec![
            Button::new("👟 Каталог", "catalog"),
            Button::new("📦 Мои заказы", "my_orders"),
            Button::new("ℹ️ О коллекции", "info"),
            Button::new("💬 Поддержка", "support"),
        ])
        .with_media("hero.jpg")]
    }

    fn session_expired(&self, user_id: i64) -> OutboundMessage {
        OutboundMessage::text(user_id, "Сессия истекла. Начните заново: «Каталог».")
    }

    /// Re-prompt for whichever state the user is stuck in
    fn prompt(&self, user_id: i64, state: ConversationState) -> OutboundMessage {
        let text = match state {
            ConversationState::Idle => {
                return self.greeting(user_id).remove(0);
            }
            ConversationState::SelectProduct => "Выберите модель кнопкой из списка.",
            ConversationState::SelectColor => "Выберите цвет кнопкой под карточкой.",
            ConversationState::SelectSize => "Выберите размер кнопкой.",
            ConversationState::EnterName => "Введите ФИО:",
            ConversationState::EnterPhone => {
                "Введите телефон в формате +7XXXXXXXXXX или 8XXXXXXXXXX:"
            }
            ConversationState::ChooseDelivery => "Выберите способ доставки кнопкой.",
            ConversationState::EnterPickupAddress => {
                "Введите город и адрес пункта выдачи (одной строкой):"
            }
            ConversationState::EnterCourierAddress => "Введите адрес доставки:",
            ConversationState::EnterCourierComment => "Комментарий для курьера (или «-»):",
            ConversationState::Review => "Проверьте данные и нажмите «Оформить предзаказ ✅».",
            ConversationState::PaymentLinkIssued => {
                "Ссылка на оплату уже отправлена. После оплаты придёт подтверждение."
            }
        };
        OutboundMessage::text(user_id, text)
    }
}

/// Size run shown to the buyer; the built-in run covers catalogs listed
/// without one
fn available_sizes(listed: &[i32]) -> Vec<i32> {
    if listed.is_empty() {
        (39..=46).collect()
    } else {
        listed.to_vec()
    }
}

fn status_label(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::WaitingPayment => "🕓 Ожидание оплаты",
        OrderStatus::PaidAccepted => "💰 Оплачено, заказ принят",
        OrderStatus::Preparing => "📦 Готовится к отправке",
        OrderStatus::Shipped => "🚚 Отправлен",
        OrderStatus::Delivered => "✅ Доставлен",
    }
}

/// Assembles the checkout draft; `None` when any required field is missing
fn draft_from(session: &Session, user_id: i64) -> Option<CheckoutDraft> {
    Some(CheckoutDraft {
        user_id,
        product_id: session.product_id?,
        color: session.color.clone()?,
        size: session.size?,
        delivery_method: session.delivery_method?,
        city: session.city.clone()?,
        address: session.address.clone()?,
        pickup_point: session.pickup_point.clone(),
        courier_comment: session.courier_comment.clone(),
        full_name: session.full_name.clone()?,
        phone: session.phone.clone()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("+79991234567", true)]
    #[case("89991234567", true)]
    #[case("9991234567", false)]
    #[case("+7999123456", false)]
    #[case("+799912345678", false)]
    #[case("+7999123456a", false)]
    #[case("8 999 123 45 67", false)]
    fn phone_pattern_matches_contract(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(PHONE_RE.is_match(input), valid);
    }

    #[test]
    fn draft_requires_every_collected_field() {
        let mut session = Session {
            product_id: Some(1001),
            color: Some("белый".into()),
            size: Some(42),
            delivery_method: Some(DeliveryMethod::Courier),
            city: Some("Москва".into()),
            address: Some("ул. Ленина, 1".into()),
            full_name: Some("Иван Иванов".into()),
            phone: Some("+79991234567".into()),
            ..Session::default()
        };
        assert!(draft_from(&session, 7).is_some());

        session.phone = None;
        assert!(draft_from(&session, 7).is_none());
    }

    #[test]
    fn optional_draft_fields_stay_optional() {
        let session = Session {
            product_id: Some(1001),
            color: Some("белый".into()),
            size: Some(42),
            delivery_method: Some(DeliveryMethod::PickupPoint),
            city: Some("Казань, ул. Баумана, 1".into()),
            address: Some("Казань, ул. Баумана, 1".into()),
            pickup_point: Some("Казань, ул. Баумана, 1".into()),
            full_name: Some("Иван Иванов".into()),
            phone: Some("89991234567".into()),
            ..Session::default()
        };
        let draft = draft_from(&session, 7).unwrap();
        assert!(draft.courier_comment.is_none());
        assert_eq!(draft.pickup_point.as_deref(), Some("Казань, ул. Баумана, 1"));
    }

    #[test]
    fn built_in_size_run_backs_empty_listings() {
        assert_eq!(available_sizes(&[]), vec![39, 40, 41, 42, 43, 44, 45, 46]);
        assert_eq!(available_sizes(&[40, 41]), vec![40, 41]);
    }

    #[test]
    fn status_labels_cover_the_lifecycle() {
        assert_eq!(status_label(&OrderStatus::WaitingPayment), "🕓 Ожидание оплаты");
        assert_eq!(status_label(&OrderStatus::Delivered), "✅ Доставлен");
    }
}
