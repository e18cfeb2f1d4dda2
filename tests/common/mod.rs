use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use dropshop_api::{
    app_router, build_state,
    chat::{ChatSink, OutboundMessage},
    config::AppConfig,
    db,
    entities::order,
    errors::ServiceError,
    events,
    services::PaymentLinkService,
    AppState,
};

/// Chat sink that records every delivered message for assertions.
#[derive(Debug, Default)]
pub struct RecordingChatSink {
    delivered: Mutex<Vec<OutboundMessage>>,
}

impl RecordingChatSink {
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().expect("sink lock poisoned").clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().expect("sink lock poisoned").len()
    }

    /// Waits until at least `count` messages arrived; delivery happens on a
    /// spawned task, so assertions must not race it.
    #[allow(dead_code)]
    pub async fn wait_for(&self, count: usize) -> bool {
        for _ in 0..100 {
            if self.delivered_count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.delivered_count() >= count
    }
}

#[async_trait]
impl ChatSink for RecordingChatSink {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ServiceError> {
        self.delivered
            .lock()
            .expect("sink lock poisoned")
            .push(message);
        Ok(())
    }
}

/// Helper harness spinning up the full application over a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub sink: Arc<RecordingChatSink>,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application after adjusting the configuration.
    pub async fn with_config<F>(mutate: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("dropshop_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment.password1 = "test-link-secret".to_string();
        cfg.payment.password2 = "test-result-secret".to_string();
        mutate(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let sink = Arc::new(RecordingChatSink::default());
        let sink_dyn: Arc<dyn ChatSink> = sink.clone();

        let (state, event_rx) =
            build_state(cfg, Arc::new(pool), sink_dyn).expect("failed to build app state");
        let event_task = tokio::spawn(events::process_events(event_rx));

        state
            .catalog
            .seed_if_empty(state.config.price_rub)
            .await
            .expect("failed to seed test catalog");

        let router = app_router(state.clone());

        Self {
            router,
            state,
            sink,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Send a request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Feed one callback token through the chat endpoint and return the replies.
    pub async fn send_callback(&self, user_id: i64, callback: &str) -> Vec<OutboundMessage> {
        let response = self
            .request(
                Method::POST,
                "/api/v1/chat/update",
                Some(json!({ "user_id": user_id, "callback": callback })),
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "chat update for callback {callback:?}"
        );
        replies(response).await
    }

    /// Feed one free-text message through the chat endpoint and return the replies.
    pub async fn send_text(&self, user_id: i64, text: &str) -> Vec<OutboundMessage> {
        let response = self
            .request(
                Method::POST,
                "/api/v1/chat/update",
                Some(json!({ "user_id": user_id, "text": text })),
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "chat update for text {text:?}"
        );
        replies(response).await
    }

    /// Drive one buyer through the whole conversation to an issued payment
    /// link and return the stored order.
    #[allow(dead_code)]
    pub async fn place_order(&self, user_id: i64) -> order::Model {
        self.send_callback(user_id, "catalog").await;
        self.send_callback(user_id, "model:1001").await;
        self.send_callback(user_id, "color:0").await;
        self.send_callback(user_id, "size:42").await;
        self.send_text(user_id, "Иван Иванов").await;
        self.send_text(user_id, "+79991234567").await;
        self.send_callback(user_id, "delivery:pickup").await;
        self.send_text(user_id, "Москва, ул. Тверская, 1").await;

        let confirmation = self.send_callback(user_id, "confirm").await;
        assert!(
            confirmation[0].text.contains("Перейдите к оплате"),
            "expected a payment link, got: {}",
            confirmation[0].text
        );

        self.state
            .orders
            .list_for_user(user_id)
            .await
            .expect("list orders for test user")
            .into_iter()
            .next()
            .expect("order stored after confirmation")
    }

    /// Provider-side result signature over the raw OutSum string.
    #[allow(dead_code)]
    pub fn result_signature(&self, out_sum: &str, invoice_id: i64) -> String {
        PaymentLinkService::from_config(&self.state.config.payment)
            .expect("payment config valid in tests")
            .sign_result(out_sum, invoice_id)
    }

    /// Deliver a payment provider result callback.
    #[allow(dead_code)]
    pub async fn payment_result(&self, query: &str) -> Response {
        let uri = format!("/robokassa/result?{}", query);
        self.request(Method::GET, &uri, None).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Extract the engine replies from a chat update response.
pub async fn replies(response: Response) -> Vec<OutboundMessage> {
    let value = response_json(response).await;
    let messages = value
        .get("messages")
        .cloned()
        .expect("messages field in chat reply");
    serde_json::from_value(messages).expect("decode reply messages")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

#[allow(dead_code)]
pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 response body")
}
