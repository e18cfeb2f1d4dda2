//! Dropshop API Library
//!
//! Conversational preorder service for a limited sneaker drop: the
//! conversation engine collects an order over chat updates, admission control
//! caps the drop, and the payment provider confirms payment through a signed
//! server-to-server callback.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod chat;
pub mod config;
pub mod conversation;
pub mod crm;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::chat::ChatSink;
use crate::config::AppConfig;
use crate::conversation::ConversationEngine;
use crate::crm::CrmClient;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{CatalogService, CheckoutService, OrderService, PaymentLinkService};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub engine: Arc<ConversationEngine>,
}

/// Wires services, the conversation engine, and the shared state
///
/// Returns the receiving end of the event channel alongside the state; the
/// caller decides where `events::process_events` runs.
pub fn build_state(
    config: AppConfig,
    db: Arc<DbPool>,
    chat_sink: Arc<dyn ChatSink>,
) -> Result<(Arc<AppState>, mpsc::Receiver<Event>), ServiceError> {
    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    let event_sender = Arc::new(EventSender::new(tx));

    let catalog = Arc::new(CatalogService::new(Arc::clone(&db)));
    let orders = Arc::new(OrderService::new(
        Arc::clone(&db),
        Arc::clone(&event_sender),
        config.drop_limit,
    ));
    let payments = Arc::new(PaymentLinkService::from_config(&config.payment)?);
    let crm = CrmClient::from_config(&config.crm).map(Arc::new);

    let checkout = Arc::new(CheckoutService::new(
        Arc::clone(&catalog),
        Arc::clone(&orders),
        Arc::clone(&payments),
        crm.clone(),
        Arc::clone(&chat_sink),
        Arc::clone(&event_sender),
        config.price_rub,
    ));

    let engine = Arc::new(ConversationEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&orders),
        Arc::clone(&checkout),
        crm,
        config.support_contact.clone(),
        config.drop_limit,
        config.price_rub,
    ));

    let state = Arc::new(AppState {
        db,
        config,
        event_sender,
        catalog,
        orders,
        checkout,
        engine,
    });

    Ok((state, rx))
}

/// Assembles the public HTTP surface
///
/// Request-id propagation sits outermost so its span covers the tracing and
/// timeout layers too.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/robokassa/result", get(handlers::payments::robokassa_result))
        .route("/robokassa/success", get(handlers::payments::robokassa_success))
        .route("/robokassa/fail", get(handlers::payments::robokassa_fail))
        .route("/api/v1/status", get(handlers::health::status))
        .route("/api/v1/chat/update", post(handlers::chat::chat_update))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .with_state(state)
}
