use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use dropshop_api as api;

use api::chat::{ChatSink, HttpChatSink, MediaCache, NullChatSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    api::db::run_migrations(&db_pool).await.map_err(|e| {
        error!("Failed running migrations: {}", e);
        e
    })?;

    // Outbound chat transport; the engine still answers HTTP callers when the
    // push path is disabled
    let media_cache = Arc::new(MediaCache::new());
    let chat_sink: Arc<dyn ChatSink> =
        match HttpChatSink::from_config(&cfg.chat, Arc::clone(&media_cache)) {
            Some(sink) => Arc::new(sink),
            None => {
                warn!("Chat delivery URL not configured; outbound notifications are disabled");
                Arc::new(NullChatSink)
            }
        };

    let bind_addr = format!("{}:{}", cfg.host, cfg.port);

    // Wire services and shared state
    let (state, event_rx) = api::build_state(cfg, Arc::new(db_pool), chat_sink)?;

    // Spawn event processor
    tokio::spawn(api::events::process_events(event_rx));

    // First boot on an empty database gets the launch catalog
    let seeded = state.catalog.seed_if_empty(state.config.price_rub).await?;
    if seeded > 0 {
        info!(products = seeded, "Catalog seeded for the drop");
    }

    let app = api::app_router(state);

    info!("🚀 dropshop-api listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr.as_str()).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
