use std::{net::SocketAddr, path::Path, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    tokio::net::TcpListener,
    tower_http::{services::ServeDir, trace::TraceLayer},
    tracing::{info, warn},
};

use {
    chatcast_config::ChatcastConfig,
    chatcast_protocol::WS_PATH,
    chatcast_store::{MessageStore, open_store},
};

use crate::{
    hub::{Hub, HubSettings},
    ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    hub: Arc<Hub>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the router (shared between production startup and tests).
///
/// Every path other than the upgrade endpoint and `/health` is served from
/// `static_dir`.
pub fn build_app(hub: Arc<Hub>, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(WS_PATH, get(ws_upgrade_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { hub })
}

/// Open the store, bind the listener and serve until Ctrl-C.
pub async fn start_gateway(config: &ChatcastConfig) -> anyhow::Result<()> {
    let store = open_store(&config.store)
        .await
        .context("failed to open message store")?;
    log_stored_history(store.as_ref(), config.history.limit).await;

    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let hub = Hub::start(store, HubSettings::from(config));
    let app = build_app(Arc::clone(&hub), &config.server.static_dir);

    // Startup banner.
    let lines = [
        format!("chatcast v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on {}", listener.local_addr()?),
        format!("websocket endpoint {WS_PATH}"),
        format!("static files from {}", config.server.static_dir.display()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    hub.shutdown().await;
    served?;
    Ok(())
}

async fn log_stored_history(store: &dyn MessageStore, limit: usize) {
    match store.recent(limit).await {
        Ok(history) => info!(messages = history.len(), "loaded stored history"),
        Err(e) => warn!(error = %e, "failed to read stored history"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.connection_count(),
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(move |error| {
        warn!(remote = %addr, error = %error, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| handle_connection(socket, state.hub, addr))
}
