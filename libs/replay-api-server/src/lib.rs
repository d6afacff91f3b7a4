mod cors;
mod http;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use replay_engine::ReplayScheduler;

pub use ws::WsSink;

/// Параметры HTTP + WS поверхности.
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub port: u16,
    /// Сессия для `/ws/replay` без `session_id`.
    pub default_session_id: String,
    /// Отправлять `{"done":true}` после последней записи.
    pub done_marker: bool,
    /// Разрешить cross-origin запросы из браузера.
    pub cors: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) scheduler: ReplayScheduler,
    pub(crate) default_session_id: Arc<str>,
    pub(crate) done_marker: bool,
    pub(crate) shutdown: CancellationToken,
}

/// Router без привязки к сокету.
pub fn router(options: &ApiOptions, scheduler: ReplayScheduler, shutdown: CancellationToken) -> Router {
    let state = AppState {
        scheduler,
        default_session_id: options.default_session_id.as_str().into(),
        done_marker: options.done_marker,
        shutdown,
    };

    let app = Router::new()
        .route("/", get(http::handle_root))
        .route("/api/health", get(http::handle_health))
        .route("/api/sessions", get(http::handle_list_sessions))
        .route("/api/sessions/{id}", get(http::handle_get_session))
        .route("/ws/replay", get(ws::handle_replay))
        .with_state(state);

    if options.cors {
        app.layer(axum::middleware::from_fn(cors::permissive))
    } else {
        app
    }
}

/// Replay HTTP + WebSocket API сервер.
pub async fn run(
    options: ApiOptions,
    scheduler: ReplayScheduler,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", options.port))
        .await
        .map_err(|e| format!("bind api :{}: {e}", options.port))?;
    serve(listener, options, scheduler, shutdown).await
}

/// Обслуживать уже открытый listener до отмены `shutdown`.
pub async fn serve(
    listener: TcpListener,
    options: ApiOptions,
    scheduler: ReplayScheduler,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let app = router(&options, scheduler, shutdown.clone());

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "api server (http+ws) listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
