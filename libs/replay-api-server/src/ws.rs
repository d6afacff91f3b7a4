use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use replay_api::{CloseReason, Rate, Record, ReplaySink, SinkError};
use replay_engine::ReplayOutcome;

use super::AppState;

const DONE_MARKER: &str = r#"{"done":true}"#;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws/replay?session_id=&rate=
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct ReplayParams {
    session_id: Option<String>,
    rate: Option<f64>,
}

pub(crate) async fn handle_replay(
    State(state): State<AppState>,
    Query(params): Query<ReplayParams>,
    ws: WebSocketUpgrade,
) -> Response {
    // Rate проверяется до upgrade: ошибка конфигурации уходит обычным HTTP ответом.
    let rate = match params.rate.map(Rate::new).transpose() {
        Ok(rate) => rate.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "rejected replay request");
            return (StatusCode::BAD_REQUEST, format!("invalid rate: {e}")).into_response();
        }
    };
    let session_id = params
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| state.default_session_id.to_string());

    ws.on_upgrade(move |socket| replay_connection(socket, state, session_id, rate))
}

// ═══════════════════════════════════════════════════════════════
//  Connection handler
// ═══════════════════════════════════════════════════════════════

async fn replay_connection(socket: WebSocket, state: AppState, session_id: String, rate: Rate) {
    tracing::info!(session = %session_id, %rate, "subscriber connected");

    let send_timeout = state.scheduler.options().send_timeout;
    let (mut sink, reader) = WsSink::new(socket);
    let token = state.shutdown.child_token();

    let reason = match state
        .scheduler
        .replay(&session_id, rate, &mut sink, &token)
        .await
    {
        Ok(outcome) => {
            if state.done_marker && matches!(outcome, ReplayOutcome::Completed { .. }) {
                let marker = sink.send_text(DONE_MARKER.to_string());
                if !matches!(tokio::time::timeout(send_timeout, marker).await, Ok(Ok(()))) {
                    tracing::debug!(session = %session_id, "done marker not delivered");
                }
            }
            outcome.close_reason()
        }
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "replay failed");
            e.close_reason()
        }
    };

    sink.close(reason, send_timeout).await;
    reader.abort();
    tracing::info!(session = %session_id, %reason, "subscriber session closed");
}

// ═══════════════════════════════════════════════════════════════
//  WsSink
// ═══════════════════════════════════════════════════════════════

/// `ReplaySink` поверх axum WebSocket.
///
/// Сокет разделяется: write-половина принадлежит pacing loop'у,
/// read-половину вычитывает фоновая задача и взводит `disconnected`,
/// когда клиент закрыл соединение или оно оборвалось.
pub struct WsSink {
    tx: SplitSink<WebSocket, Message>,
    disconnected: CancellationToken,
}

impl WsSink {
    /// Возвращает sink и handle фоновой задачи-читателя.
    pub fn new(socket: WebSocket) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = socket.split();
        let disconnected = CancellationToken::new();

        let flag = disconnected.clone();
        let reader = tokio::spawn(async move {
            // Входящие сообщения протоколом не предусмотрены — только ждём закрытия.
            while let Some(msg) = rx.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            flag.cancel();
        });

        (Self { tx, disconnected }, reader)
    }

    async fn send_text(&mut self, text: String) -> Result<(), SinkError> {
        if self.disconnected.is_cancelled() {
            return Err(SinkError::Closed);
        }
        if self.tx.send(Message::Text(text.into())).await.is_err() {
            self.disconnected.cancel();
            return Err(SinkError::Closed);
        }
        Ok(())
    }

    /// Отправить close frame с кодом причины. Если клиент уже ушёл —
    /// ничего не отправляется.
    pub async fn close(mut self, reason: CloseReason, timeout: Duration) {
        if reason == CloseReason::PeerDisconnected || self.disconnected.is_cancelled() {
            return;
        }
        let frame = CloseFrame {
            code: reason.code(),
            reason: Utf8Bytes::from_static(reason.as_str()),
        };
        let close = self.tx.send(Message::Close(Some(frame)));
        if tokio::time::timeout(timeout, close).await.is_err() {
            tracing::debug!(%reason, "close frame timed out");
        }
    }
}

impl ReplaySink for WsSink {
    fn send<'a>(
        &'a mut self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let text = record.to_json().map_err(|e| SinkError::Encode(e.to_string()))?;
            self.send_text(text).await
        })
    }

    fn closed(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.disconnected.cancelled())
    }

    fn is_closed(&self) -> bool {
        self.disconnected.is_cancelled()
    }
}
