use std::future::Future;
use std::pin::Pin;

use crate::error::SinkError;
use crate::record::Record;

// ════════════════════════════════════════════════════════════════
//  Replay Sink
// ════════════════════════════════════════════════════════════════

/// Односторонний выход pacing loop'а (WS соединение, тестовый mock).
///
/// Отправки строго последовательны: loop держит `&mut self` и никогда
/// не вызывает `send` конкурентно.
pub trait ReplaySink: Send {
    /// Отправить одну запись целиком. Запись сериализуется до записи
    /// в канал, поэтому частичных сообщений не бывает.
    fn send<'a>(
        &'a mut self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

    /// Завершается, когда удалённая сторона отключилась.
    /// Должен быть cancel-safe: loop опрашивает его в `select!`.
    fn closed(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Неблокирующая проверка отключения.
    fn is_closed(&self) -> bool;
}

// ════════════════════════════════════════════════════════════════
//  Close reasons
// ════════════════════════════════════════════════════════════════

/// Причина завершения сессии, видимая подписчику.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Record Source не знает такую сессию.
    NoSuchSession,
    /// Лог сессии пуст.
    EmptySession,
    /// Все записи отправлены.
    NormalCompletion,
    /// Подписчик отключился.
    PeerDisconnected,
    /// Сервер завершает работу.
    ServerShutdown,
    /// Отправка не уложилась в send timeout.
    SendTimeout,
    /// Сбой Record Source.
    SourceError,
    /// Запись не удалось сериализовать.
    EncodeError,
}

impl CloseReason {
    /// WebSocket close code.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::NoSuchSession => 4404,
            CloseReason::EmptySession => 4000,
            CloseReason::NormalCompletion => 1000,
            CloseReason::PeerDisconnected => 1001,
            CloseReason::ServerShutdown => 1001,
            CloseReason::SendTimeout => 4408,
            CloseReason::SourceError => 1011,
            CloseReason::EncodeError => 1011,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::NoSuchSession => "no such session",
            CloseReason::EmptySession => "empty session",
            CloseReason::NormalCompletion => "normal completion",
            CloseReason::PeerDisconnected => "peer disconnected",
            CloseReason::ServerShutdown => "server shutting down",
            CloseReason::SendTimeout => "send timeout",
            CloseReason::SourceError => "source error",
            CloseReason::EncodeError => "encode error",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
