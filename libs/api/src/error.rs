/// Ошибка Record Source.
///
/// `NotFound` — штатный терминальный исход (сессии нет), остальные
/// варианты — сбой источника, который завершает только текущую сессию.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("io: {0}")]
    Io(String),

    #[error("format: {0}")]
    Format(String),
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Format(e.to_string())
    }
}

/// Ошибка отправки записи в sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Удалённая сторона отключилась.
    #[error("sink closed")]
    Closed,

    /// Запись не удалось сериализовать; ничего не отправлено.
    #[error("encode: {0}")]
    Encode(String),
}

/// Невалидный коэффициент скорости воспроизведения.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RateError {
    #[error("rate must be finite, got {0}")]
    NotFinite(f64),

    #[error("rate must be positive, got {0}")]
    NotPositive(f64),
}
