use std::future::Future;
use std::pin::Pin;

use crate::error::SourceError;
use crate::record::SessionLog;

// ════════════════════════════════════════════════════════════════
//  Record Source
// ════════════════════════════════════════════════════════════════

/// Источник записанных сессий. Только чтение; один экземпляр безопасно
/// разделяется между всеми подключениями.
///
/// Реализации: memory source, jsonl file source.
pub trait RecordSource: Send + Sync {
    /// Загрузить лог сессии в порядке захвата.
    ///
    /// Каждый вызов возвращает независимую копию. `SourceError::NotFound`
    /// если сессии нет; пустой лог — это `Ok` с нулём записей.
    fn load_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionLog, SourceError>> + Send + '_>>;

    /// Список известных идентификаторов сессий (отсортирован).
    fn sessions(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SourceError>> + Send + '_>>;
}
