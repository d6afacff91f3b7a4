use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use replay_api::{Record, RecordSource, SessionLog, SourceError};

// ═══════════════════════════════════════════════════════════════
//  MemorySourceConfig
// ═══════════════════════════════════════════════════════════════

/// Одна сессия, заданная прямо в конфиге.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemorySessionConfig {
    pub id: String,
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
}

// ═══════════════════════════════════════════════════════════════
//  MemorySource
// ═══════════════════════════════════════════════════════════════

/// In-memory Record Source. Для демо-сессий и тестов, где нет
/// смысла держать лог на диске.
#[derive(Clone, Default)]
pub struct MemorySource {
    sessions: Arc<HashMap<String, Vec<Record>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить (или заменить) сессию.
    pub fn with_session(mut self, id: impl Into<String>, records: Vec<Record>) -> Self {
        Arc::make_mut(&mut self.sessions).insert(id.into(), records);
        self
    }

    /// Собрать source из конфигурации. Каждая запись проходит ту же
    /// проверку `ts_ms`, что и при чтении с диска.
    pub fn from_config(sessions: &[MemorySessionConfig]) -> Result<Self, SourceError> {
        let mut source = Self::new();
        for session in sessions {
            let records = session
                .records
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    Record::from_value(value.clone()).map_err(|e| {
                        SourceError::Format(format!("session '{}' record {i}: {e}", session.id))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            source = source.with_session(session.id.clone(), records);
        }
        Ok(source)
    }
}

impl RecordSource for MemorySource {
    fn load_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionLog, SourceError>> + Send + '_>> {
        let result = match self.sessions.get(session_id) {
            Some(records) => Ok(SessionLog::new(session_id, records.clone())),
            None => Err(SourceError::NotFound(session_id.to_string())),
        };
        Box::pin(async move { result })
    }

    fn sessions(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SourceError>> + Send + '_>> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        Box::pin(async move { Ok(ids) })
    }
}
