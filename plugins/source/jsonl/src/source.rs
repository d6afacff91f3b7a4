use std::future::Future;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use replay_api::{Record, RecordSource, SessionLog, SourceError};

use super::config::JsonlSourceConfig;

const EXTENSION: &str = "jsonl";

// ════════════════════════════════════════════════════════════════
//  JsonlSource
// ════════════════════════════════════════════════════════════════

/// Record Source поверх каталога JSON-lines файлов, один файл на сессию.
#[derive(Clone)]
pub struct JsonlSource {
    data_dir: PathBuf,
}

impl JsonlSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn from_config(cfg: &JsonlSourceConfig) -> Self {
        Self::new(&cfg.data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Путь к логу сессии. `None`, если id не является одиночным
    /// именем файла (разделители, `..`, пустая строка).
    fn session_path(&self, session_id: &str) -> Option<PathBuf> {
        if session_id.is_empty()
            || session_id == "."
            || session_id.contains("..")
            || session_id.contains(['/', '\\', '\0'])
        {
            return None;
        }
        Some(self.data_dir.join(format!("{session_id}.{EXTENSION}")))
    }

    // ── Load ──

    fn do_load(&self, session_id: &str) -> Result<SessionLog, SourceError> {
        let path = self
            .session_path(session_id)
            .ok_or_else(|| SourceError::NotFound(session_id.to_string()))?;

        let f = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(session_id.to_string()));
            }
            Err(e) => return Err(SourceError::Io(format!("open {}: {e}", path.display()))),
        };

        let reader = std::io::BufReader::new(f);
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SourceError::Io(format!("read {}: {e}", path.display())))?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_line(&line).map_err(|e| {
                SourceError::Format(format!("{} line {}: {e}", path.display(), i + 1))
            })?);
        }

        tracing::debug!(session = %session_id, records = records.len(), "loaded session log");
        Ok(SessionLog::new(session_id, records))
    }

    fn do_sessions(&self) -> Result<Vec<String>, SourceError> {
        let dir = match std::fs::read_dir(&self.data_dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SourceError::Io(format!("read_dir {}: {e}", self.data_dir.display())));
            }
        };

        let mut ids = Vec::new();
        for entry in dir {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ════════════════════════════════════════════════════════════════
//  RecordSource impl
// ════════════════════════════════════════════════════════════════

impl RecordSource for JsonlSource {
    fn load_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionLog, SourceError>> + Send + '_>> {
        let this = self.clone();
        let session_id = session_id.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || this.do_load(&session_id))
                .await
                .map_err(|e| SourceError::Io(format!("load task: {e}")))?
        })
    }

    fn sessions(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SourceError>> + Send + '_>> {
        let this = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || this.do_sessions())
                .await
                .map_err(|e| SourceError::Io(format!("list task: {e}")))?
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn parse_line(line: &str) -> Result<Record, SourceError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    Record::from_value(value)
}
