use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use replay_api::RecordSource;
use replay_api_server::ApiOptions;
use replay_engine::{PacingConfig, PacingOptions};
use source_jsonl::{JsonlSource, JsonlSourceConfig};
use source_memory::{MemorySessionConfig, MemorySource};

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "replay-server", about = "Воспроизведение записанной телеметрии по WebSocket")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
    /// Показать доступные сессии и выйти
    Sessions(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "REPLAY_CONFIG")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Сессия для подключений без `session_id`.
    #[serde(default = "default_session_id")]
    pub default_session_id: String,
    /// `{"done":true}` после последней записи.
    #[serde(default)]
    pub done_marker: bool,
    #[serde(default = "default_cors")]
    pub cors: bool,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
}

/// Откуда брать логи сессий.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// `{data_dir}/{session_id}.jsonl`
    Jsonl(JsonlSourceConfig),
    /// Сессии прямо в конфиге: `[[source.sessions]]`.
    Memory {
        #[serde(default)]
        sessions: Vec<MemorySessionConfig>,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Jsonl(JsonlSourceConfig::default())
    }
}

fn default_api_port() -> u16 {
    8000
}
fn default_session_id() -> String {
    "demo_session".into()
}
fn default_cors() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(toml_str: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(toml_str).map_err(|e| e.to_string())?;
        if config.default_session_id.trim().is_empty() {
            return Err("default_session_id must not be empty".into());
        }
        Ok(config)
    }

    pub fn pacing_options(&self) -> Result<PacingOptions, ServerError> {
        self.pacing
            .options()
            .map_err(|detail| ServerError::Config { context: "pacing", detail })
    }

    pub fn api_options(&self) -> ApiOptions {
        ApiOptions {
            port: self.api_port,
            default_session_id: self.default_session_id.clone(),
            done_marker: self.done_marker,
            cors: self.cors,
        }
    }

    /// Собрать Record Source по секции `[source]`.
    pub fn build_source(&self) -> Result<Arc<dyn RecordSource>, ServerError> {
        let source: Arc<dyn RecordSource> = match &self.source {
            SourceConfig::Jsonl(cfg) => {
                tracing::info!(data_dir = %cfg.data_dir, "using jsonl source");
                Arc::new(JsonlSource::from_config(cfg))
            }
            SourceConfig::Memory { sessions } => {
                tracing::info!(sessions = sessions.len(), "using memory source");
                Arc::new(MemorySource::from_config(sessions)?)
            }
        };
        Ok(source)
    }
}
