// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

/// Каталог с логами: `{data_dir}/{session_id}.jsonl`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct JsonlSourceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "backend/storage/data".into()
}

impl Default for JsonlSourceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}
