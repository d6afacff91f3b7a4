use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SourceError;

/// Имя обязательного поля с timestamp записи.
pub const TS_FIELD: &str = "ts_ms";

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// Одна запись телеметрии: упорядоченный набор полей + `ts_ms`.
///
/// `ts_ms` извлекается один раз при создании и остаётся в `fields`,
/// так что сериализованная запись совпадает с исходной строкой лога.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    ts_ms: i64,
    fields: Map<String, Value>,
}

impl Record {
    /// Создать запись из набора полей. Ошибка `Format`, если `ts_ms`
    /// отсутствует или не является целым `i64`.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, SourceError> {
        let ts_ms = match fields.get(TS_FIELD) {
            Some(v) => v.as_i64().ok_or_else(|| {
                SourceError::Format(format!("'{TS_FIELD}' is not an integer: {v}"))
            })?,
            None => return Err(SourceError::Format(format!("missing '{TS_FIELD}'"))),
        };
        Ok(Self { ts_ms, fields })
    }

    /// Создать запись из произвольного JSON значения (ожидается объект).
    pub fn from_value(value: Value) -> Result<Self, SourceError> {
        match value {
            Value::Object(fields) => Self::from_fields(fields),
            other => Err(SourceError::Format(format!(
                "record must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn ts_ms(&self) -> i64 {
        self.ts_ms
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// JSON-текст записи (одно сообщение на запись).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Record::from_fields(fields).map_err(serde::de::Error::custom)
    }
}

// ════════════════════════════════════════════════════════════════
//  SessionLog
// ════════════════════════════════════════════════════════════════

/// Упорядоченный (по времени захвата) лог одной сессии.
#[derive(Clone, Debug, Default)]
pub struct SessionLog {
    pub session_id: String,
    pub records: Vec<Record>,
}

impl SessionLog {
    pub fn new(session_id: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            session_id: session_id.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `ts_ms` первой записи — нулевая точка для смещений.
    pub fn origin_ts_ms(&self) -> Option<i64> {
        self.records.first().map(Record::ts_ms)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}
