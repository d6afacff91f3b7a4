use std::time::Duration;

use serde::Serialize;

use crate::error::RateError;

// ════════════════════════════════════════════════════════════════
//  Rate
// ════════════════════════════════════════════════════════════════

/// Множитель скорости воспроизведения: >1 быстрее, <1 медленнее.
///
/// Создаётся только через [`Rate::new`], поэтому значение всегда
/// конечное и строго положительное.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Rate(f64);

impl Rate {
    pub const REALTIME: Rate = Rate(1.0);

    pub fn new(value: f64) -> Result<Self, RateError> {
        if !value.is_finite() {
            return Err(RateError::NotFinite(value));
        }
        if value <= 0.0 {
            return Err(RateError::NotPositive(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Смещение от origin в миллисекундах → wall-clock смещение с учётом rate.
    ///
    /// Отрицательные смещения (запись раньше origin) схлопываются в ноль.
    /// Результат, не помещающийся в `Duration`, насыщается до `Duration::MAX`.
    pub fn scale(self, offset_ms: i64) -> Duration {
        if offset_ms <= 0 {
            return Duration::ZERO;
        }
        let secs = offset_ms as f64 / 1000.0 / self.0;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::REALTIME
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for Rate {
    type Error = RateError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Rate::new(value)
    }
}
