use std::time::Duration;

use tokio::time::Instant;

use replay_api::{Rate, Record};

/// Запас, на который откладывается deadline, не помещающийся в `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ═══════════════════════════════════════════════════════════════
//  ReplaySession
// ═══════════════════════════════════════════════════════════════

/// Состояние одной сессии воспроизведения: курсор и нулевые точки
/// двух часов (время захвата и wall-clock).
#[derive(Debug, Clone)]
pub struct ReplaySession {
    sequence_index: usize,
    origin_ts_ms: i64,
    start: Instant,
    rate: Rate,
}

impl ReplaySession {
    /// Начать сессию: origin — `ts_ms` первой записи, start — сейчас.
    pub fn start(origin_ts_ms: i64, rate: Rate) -> Self {
        Self::start_at(origin_ts_ms, rate, Instant::now())
    }

    pub fn start_at(origin_ts_ms: i64, rate: Rate, start: Instant) -> Self {
        Self {
            sequence_index: 0,
            origin_ts_ms,
            start,
            rate,
        }
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn origin_ts_ms(&self) -> i64 {
        self.origin_ts_ms
    }

    pub fn start_instant(&self) -> Instant {
        self.start
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Смещение записи от начала воспроизведения с учётом rate.
    pub fn scheduled_offset(&self, record: &Record) -> Duration {
        self.rate
            .scale(record.ts_ms().saturating_sub(self.origin_ts_ms))
    }

    /// Момент, раньше которого запись отправлять нельзя.
    pub fn deadline(&self, record: &Record) -> Instant {
        let offset = self.scheduled_offset(record);
        self.start
            .checked_add(offset)
            .unwrap_or_else(|| self.start + FAR_FUTURE)
    }

    /// Сколько прошло с начала воспроизведения.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Запись отправлена — сдвинуть курсор ровно на одну позицию.
    pub(crate) fn advance(&mut self) {
        self.sequence_index += 1;
    }
}
