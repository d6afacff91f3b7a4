use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Wait strategy
// ═══════════════════════════════════════════════════════════════

/// Как pacing loop ждёт момента отправки следующей записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Один таймер на deadline записи; просыпается ровно к сроку
    /// или раньше — по отключению/отмене.
    #[default]
    Deadline,
    /// Перепроверка каждые `poll_quantum`.
    Poll,
}

// ═══════════════════════════════════════════════════════════════
//  Pacing Config (TOML)
// ═══════════════════════════════════════════════════════════════

/// Секция `[pacing]` конфига.
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(default)]
    pub wait: WaitStrategy,
    /// Квант опроса для `wait = "poll"`.
    #[serde(default = "default_poll_quantum_ms")]
    pub poll_quantum_ms: u64,
    /// Максимальное время одной отправки до признания подписчика зависшим.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_poll_quantum_ms() -> u64 {
    10
}
fn default_send_timeout_ms() -> u64 {
    5_000
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            wait: WaitStrategy::default(),
            poll_quantum_ms: default_poll_quantum_ms(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl PacingConfig {
    pub fn options(&self) -> Result<PacingOptions, String> {
        if self.poll_quantum_ms == 0 {
            return Err("pacing.poll_quantum_ms must be > 0".into());
        }
        if self.send_timeout_ms == 0 {
            return Err("pacing.send_timeout_ms must be > 0".into());
        }
        Ok(PacingOptions {
            wait: self.wait,
            poll_quantum: Duration::from_millis(self.poll_quantum_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pacing Options (runtime)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingOptions {
    pub wait: WaitStrategy,
    pub poll_quantum: Duration,
    pub send_timeout: Duration,
}

impl Default for PacingOptions {
    fn default() -> Self {
        Self {
            wait: WaitStrategy::Deadline,
            poll_quantum: Duration::from_millis(default_poll_quantum_ms()),
            send_timeout: Duration::from_millis(default_send_timeout_ms()),
        }
    }
}
