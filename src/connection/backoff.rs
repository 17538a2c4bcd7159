use std::time::Duration;

use rand::Rng;

/// Экспоненциальная задержка со случайным разбросом ("full jitter").
///
/// Задержка попытки `n` выбирается равномерно из
/// `[0, min(max, base * 2^n))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        Self { base, max }
    }

    /// Верхняя граница задержки для попытки `attempt`.
    pub fn ceiling(
        &self,
        attempt: u32,
    ) -> Duration {
        let base = self.base.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        let grown = base.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(grown.min(max))
    }

    pub fn delay(
        &self,
        attempt: u32,
    ) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..ceiling))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(8),
            max: Duration::from_millis(512),
        }
    }
}
