use super::Backoff;

/// Delays growing by `multiplier / multiplier_base` after every failed attempt.
///
/// The ratio keeps the arithmetic in integers.
///
/// ```
/// use relayer_common::retry::{policies::ExponentialBackoff, Backoff};
///
/// let backoff = ExponentialBackoff::new(1000, 150, 100);
/// assert_eq!(backoff.next_delay_ms(1000), 1500);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    multiplier: u64,
    multiplier_base: u64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert!(multiplier_base != 0);
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1500,
            multiplier: 15,
            multiplier_base: 10,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        curr_delay_ms.saturating_mul(self.multiplier) / self.multiplier_base
    }
}
