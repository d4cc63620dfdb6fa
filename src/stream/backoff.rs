use std::time::Duration;

/// Doubling delay between recovery attempts, clamped to `[floor, ceiling]`
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(
        floor: Duration,
        ceiling: Duration,
    ) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay to wait now; the following one doubles
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.floor;
    }
}
