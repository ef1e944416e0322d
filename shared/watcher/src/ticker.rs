use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A cancel-safe repeating interval. Wraps `tokio::time::interval` so every periodic task in the
/// node (the 10s connection watchdog, the 5s check-state tick, the 100ms executor liveness poll)
/// expresses its cadence the same way.
pub struct Ticker {
    interval: tokio::time::Interval,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Waits for the next tick, or returns `None` if `cancel` fires first.
    ///
    /// # Cancel safety
    ///
    /// Safe to use as the event in a `tokio::select!` -- if another branch completes first, no
    /// tick is consumed and the next call to `tick` picks up where this one left off.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Option<()> {
        tokio::select! {
            _ = self.interval.tick() => Some(()),
            _ = cancel.cancelled() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let cancel = CancellationToken::new();
        let mut ticker = Ticker::new(Duration::from_millis(5));
        assert!(ticker.tick(&cancel).await.is_some());

        cancel.cancel();
        assert!(ticker.tick(&cancel).await.is_none());
    }
}
