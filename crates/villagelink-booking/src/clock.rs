//! # Runtime Clock
//!
//! A [`Clock`] driven by the tokio timer, so that timers and "now" agree.
//! Under `#[tokio::test(start_paused = true)]` advancing tokio time also
//! advances this clock.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use villagelink_core::Clock;

/// Wall-clock time anchored to a tokio `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl TokioClock {
    /// Anchors the current wall-clock time to the current tokio instant.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchors `wall` to the current tokio instant.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        TokioClock {
            wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_tokio_time() {
        let start = DateTime::<Utc>::default();
        let clock = TokioClock::starting_at(start);

        tokio::time::advance(Duration::from_secs(270)).await;
        assert_eq!((clock.now() - start).num_seconds(), 270);
    }
}
