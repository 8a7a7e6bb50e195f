//! Reconnect backoff policy.
//!
//! After an unexpected disconnect the client retries forever.  The delay
//! between attempts starts at a floor, doubles after every failed attempt up
//! to a ceiling, and gets a small random jitter so several clients that lost
//! the same peripheral do not hammer it in lock-step.
//!
//! ```text
//! attempt   base      scheduled delay
//! 1         800 ms    800 ms              (first retry after a drop)
//! 2         1600 ms   1600 ms + jitter
//! 3         3200 ms   3200 ms + jitter
//! ...
//! n         12800 ms  12800 ms            (jitter clamped at the ceiling)
//! ```
//!
//! The policy only computes durations.  Sleeping is the caller's business.

use std::time::Duration;

use rand::Rng;

/// Default delay before the first retry, and the value restored on success.
pub const DEFAULT_FLOOR: Duration = Duration::from_millis(800);
/// Default upper bound for any scheduled delay.
pub const DEFAULT_CEILING: Duration = Duration::from_millis(12_800);
/// Default upper bound of the random jitter added to an escalated delay.
pub const DEFAULT_JITTER: Duration = Duration::from_millis(250);

/// Exponential backoff with jitter, capped at a ceiling.
///
/// Consecutive scheduled delays never decrease as long as the jitter bound
/// is smaller than the floor: every escalation adds at least one floor to
/// the base, which outruns any jitter from the previous step.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    floor: Duration,
    ceiling: Duration,
    jitter: Duration,
    base: Duration,
}

impl ReconnectBackoff {
    /// Creates a policy.  `ceiling` is raised to `floor` if smaller, and
    /// `jitter` is limited to `floor` to keep delays non-decreasing.
    pub fn new(floor: Duration, ceiling: Duration, jitter: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            jitter: jitter.min(floor),
            base: floor,
        }
    }

    /// Delay to use for the first retry after a drop: the current base,
    /// without escalation.
    pub fn initial_delay(&self) -> Duration {
        self.base
    }

    /// Current base delay (before jitter).
    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Records a failed attempt and returns the delay until the next one.
    ///
    /// The base doubles (saturating at the ceiling); the returned delay is
    /// the base plus a uniform jitter in `[0, jitter]`, clamped to the
    /// ceiling.
    pub fn escalate<R: Rng>(&mut self, rng: &mut R) -> Duration {
        self.base = self.base.saturating_mul(2).min(self.ceiling);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };
        (self.base + jitter).min(self.ceiling)
    }

    /// Restores the floor after a successful connection.
    pub fn reset(&mut self) {
        self.base = self.floor;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_FLOOR, DEFAULT_CEILING, DEFAULT_JITTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_initial_delay_is_floor() {
        let backoff = ReconnectBackoff::default();
        assert_eq!(backoff.initial_delay(), Duration::from_millis(800));
    }

    #[test]
    fn test_escalation_is_non_decreasing_and_capped() {
        // Arrange: several seeds so the jitter takes different values
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut backoff = ReconnectBackoff::default();
            let mut previous = backoff.initial_delay();

            // Act / Assert
            for _ in 0..20 {
                let next = backoff.escalate(&mut rng);
                assert!(next >= previous, "seed {seed}: {next:?} < {previous:?}");
                assert!(next <= DEFAULT_CEILING, "seed {seed}: {next:?} above ceiling");
                previous = next;
            }
        }
    }

    #[test]
    fn test_base_doubles_until_ceiling() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = ReconnectBackoff::default();

        let bases: Vec<u128> = (0..6)
            .map(|_| {
                backoff.escalate(&mut rng);
                backoff.base().as_millis()
            })
            .collect();

        assert_eq!(bases, vec![1600, 3200, 6400, 12_800, 12_800, 12_800]);
    }

    #[test]
    fn test_delay_at_ceiling_has_no_jitter_overshoot() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backoff = ReconnectBackoff::default();
        for _ in 0..10 {
            backoff.escalate(&mut rng);
        }
        assert_eq!(backoff.escalate(&mut rng), DEFAULT_CEILING);
    }

    #[test]
    fn test_reset_restores_floor() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut backoff = ReconnectBackoff::default();
        backoff.escalate(&mut rng);
        backoff.escalate(&mut rng);

        backoff.reset();

        assert_eq!(backoff.base(), Duration::from_millis(800));
        assert_eq!(backoff.initial_delay(), Duration::from_millis(800));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut backoff = ReconnectBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Duration::ZERO,
        );
        assert_eq!(backoff.escalate(&mut rng), Duration::from_millis(200));
        assert_eq!(backoff.escalate(&mut rng), Duration::from_millis(400));
    }

    #[test]
    fn test_ceiling_below_floor_is_raised() {
        let backoff = ReconnectBackoff::new(
            Duration::from_millis(500),
            Duration::from_millis(100),
            Duration::ZERO,
        );
        assert_eq!(backoff.ceiling(), Duration::from_millis(500));
    }
}
