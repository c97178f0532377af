use std::time::Duration;

/// Half-life used when none is configured. Observations lose half their weight every
/// ten seconds of tracker time.
pub const DEFAULT_HALF_LIFE: Duration = Duration::from_secs(10);

/// A time-decayed exponentially weighted moving average.
///
/// Observations are recorded with [`update()`][Self::update] and folded into the running
/// estimate when the tracker's clock advances via [`tick()`][Self::tick]. How much a new
/// observation moves the estimate depends on how much time passed: after one half-life, the
/// old estimate and the new observation weigh the same.
///
/// The tracker keeps its own notion of time - it never reads a clock - so callers must only
/// ever move it forward.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use recycle_pool::EwmaTracker;
///
/// let mut tracker = EwmaTracker::new(Duration::from_secs(10));
///
/// // The first observation seeds the estimate.
/// tracker.update(100.0);
/// tracker.tick(Duration::from_secs(5));
/// assert!((tracker.rate() - 100.0).abs() < 1e-9);
///
/// // One half-life later, a new observation pulls the estimate halfway towards it.
/// tracker.update(0.0);
/// tracker.tick(Duration::from_secs(10));
/// assert!((tracker.rate() - 50.0).abs() < 1e-9);
/// ```
#[derive(Clone, Debug)]
pub struct EwmaTracker {
    rate: f64,
    half_life: Duration,
    seeded: bool,

    // Observations recorded since the last tick. Averaged when folded in.
    pending_sum: f64,
    pending_count: u32,
}

impl EwmaTracker {
    /// Creates a tracker with an estimate of zero.
    ///
    /// # Panics
    ///
    /// Panics if `half_life` is zero.
    #[must_use]
    pub fn new(half_life: Duration) -> Self {
        assert!(
            !half_life.is_zero(),
            "EWMA half-life must be greater than zero"
        );

        Self {
            rate: 0.0,
            half_life,
            seeded: false,
            pending_sum: 0.0,
            pending_count: 0,
        }
    }

    /// Records an observation, to be folded into the estimate on the next tick.
    ///
    /// Multiple observations recorded between two ticks are averaged.
    pub fn update(&mut self, sample: f64) {
        self.pending_sum += sample;
        self.pending_count = self.pending_count.saturating_add(1);
    }

    /// Advances the tracker's clock by `elapsed`, folding in pending observations.
    ///
    /// If nothing was observed since the last tick, the estimate decays towards zero. A zero
    /// `elapsed` does nothing.
    pub fn tick(&mut self, elapsed: Duration) {
        if elapsed.is_zero() {
            return;
        }

        let sample = if self.pending_count == 0 {
            0.0
        } else {
            self.pending_sum / f64::from(self.pending_count)
        };

        self.pending_sum = 0.0;
        self.pending_count = 0;

        if !self.seeded {
            self.rate = sample;
            self.seeded = true;
            return;
        }

        let weight = self.weight_for(elapsed);
        self.rate += weight * (sample - self.rate);
    }

    /// The current smoothed estimate.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The decay constant of the tracker.
    #[must_use]
    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    /// Weight of a new observation after `elapsed` time: `1 - 2^(-elapsed / half_life)`.
    fn weight_for(&self, elapsed: Duration) -> f64 {
        let half_lives = elapsed.as_secs_f64() / self.half_life.as_secs_f64();

        1.0 - (-half_lives).exp2()
    }
}

impl Default for EwmaTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HALF_LIFE)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn starts_at_zero() {
        let tracker = EwmaTracker::default();

        assert_close(tracker.rate(), 0.0);
        assert_eq!(tracker.half_life(), DEFAULT_HALF_LIFE);
    }

    #[test]
    fn first_tick_seeds_the_estimate() {
        let mut tracker = EwmaTracker::default();

        tracker.update(42.0);
        tracker.tick(Duration::from_secs(5));

        assert_close(tracker.rate(), 42.0);
    }

    #[test]
    fn one_half_life_moves_halfway() {
        let mut tracker = EwmaTracker::new(Duration::from_secs(10));

        tracker.update(100.0);
        tracker.tick(Duration::from_secs(1));

        tracker.update(200.0);
        tracker.tick(Duration::from_secs(10));

        assert_close(tracker.rate(), 150.0);
    }

    #[test]
    fn two_half_lives_move_three_quarters() {
        let mut tracker = EwmaTracker::new(Duration::from_secs(10));

        tracker.update(0.0);
        tracker.tick(Duration::from_secs(1));

        tracker.update(100.0);
        tracker.tick(Duration::from_secs(20));

        assert_close(tracker.rate(), 75.0);
    }

    #[test]
    fn pending_observations_are_averaged() {
        let mut tracker = EwmaTracker::default();

        tracker.update(10.0);
        tracker.update(20.0);
        tracker.update(30.0);
        tracker.tick(Duration::from_secs(5));

        assert_close(tracker.rate(), 20.0);
    }

    #[test]
    fn ticks_without_observations_decay_towards_zero() {
        let mut tracker = EwmaTracker::new(Duration::from_secs(10));

        tracker.update(80.0);
        tracker.tick(Duration::from_secs(1));

        tracker.tick(Duration::from_secs(10));
        assert_close(tracker.rate(), 40.0);

        tracker.tick(Duration::from_secs(10));
        assert_close(tracker.rate(), 20.0);
    }

    #[test]
    fn zero_elapsed_is_ignored() {
        let mut tracker = EwmaTracker::default();

        tracker.update(5.0);
        tracker.tick(Duration::ZERO);
        assert_close(tracker.rate(), 0.0);

        // The observation is still pending.
        tracker.tick(Duration::from_secs(1));
        assert_close(tracker.rate(), 5.0);
    }

    #[test]
    fn short_ticks_move_the_estimate_a_little() {
        let mut tracker = EwmaTracker::new(Duration::from_secs(10));

        tracker.update(0.0);
        tracker.tick(Duration::from_secs(1));

        tracker.update(100.0);
        tracker.tick(Duration::from_secs(5));

        let rate = tracker.rate();
        assert!(rate > 25.0 && rate < 50.0, "unexpected rate {rate}");
    }

    #[test]
    #[should_panic]
    fn zero_half_life_panics() {
        drop(EwmaTracker::new(Duration::ZERO));
    }
}
