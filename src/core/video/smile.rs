/// Running range of the per-face smile count, used to turn a raw count into
/// a 0..=1 intensity.
///
/// The number of smile hits depends on face size and lighting, so the range
/// is learned on the fly: the minimum is fixed by the first observation and
/// the maximum only ever widens. Intensities are only meaningful once a real
/// smile has been seen.
#[derive(Debug, Clone, Default)]
pub struct SmileIntensityTracker {
    range: Option<(usize, usize)>,
}

impl SmileIntensityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count` and returns its normalized intensity.
    pub fn observe(&mut self, count: usize) -> f32 {
        let (min, max) = match self.range {
            None => (count, count),
            Some((min, max)) => (min, max.max(count)),
        };
        self.range = Some((min, max));

        // max >= min always holds, so the denominator is at least 1
        let denominator = (max - min + 1) as f32;
        ((count as f32 - min as f32) / denominator).clamp(0.0, 1.0)
    }

    /// `(min, max)` seen so far.
    pub fn range(&self) -> Option<(usize, usize)> {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_sets_both_bounds() {
        let mut tracker = SmileIntensityTracker::new();
        assert_eq!(tracker.range(), None);

        assert_eq!(tracker.observe(4), 0.0);
        assert_eq!(tracker.range(), Some((4, 4)));
    }

    #[test]
    fn test_max_widens_min_stays() {
        let mut tracker = SmileIntensityTracker::new();
        tracker.observe(2);
        let intensity = tracker.observe(11);
        assert_eq!(tracker.range(), Some((2, 11)));
        assert!((intensity - 0.9).abs() < 1e-6);

        tracker.observe(5);
        assert_eq!(tracker.range(), Some((2, 11)));
    }

    #[test]
    fn test_below_min_clamps_to_zero() {
        let mut tracker = SmileIntensityTracker::new();
        tracker.observe(3);
        assert_eq!(tracker.observe(0), 0.0);
        assert_eq!(tracker.range(), Some((3, 3)));
    }

    #[test]
    fn test_intensity_is_always_finite_and_bounded() {
        let mut tracker = SmileIntensityTracker::new();
        for count in [0usize, 0, 7, 1, 30, 2, 0, 30, 15] {
            let intensity = tracker.observe(count);
            assert!(intensity.is_finite());
            assert!((0.0..=1.0).contains(&intensity));
        }
    }
}
