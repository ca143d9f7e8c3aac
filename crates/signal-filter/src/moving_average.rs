//! Bounded Moving Average

/// Running arithmetic mean over the most recent `window` samples
///
/// Storage is a fixed `MAX_N` array, the active window is chosen at runtime
/// (`1..=MAX_N`, default 1). Each update is O(1): the oldest sample is
/// subtracted from a running sum instead of re-summing the window. The sum is
/// kept in `f64` to limit drift over long streams.
///
/// Single-owner only; there is no internal synchronization.
#[derive(Debug, Clone)]
pub struct MovingAverage<const MAX_N: usize> {
    /// Sample storage, only the first `window` slots are used
    samples: [f32; MAX_N],
    /// Next slot to write (oldest sample once the window is full)
    cursor: usize,
    /// Samples currently held, saturates at `window`
    count: usize,
    /// Active window size
    window: usize,
    /// Sum of the held samples
    sum: f64,
}

impl<const MAX_N: usize> MovingAverage<MAX_N> {
    const CAPACITY_CHECK: () = assert!(MAX_N >= 1, "moving average capacity must be at least 1");

    /// Create a filter with a window of 1
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;

        Self {
            samples: [0.0; MAX_N],
            cursor: 0,
            count: 0,
            window: 1,
            sum: 0.0,
        }
    }

    /// Create a filter with the given window (clamped into `1..=MAX_N`)
    pub fn with_window(window: usize) -> Self {
        let mut filter = Self::new();
        filter.set_window(window);
        filter
    }

    /// Change the window size
    ///
    /// The value is clamped into `1..=MAX_N`. Accumulated history is
    /// discarded so samples from different windows never mix.
    pub fn set_window(&mut self, window: usize) {
        self.window = window.clamp(1, MAX_N);
        self.reset();
    }

    /// Add a sample and get the updated average
    ///
    /// Until the window fills, the average covers the samples seen so far.
    /// A non-finite sample makes the average non-finite only while it is
    /// inside the window.
    pub fn push(&mut self, sample: f32) -> f32 {
        if self.count < self.window {
            self.samples[self.cursor] = sample;
            self.sum += f64::from(sample);
            self.count += 1;
        } else {
            let oldest = self.samples[self.cursor];
            self.sum += f64::from(sample) - f64::from(oldest);
            self.samples[self.cursor] = sample;
        }
        self.cursor = (self.cursor + 1) % self.window;

        // inf - inf leaves NaN behind after a non-finite sample is evicted
        if !self.sum.is_finite() {
            self.sum = self.samples[..self.count].iter().map(|&x| f64::from(x)).sum();
        }

        (self.sum / self.count as f64) as f32
    }

    /// Get the current average without modifying state (0 when empty)
    pub fn get(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f64) as f32
    }

    /// Discard all samples, keeping the window size
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.count = 0;
        self.sum = 0.0;
    }

    /// Get the number of samples currently averaged
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if no samples are held
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get the active window size
    pub fn window(&self) -> usize {
        self.window
    }

    /// Get the maximum window size
    pub const fn capacity(&self) -> usize {
        MAX_N
    }
}

impl<const MAX_N: usize> Default for MovingAverage<MAX_N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_running_average_window_3() {
        let mut filter = MovingAverage::<16>::with_window(3);

        let averages: Vec<f32> = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
            .into_iter()
            .map(|x| filter.push(x))
            .collect();

        assert_eq!(averages, vec![1.0, 1.5, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn test_get_is_idempotent() {
        let mut filter = MovingAverage::<8>::with_window(4);
        assert_eq!(filter.get(), 0.0);

        filter.push(10.0);
        filter.push(20.5);
        let first = filter.get();
        let second = filter.get();

        assert_eq!(first, second);
        assert_eq!(first, 15.25);
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_set_window_resets_history() {
        let mut filter = MovingAverage::<8>::with_window(4);
        for x in [100.0, 200.0, 300.0] {
            filter.push(x);
        }

        filter.set_window(2);
        assert_eq!(filter.len(), 0);
        assert!(filter.is_empty());
        assert_eq!(filter.get(), 0.0);

        // Behaves like a fresh filter
        assert_eq!(filter.push(4.0), 4.0);
        assert_eq!(filter.push(6.0), 5.0);
        assert_eq!(filter.push(8.0), 7.0);
    }

    #[test]
    fn test_window_clamping() {
        let mut filter = MovingAverage::<32>::new();
        assert_eq!(filter.window(), 1);
        assert_eq!(filter.capacity(), 32);

        filter.set_window(0);
        assert_eq!(filter.window(), 1);

        filter.set_window(32 + 1000);
        assert_eq!(filter.window(), 32);
    }

    #[test]
    fn test_reset_keeps_window() {
        let mut filter = MovingAverage::<8>::with_window(5);
        filter.push(1.0);
        filter.push(2.0);

        filter.reset();
        assert_eq!(filter.window(), 5);
        assert!(filter.is_empty());
        assert_eq!(filter.push(9.0), 9.0);
    }

    #[test]
    fn test_window_of_one_tracks_input() {
        let mut filter = MovingAverage::<4>::default();
        for x in [3.5, -2.0, 7.25] {
            assert_eq!(filter.push(x), x);
        }
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_long_stream_stays_accurate() {
        let mut filter = MovingAverage::<256>::with_window(256);
        let mut last = 0.0;
        for i in 0..1_000_000u32 {
            last = filter.push(23.0 + (i % 7) as f32 * 0.1);
        }
        // Window of 256 over a period-7 pattern averages close to 23.3
        assert!((last - 23.3).abs() < 0.01);
    }

    #[test]
    fn test_recovers_after_non_finite_sample() {
        let mut filter = MovingAverage::<8>::with_window(3);
        filter.push(1.0);
        assert_eq!(filter.push(f32::INFINITY), f32::INFINITY);
        assert!(filter.push(f32::NAN).is_nan());

        // Both bad samples still in the window
        assert!(filter.push(2.0).is_nan());
        assert!(filter.push(4.0).is_nan());

        assert_eq!(filter.push(6.0), 4.0);
        assert_eq!(filter.push(8.0), 6.0);
        assert_eq!(filter.get(), 6.0);
    }

    proptest! {
        #[test]
        fn prop_matches_naive_mean(
            window in 1usize..=16,
            samples in proptest::collection::vec(-1000.0f32..1000.0, 1..200),
        ) {
            let mut filter = MovingAverage::<16>::with_window(window);

            for (i, &x) in samples.iter().enumerate() {
                let average = filter.push(x);

                let start = (i + 1).saturating_sub(window);
                let recent = &samples[start..=i];
                let expected = recent.iter().map(|&v| f64::from(v)).sum::<f64>() / recent.len() as f64;

                prop_assert!((f64::from(average) - expected).abs() < 1e-2);
                prop_assert_eq!(filter.len(), recent.len());
                prop_assert_eq!(filter.get(), average);
            }
        }
    }
}
