//! Streaming sum of squared differences.
//!
//! For values `x₁..xₙ` seen so far and the latest value `x = xₙ`:
//!
//! ```text
//! Σᵢ (xᵢ − x)² = M₂ + n·(x̄ − x)²      where M₂ = Σᵢ (xᵢ − x̄)²
//! ```
//!
//! `n`, the running mean `x̄` and `M₂` are maintained with Welford's update,
//! so each call is O(1) in time and space. Nothing is ever evicted: the
//! statistic is cumulative over the lifetime of the accumulator.
//!
//! The expanded form `Σxᵢ² − 2·x·Σxᵢ + n·x²` needs the same state but
//! cancels catastrophically once the values are large relative to their
//! spread, and can go negative. Both terms above are non-negative.

/// O(1) accumulator for the sum of squared differences between the latest
/// value and every value observed so far (the latest one included).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RollingSquaredDifferences {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RollingSquaredDifferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `value` in and return `Σᵢ (xᵢ − value)²` over all values seen.
    pub fn update(&mut self, value: f64) -> f64 {
        self.count += 1;
        let n = self.count as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);

        let offset = self.mean - value;
        self.m2 + n * offset * offset
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the running mean.
    pub fn centered_sum_of_squares(&self) -> f64 {
        self.m2
    }
}
