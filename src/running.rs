//! Running statistics (count, mean, standard deviation, percentiles)
//!
//! Mean and variance are maintained with Welford's online algorithm. Values are
//! also buffered, because exact percentiles need the whole sample; the buffer
//! is sorted once, on the first percentile query after new values arrive.

use serde::{Deserialize, Serialize};

use crate::errors::StatsError;

/// Running statistics over a stream of numeric values.
///
/// # Example
///
/// ```
/// use appstats::running::RunningStatistics;
///
/// let mut stats = RunningStatistics::new("example");
/// for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
///     stats.push(value);
/// }
/// assert_eq!(stats.mean().unwrap(), 3.0);
/// assert!((stats.population_stdev().unwrap() - 2f64.sqrt()).abs() < 1e-12);
/// assert_eq!(stats.percentile(50.0).unwrap(), 3.0);
/// ```
#[derive(Clone, Debug)]
pub struct RunningStatistics {
    /// Statistic name used in `EmptyInput` errors
    name: String,
    /// Buffered sample
    values: Vec<f64>,
    /// Whether `values` is currently sorted
    sorted: bool,
    /// Running mean
    mean: f64,
    /// Sum of squared differences from mean (M2 in Welford's algorithm)
    m2: f64,
    /// NaN inputs that were ignored
    ignored: u64,
}

/// Mean, population standard deviation, and requested percentiles of a sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values.
    pub count: u64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub stdev: f64,
    /// `(p, value)` for each requested percentile, in request order.
    pub percentiles: Vec<(f64, f64)>,
}

impl Summary {
    /// Value reported for percentile `p`, if it was requested.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(requested, _)| *requested == p)
            .map(|(_, value)| *value)
    }
}

impl RunningStatistics {
    /// Create an empty accumulator; `name` labels `EmptyInput` errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            sorted: true,
            mean: 0.0,
            m2: 0.0,
            ignored: 0,
        }
    }

    /// Add a value. NaN is ignored so it cannot poison the aggregates.
    pub fn push(&mut self, value: f64) {
        if value.is_nan() {
            self.ignored += 1;
            return;
        }
        if let Some(last) = self.values.last()
            && *last > value
        {
            self.sorted = false;
        }
        self.values.push(value);

        // Welford's algorithm
        let count = self.values.len() as f64;
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Number of values observed.
    pub fn len(&self) -> u64 {
        self.values.len() as u64
    }

    /// True when no value was observed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// NaN inputs that were skipped.
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Arithmetic mean.
    pub fn mean(&self) -> Result<f64, StatsError> {
        self.ensure_non_empty()?;
        Ok(self.mean)
    }

    /// Population variance (divides by `n`).
    pub fn population_variance(&self) -> Result<f64, StatsError> {
        self.ensure_non_empty()?;
        Ok(self.m2 / self.values.len() as f64)
    }

    /// Population standard deviation.
    pub fn population_stdev(&self) -> Result<f64, StatsError> {
        Ok(self.population_variance()?.sqrt())
    }

    /// Smallest observed value.
    pub fn min(&mut self) -> Result<f64, StatsError> {
        self.percentile(0.0)
    }

    /// Largest observed value.
    pub fn max(&mut self) -> Result<f64, StatsError> {
        self.percentile(100.0)
    }

    /// Percentile `p` in `[0, 100]`, interpolating linearly between the two
    /// closest ranks (`rank = p / 100 * (n - 1)`).
    pub fn percentile(&mut self, p: f64) -> Result<f64, StatsError> {
        if !(0.0..=100.0).contains(&p) {
            return Err(StatsError::Configuration(format!(
                "percentile must be within [0, 100], got {p}"
            )));
        }
        self.ensure_non_empty()?;
        self.sort();
        let rank = p / 100.0 * (self.values.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let low = self.values[lower];
        let high = self.values[upper];
        Ok(low + (high - low) * (rank - lower as f64))
    }

    /// Mean, standard deviation, and the requested percentiles in one call.
    pub fn summary(&mut self, percentiles: &[f64]) -> Result<Summary, StatsError> {
        let mean = self.mean()?;
        let stdev = self.population_stdev()?;
        let percentiles = percentiles
            .iter()
            .map(|p| self.percentile(*p).map(|value| (*p, value)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Summary {
            count: self.len(),
            mean,
            stdev,
            percentiles,
        })
    }

    fn sort(&mut self) {
        if !self.sorted {
            self.values.sort_by(f64::total_cmp);
            self.sorted = true;
        }
    }

    fn ensure_non_empty(&self) -> Result<(), StatsError> {
        if self.values.is_empty() {
            return Err(StatsError::empty(&self.name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(values: &[f64]) -> RunningStatistics {
        let mut stats = RunningStatistics::new("test");
        for value in values {
            stats.push(*value);
        }
        stats
    }

    #[test]
    fn one_to_five_matches_reference_values() {
        let mut stats = filled(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(stats.mean().unwrap(), 3.0);
        assert!((stats.population_stdev().unwrap() - 1.414_213_562_373_095).abs() < 1e-12);
        assert_eq!(stats.percentile(50.0).unwrap(), 3.0);
    }

    #[test]
    fn percentile_bounds_are_min_and_max() {
        let mut stats = filled(&[7.0, -2.0, 11.5, 3.0]);
        assert_eq!(stats.percentile(0.0).unwrap(), -2.0);
        assert_eq!(stats.percentile(100.0).unwrap(), 11.5);
        assert_eq!(stats.min().unwrap(), -2.0);
        assert_eq!(stats.max().unwrap(), 11.5);
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        assert_eq!(filled(&[4.0, 1.0, 3.0, 2.0]).percentile(50.0).unwrap(), 2.5);
        assert_eq!(filled(&[9.0, 1.0, 5.0]).percentile(50.0).unwrap(), 5.0);
        assert_eq!(filled(&[42.0]).percentile(95.0).unwrap(), 42.0);
    }

    #[test]
    fn interpolation_matches_linear_definition() {
        let mut stats = filled(&(1..=10).map(f64::from).collect::<Vec<_>>());
        // rank = 0.95 * 9 = 8.55 -> 9 + 0.55 * (10 - 9)
        assert!((stats.percentile(95.0).unwrap() - 9.55).abs() < 1e-12);
        assert!((stats.percentile(99.0).unwrap() - 9.91).abs() < 1e-12);
    }

    #[test]
    fn empty_input_is_an_error_not_zero() {
        let mut stats = RunningStatistics::new("avg_app_size");
        stats.push(f64::NAN);
        assert_eq!(stats.ignored(), 1);
        match stats.mean() {
            Err(StatsError::EmptyInput { statistic }) => assert_eq!(statistic, "avg_app_size"),
            other => panic!("expected EmptyInput, got {other:?}"),
        }
        assert!(stats.percentile(50.0).is_err());
        assert!(stats.summary(&[95.0]).is_err());
    }

    #[test]
    fn out_of_range_percentile_is_rejected() {
        let mut stats = filled(&[1.0]);
        assert!(matches!(
            stats.percentile(101.0),
            Err(StatsError::Configuration(_))
        ));
        assert!(stats.percentile(-0.5).is_err());
    }

    #[test]
    fn values_pushed_after_a_query_are_included() {
        let mut stats = filled(&[5.0, 1.0]);
        assert_eq!(stats.max().unwrap(), 5.0);
        stats.push(9.0);
        stats.push(0.0);
        assert_eq!(stats.max().unwrap(), 9.0);
        assert_eq!(stats.min().unwrap(), 0.0);
        assert_eq!(stats.len(), 4);
    }

    #[test]
    fn summary_reports_requested_percentiles() {
        let mut stats = filled(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let summary = stats.summary(&[95.0, 99.0]).unwrap();
        assert_eq!(summary.count, 5);
        assert_eq!(summary.mean, 3.0);
        assert!((summary.percentile(95.0).unwrap() - 4.8).abs() < 1e-12);
        assert!((summary.percentile(99.0).unwrap() - 4.96).abs() < 1e-12);
        assert_eq!(summary.percentile(50.0), None);
    }
}
