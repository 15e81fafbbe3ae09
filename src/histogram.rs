//! Histogram bucketing for distribution reports.
//!
//! Two layouts are supported: [`DiscreteHistogram`] counts explicit keys, and
//! [`EdgeHistogram`] assigns numeric values to bins delimited by increasing
//! edges. Both keep the conservation invariant: the sum of bucket counts equals
//! the number of values that were bucketed. Values that cannot be bucketed are
//! dropped and counted separately, never silently merged into a bin.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::StatsError;

/// Counts per explicit key (integer counts, labels, months, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscreteHistogram<K: Ord> {
    counts: BTreeMap<K, u64>,
}

impl<K: Ord> DiscreteHistogram<K> {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Count one occurrence of `key`.
    pub fn add(&mut self, key: K) {
        self.add_count(key, 1);
    }

    /// Count `count` occurrences of `key`.
    pub fn add_count(&mut self, key: K, count: u64) {
        *self.counts.entry(key).or_insert(0) += count;
    }

    /// Count for `key` (0 when never seen).
    pub fn count(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct keys seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True when nothing was counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Seen keys with their counts, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(key, count)| (key, *count))
    }
}

impl DiscreteHistogram<i64> {
    /// Counts over the full integer range `[min_seen - 1, max_seen + 1]`,
    /// with unseen keys reported as 0. Empty histograms yield an empty range.
    pub fn dense_range(&self) -> Vec<(i64, u64)> {
        let (Some(min), Some(max)) = (self.counts.keys().next(), self.counts.keys().next_back())
        else {
            return Vec::new();
        };
        (min.saturating_sub(1)..=max.saturating_add(1))
            .map(|key| (key, self.count(&key)))
            .collect()
    }
}

impl<K: Ord + Serialize> DiscreteHistogram<K> {
    /// Buckets as `[[key, count], ...]` in key order.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.counts
                .iter()
                .map(|(key, count)| json!([key, count]))
                .collect(),
        )
    }
}

/// Policy for values that fall outside the edge range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutOfRange {
    /// Count the value in the nearest outermost bin.
    Clamp,
    /// Drop the value (it is counted in `dropped()` only).
    Drop,
}

/// One bin of an [`EdgeHistogram`]: values in `(lower, upper]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeBucket {
    /// Exclusive lower bound (`None` for the first bin without a configured floor).
    pub lower: Option<f64>,
    /// Inclusive upper edge.
    pub upper: f64,
    /// Number of values assigned to the bin.
    pub count: u64,
}

/// Histogram over explicit, strictly increasing bin edges.
///
/// A value is assigned to the first edge `>= value`. Values above the last
/// edge, or below the configured lower bound, are out of range and follow
/// the [`OutOfRange`] policy. NaN is always dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeHistogram {
    edges: Vec<f64>,
    lower_bound: Option<f64>,
    out_of_range: OutOfRange,
    counts: Vec<u64>,
    dropped: u64,
}

impl EdgeHistogram {
    /// Build from explicit edges. Edges must be finite and strictly increasing.
    pub fn with_edges(edges: Vec<f64>, out_of_range: OutOfRange) -> Result<Self, StatsError> {
        if edges.is_empty() {
            return Err(StatsError::Configuration(
                "histogram needs at least one bin edge".to_string(),
            ));
        }
        if edges.iter().any(|edge| !edge.is_finite()) {
            return Err(StatsError::Configuration(
                "histogram edges must be finite".to_string(),
            ));
        }
        if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(StatsError::Configuration(
                "histogram edges must be strictly increasing".to_string(),
            ));
        }
        let bins = edges.len();
        Ok(Self {
            edges,
            lower_bound: None,
            out_of_range,
            counts: vec![0; bins],
            dropped: 0,
        })
    }

    /// `bins` equal-width bins covering exactly `[lo, hi]`.
    ///
    /// The first bin also includes `lo` itself, so the full closed range is
    /// aligned to the bin grid without padding the data.
    pub fn uniform(lo: f64, hi: f64, bins: usize, out_of_range: OutOfRange) -> Result<Self, StatsError> {
        if bins == 0 || !(lo < hi) {
            return Err(StatsError::Configuration(format!(
                "uniform histogram needs bins > 0 and lo < hi (got bins={bins}, lo={lo}, hi={hi})"
            )));
        }
        let width = (hi - lo) / bins as f64;
        let mut edges: Vec<f64> = (1..bins).map(|idx| lo + width * idx as f64).collect();
        edges.push(hi);
        let mut histogram = Self::with_edges(edges, out_of_range)?;
        histogram.lower_bound = Some(lo);
        Ok(histogram)
    }

    /// Log-scale edges `mantissa * 10^k` for each `k` in `[min_exp, max_exp]`.
    pub fn log_decades(
        mantissas: &[f64],
        min_exp: i32,
        max_exp: i32,
        out_of_range: OutOfRange,
    ) -> Result<Self, StatsError> {
        let mut edges = Vec::new();
        for exp in min_exp..=max_exp {
            for mantissa in mantissas {
                edges.push(mantissa * 10f64.powi(exp));
            }
        }
        Self::with_edges(edges, out_of_range)
    }

    /// Set an inclusive floor; values below it are out of range.
    pub fn with_lower_bound(mut self, lower: f64) -> Self {
        self.lower_bound = Some(lower);
        self
    }

    /// Bucket a value. Returns the bin index, or `None` when dropped.
    pub fn add(&mut self, value: f64) -> Option<usize> {
        let Some(idx) = self.bin_for(value) else {
            self.dropped += 1;
            return None;
        };
        self.counts[idx] += 1;
        Some(idx)
    }

    /// Bin index `value` would be assigned to.
    pub fn bin_for(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        let last = self.edges.len() - 1;
        if let Some(lower) = self.lower_bound
            && value < lower
        {
            return match self.out_of_range {
                OutOfRange::Clamp => Some(0),
                OutOfRange::Drop => None,
            };
        }
        let idx = self.edges.partition_point(|edge| *edge < value);
        if idx > last {
            return match self.out_of_range {
                OutOfRange::Clamp => Some(last),
                OutOfRange::Drop => None,
            };
        }
        Some(idx)
    }

    /// Sum of bin counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Values refused by the range policy (or NaN).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Per-bin counts, aligned with `edges()`.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Bins with their bounds and counts.
    pub fn buckets(&self) -> Vec<EdgeBucket> {
        self.edges
            .iter()
            .zip(&self.counts)
            .enumerate()
            .map(|(idx, (upper, count))| EdgeBucket {
                lower: if idx == 0 {
                    self.lower_bound
                } else {
                    Some(self.edges[idx - 1])
                },
                upper: *upper,
                count: *count,
            })
            .collect()
    }

    /// Buckets as `[[upper_edge, count], ...]`.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.edges
                .iter()
                .zip(&self.counts)
                .map(|(edge, count)| json!([edge, count]))
                .collect(),
        )
    }
}

/// Histogram hand-off document consumed by an external plotting tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramArtifact {
    /// Figure title.
    pub title: String,
    /// X-axis label.
    pub x_label: String,
    /// Y-axis label.
    pub y_label: String,
    /// Buckets as `[[key, count], ...]`.
    pub buckets: Value,
}

impl HistogramArtifact {
    /// Bundle labels with rendered buckets.
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
        buckets: Value,
    ) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            buckets,
        }
    }

    /// JSON document handed to the plotting tool.
    pub fn to_value(&self) -> Value {
        json!({
            "title": self.title,
            "x_label": self.x_label,
            "y_label": self.y_label,
            "buckets": self.buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_counts_and_dense_range() {
        let mut histogram = DiscreteHistogram::new();
        for key in [2i64, 4, 4, 5] {
            histogram.add(key);
        }
        assert_eq!(histogram.total(), 4);
        assert_eq!(histogram.count(&4), 2);
        assert_eq!(histogram.count(&3), 0);
        assert_eq!(
            histogram.dense_range(),
            vec![(1, 0), (2, 1), (3, 0), (4, 2), (5, 1), (6, 0)]
        );
        assert!(DiscreteHistogram::<i64>::new().dense_range().is_empty());
    }

    #[test]
    fn discrete_json_is_key_ordered() {
        let mut histogram = DiscreteHistogram::new();
        histogram.add("2017-09".to_string());
        histogram.add("2016-01".to_string());
        histogram.add("2017-09".to_string());
        assert_eq!(histogram.to_json(), json!([["2016-01", 1], ["2017-09", 2]]));
    }

    #[test]
    fn edges_must_increase() {
        assert!(EdgeHistogram::with_edges(vec![], OutOfRange::Drop).is_err());
        assert!(EdgeHistogram::with_edges(vec![1.0, 1.0], OutOfRange::Drop).is_err());
        assert!(EdgeHistogram::with_edges(vec![1.0, f64::INFINITY], OutOfRange::Drop).is_err());
        assert!(EdgeHistogram::uniform(5.0, 1.0, 4, OutOfRange::Drop).is_err());
    }

    #[test]
    fn edge_assignment_uses_first_edge_at_or_above() {
        let mut histogram =
            EdgeHistogram::with_edges(vec![10.0, 100.0, 1000.0], OutOfRange::Drop).unwrap();
        assert_eq!(histogram.add(3.0), Some(0));
        assert_eq!(histogram.add(10.0), Some(0));
        assert_eq!(histogram.add(10.5), Some(1));
        assert_eq!(histogram.add(1000.0), Some(2));
        assert_eq!(histogram.add(5000.0), None);
        assert_eq!(histogram.add(f64::NAN), None);
        assert_eq!(histogram.counts(), &[2, 1, 1]);
        assert_eq!(histogram.dropped(), 2);
        assert_eq!(histogram.total(), 4);
    }

    #[test]
    fn clamp_policy_keeps_out_of_range_values() {
        let mut histogram = EdgeHistogram::with_edges(vec![10.0, 100.0], OutOfRange::Clamp)
            .unwrap()
            .with_lower_bound(1.0);
        histogram.add(0.5);
        histogram.add(1e9);
        assert_eq!(histogram.counts(), &[1, 1]);
        assert_eq!(histogram.dropped(), 0);
    }

    #[test]
    fn uniform_bins_align_to_closed_range() {
        let mut histogram = EdgeHistogram::uniform(1.0, 5.0, 16, OutOfRange::Drop).unwrap();
        assert_eq!(histogram.edges().len(), 16);
        assert_eq!(histogram.edges()[15], 5.0);
        assert_eq!(histogram.add(1.0), Some(0));
        assert_eq!(histogram.add(5.0), Some(15));
        assert_eq!(histogram.add(0.99), None);
        assert_eq!(histogram.add(3.0), Some(7));
        let buckets = histogram.buckets();
        assert_eq!(buckets[0].lower, Some(1.0));
        assert_eq!(buckets[1].lower, Some(1.25));
    }

    #[test]
    fn log_decades_build_expected_edges() {
        let histogram = EdgeHistogram::log_decades(&[1.0, 5.0], 3, 4, OutOfRange::Clamp).unwrap();
        assert_eq!(histogram.edges(), &[1e3, 5e3, 1e4, 5e4]);
    }

    #[test]
    fn conservation_holds_for_mixed_input() {
        let mut histogram = EdgeHistogram::with_edges(vec![1.0, 2.0, 3.0], OutOfRange::Drop).unwrap();
        let inputs = [0.5, 1.5, 2.5, 3.5, 2.0, f64::NAN, -4.0];
        let bucketed = inputs
            .iter()
            .filter(|value| histogram.add(**value).is_some())
            .count();
        assert_eq!(histogram.total(), bucketed as u64);
        assert_eq!(histogram.total() + histogram.dropped(), inputs.len() as u64);
    }
}
