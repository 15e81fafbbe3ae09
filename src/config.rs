use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::graph::DEFAULT_HOP_SOURCES;
use crate::constants::source::{DEFAULT_SOURCE_ID, RETRY_ATTEMPTS, RETRY_DELAY_MS};
use crate::constants::stats::{
    DEFAULT_GRAPH_TOP_N, DEFAULT_PERCENTILES, DEFAULT_TITLE, DEFAULT_TOP_K,
};
use crate::errors::StatsError;
use crate::source::{PackageFilter, RetryPolicy};
use crate::types::{GroupName, RecordId, SourceId};

/// How stale record groups share traversals of the record source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassMode {
    /// One traversal feeds every stale group.
    #[default]
    Fused,
    /// Each stale group gets its own traversal; a source failure only
    /// affects the group whose pass it interrupted.
    PerGroup,
}

/// Recompute policy shared by catalog and graph reports.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecomputePolicy {
    /// Recompute every group even when cached.
    pub overwrite: bool,
    /// Groups the caller names as stale regardless of cache state.
    pub force_groups: Vec<GroupName>,
}

impl RecomputePolicy {
    /// True when `group` must be recomputed regardless of the cache.
    pub fn forces(&self, group: &str) -> bool {
        self.overwrite || self.force_groups.iter().any(|name| name == group)
    }
}

/// Catalog statistics configuration.
#[derive(Clone, Debug)]
pub struct StatsConfig {
    /// Prefix of every output file (`<prefix>.db_statistics.json`, ...).
    pub output_prefix: PathBuf,
    /// Title used only to label histogram artifacts.
    pub title: String,
    /// Optional package-id restriction.
    pub packages: Option<Vec<RecordId>>,
    /// Recompute policy.
    pub recompute: RecomputePolicy,
    /// Size of every bounded ranking.
    pub top_k: usize,
    /// Percentiles reported next to mean and standard deviation.
    pub percentiles: Vec<f64>,
    /// Traversal sharing strategy.
    pub pass_mode: PassMode,
}

impl StatsConfig {
    /// Config writing artifacts next to `output_prefix`.
    pub fn new(output_prefix: impl Into<PathBuf>) -> Self {
        Self {
            output_prefix: output_prefix.into(),
            title: DEFAULT_TITLE.to_string(),
            packages: None,
            recompute: RecomputePolicy::default(),
            top_k: DEFAULT_TOP_K,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            pass_mode: PassMode::default(),
        }
    }

    /// Override the artifact title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Restrict the report to `packages`.
    pub fn with_packages(mut self, packages: Vec<RecordId>) -> Self {
        self.packages = Some(packages);
        self
    }

    /// Recompute every group.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.recompute.overwrite = overwrite;
        self
    }

    /// Mark one group as stale.
    pub fn with_forced_group(mut self, group: impl Into<GroupName>) -> Self {
        self.recompute.force_groups.push(group.into());
        self
    }

    /// Override the ranking size.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Override the reported percentiles.
    pub fn with_percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.percentiles = percentiles;
        self
    }

    /// Override the traversal strategy.
    pub fn with_pass_mode(mut self, pass_mode: PassMode) -> Self {
        self.pass_mode = pass_mode;
        self
    }

    /// Package filter derived from `packages`.
    pub fn package_filter(&self) -> Option<PackageFilter> {
        self.packages
            .as_ref()
            .map(|packages| PackageFilter::new(packages.iter().cloned()))
    }

    /// Validate ranges before any pass starts.
    pub fn validate(&self) -> Result<(), StatsError> {
        if let Some(p) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(StatsError::Configuration(format!(
                "percentile {p} is outside [0, 100]"
            )));
        }
        if self.top_k == 0 {
            return Err(StatsError::Configuration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Graph statistics configuration.
#[derive(Clone, Debug)]
pub struct GraphStatsConfig {
    /// Size of every centrality ranking.
    pub top_n: usize,
    /// Recompute policy.
    pub recompute: RecomputePolicy,
    /// Whether the (expensive upstream) betweenness ranking is reported.
    pub compute_betweenness: bool,
    /// BFS sources sampled for the hop distribution.
    pub hop_sources: usize,
}

impl Default for GraphStatsConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_GRAPH_TOP_N,
            recompute: RecomputePolicy::default(),
            compute_betweenness: false,
            hop_sources: DEFAULT_HOP_SOURCES,
        }
    }
}

impl GraphStatsConfig {
    /// Override the ranking size.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Recompute every group.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.recompute.overwrite = overwrite;
        self
    }

    /// Mark one group as stale.
    pub fn with_forced_group(mut self, group: impl Into<GroupName>) -> Self {
        self.recompute.force_groups.push(group.into());
        self
    }

    /// Report the betweenness ranking.
    pub fn with_betweenness(mut self, compute_betweenness: bool) -> Self {
        self.compute_betweenness = compute_betweenness;
        self
    }

    /// Override the number of hop distribution sources.
    pub fn with_hop_sources(mut self, hop_sources: usize) -> Self {
        self.hop_sources = hop_sources;
        self
    }
}

/// Record source settings, loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source identifier used in logs.
    pub source_id: SourceId,
    /// JSON-lines catalog dump.
    pub records_path: PathBuf,
    /// Attempts before a transient failure becomes terminal.
    pub retry_attempts: usize,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_id: DEFAULT_SOURCE_ID.to_string(),
            records_path: PathBuf::from("records.jsonl"),
            retry_attempts: RETRY_ATTEMPTS,
            retry_delay_ms: RETRY_DELAY_MS,
        }
    }
}

impl SourceConfig {
    /// Load from `path`. A missing file logs a warning and yields defaults;
    /// a present but invalid file is a configuration error.
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "[appstats:config] missing source configuration ({}); using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| {
            StatsError::Configuration(format!(
                "invalid source configuration {}: {err}",
                path.display()
            ))
        })
    }

    /// Override the records path.
    pub fn with_records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = path.into();
        self
    }

    /// Retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}
