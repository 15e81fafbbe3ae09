#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Persisted statistics cache documents.
pub mod cache;
/// Catalog statistic groups and the catalog report entry point.
pub mod catalog;
/// Command line runner shared by the `appstats` binary.
pub mod cli;
/// Report, graph, and record source configuration.
pub mod config;
/// Centralized constants (file suffixes, retry policy, field paths, bin edges).
pub mod constants;
/// Record and scalar value types.
pub mod data;
/// Upload-date parsing helpers.
pub mod dates;
/// Field path parsing, extraction, and projection.
pub mod extract;
/// Similarity graph build and persistence.
pub mod graph;
/// Graph statistics over the graph structure and score tables.
pub mod graph_stats;
/// Discrete and edge-based histogram bucketing.
pub mod histogram;
/// Freshness checks, record passes, and persistence of statistic groups.
pub mod orchestrator;
/// Top-N reduction over score tables.
pub mod ranking;
/// Running mean, standard deviation, and percentiles.
pub mod running;
/// Record source traits and built-in sources.
pub mod source;
/// Components, clustering, k-cores, and hop counts over a similarity graph.
pub mod structure;
/// Bounded top/bottom-K selection.
pub mod topk;
/// Input transports used by sources (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use cache::{CacheDocument, StatisticsCache};
pub use catalog::compute_catalog_statistics;
pub use config::{GraphStatsConfig, PassMode, RecomputePolicy, SourceConfig, StatsConfig};
pub use data::{Record, ScalarValue};
pub use errors::StatsError;
pub use extract::{FieldPath, extract};
pub use graph::{GraphBuildContext, SimilarityGraph, build_graph};
pub use graph_stats::{ScoreFileProvider, ScoreProvider, compute_graph_statistics, top_packages};
pub use histogram::{DiscreteHistogram, EdgeHistogram, OutOfRange};
pub use orchestrator::{
    GroupAccumulator, GroupOutput, GroupSpec, GroupState, RunReport, StatisticGroup,
    StatisticsOrchestrator, TableGroup,
};
pub use ranking::{resolve_labels, top_n};
pub use running::RunningStatistics;
pub use source::{InMemorySource, JsonLinesSource, PackageFilter, RecordSource, RetryingSource};
pub use topk::{BoundedTopK, Selection, TopKEntry};
pub use types::{GroupName, MetricName, NodeId, RecordId, SourceId, StatKey};
