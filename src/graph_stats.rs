//! Graph statistics over the similarity graph and precomputed score tables.
//!
//! Centrality scores (PageRank, betweenness, HITS) come from an external graph
//! library as score-table files. Degrees, components, clustering, k-cores, and
//! hop counts are computed from the graph itself.
//! Every group is a [`TableGroup`], so freshness and persistence go through the
//! same orchestrator as the catalog report.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cache::{StatisticsCache, suffixed};
use crate::config::{GraphStatsConfig, PassMode};
use crate::constants::cache::{GRAPH_CACHE_SUFFIX, HISTOGRAM_ARTIFACT_SUFFIX};
use crate::constants::graph::{
    EFFECTIVE_DIAMETER_QUANTILE, GRAPH_PLOT_TITLE, METRIC_BETWEENNESS, METRIC_HITS_AUTHORITIES,
    METRIC_HITS_HUBS, METRIC_IN_DEGREE, METRIC_OUT_DEGREE, METRIC_PAGERANK,
};
use crate::errors::StatsError;
use crate::graph::{SimilarityGraph, graph_name};
use crate::histogram::{DiscreteHistogram, HistogramArtifact};
use crate::orchestrator::{GroupOutput, GroupSpec, RunReport, StatisticsOrchestrator, TableGroup};
use crate::ranking::{ScoreTable, labelled, top_n_table};
use crate::structure::{Adjacency, GraphSummary, cumulative, effective_diameter};
use crate::types::{Label, StatKey};

/// Source of `node id -> score` tables.
pub trait ScoreProvider {
    /// Score table for `metric`.
    fn score_table(&self, metric: &str) -> Result<ScoreTable, StatsError>;
}

/// Reads `<dir>/<graph_name>_<metric>.json` tables (`{"<node id>": score}`).
#[derive(Clone, Debug)]
pub struct ScoreFileProvider {
    dir: PathBuf,
    graph_name: String,
}

impl ScoreFileProvider {
    /// Provider for tables of `graph_name` stored in `dir`.
    pub fn new(dir: impl Into<PathBuf>, graph_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            graph_name: graph_name.into(),
        }
    }

    /// Path of the table for `metric`.
    pub fn table_path(&self, metric: &str) -> PathBuf {
        self.dir.join(format!("{}_{metric}.json", self.graph_name))
    }
}

impl ScoreProvider for ScoreFileProvider {
    fn score_table(&self, metric: &str) -> Result<ScoreTable, StatsError> {
        let path = self.table_path(metric);
        let raw = fs::read_to_string(&path).map_err(|err| StatsError::SourceUnavailable {
            source_id: path.display().to_string(),
            reason: format!("missing '{metric}' score table: {err}"),
        })?;
        let table: ScoreTable =
            serde_json::from_str(&raw).map_err(|err| StatsError::SourceInconsistent {
                source_id: path.display().to_string(),
                details: format!("invalid '{metric}' score table: {err}"),
            })?;
        debug!(
            "[appstats:graph] loaded {} '{}' scores from {}",
            table.len(),
            metric,
            path.display()
        );
        Ok(table)
    }
}

/// Serves `in_degree` / `out_degree` straight from a graph.
pub struct DegreeScores<'a> {
    graph: &'a SimilarityGraph,
}

impl<'a> DegreeScores<'a> {
    /// Degree provider for `graph`.
    pub fn new(graph: &'a SimilarityGraph) -> Self {
        Self { graph }
    }
}

impl ScoreProvider for DegreeScores<'_> {
    fn score_table(&self, metric: &str) -> Result<ScoreTable, StatsError> {
        match metric {
            METRIC_IN_DEGREE => Ok(SimilarityGraph::degree_scores(&self.graph.in_degrees())),
            METRIC_OUT_DEGREE => Ok(SimilarityGraph::degree_scores(&self.graph.out_degrees())),
            other => Err(StatsError::Configuration(format!(
                "degree scores do not serve metric '{other}'"
            ))),
        }
    }
}

/// Edge direction a degree group looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Incoming edges.
    In,
    /// Outgoing edges.
    Out,
}

impl Direction {
    fn word(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    fn metric(self) -> &'static str {
        match self {
            Direction::In => METRIC_IN_DEGREE,
            Direction::Out => METRIC_OUT_DEGREE,
        }
    }
}

/// Node with the highest degree: `max_<dir>_degree`, `_id`, `_pkg`.
pub struct MaxDegreeGroup<'a> {
    name: String,
    direction: Direction,
    graph: &'a SimilarityGraph,
}

impl<'a> MaxDegreeGroup<'a> {
    /// Group for `direction` over `graph`.
    pub fn new(graph: &'a SimilarityGraph, direction: Direction) -> Self {
        Self {
            name: format!("max_{}_degree", direction.word()),
            direction,
            graph,
        }
    }
}

impl GroupSpec for MaxDegreeGroup<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_keys(&self) -> Vec<StatKey> {
        vec![
            self.name.clone(),
            format!("{}_id", self.name),
            format!("{}_pkg", self.name),
        ]
    }
}

impl TableGroup for MaxDegreeGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        let table = DegreeScores::new(self.graph).score_table(self.direction.metric())?;
        let Some((id, degree)) = top_n_table(&table, 1).into_iter().next() else {
            return Err(StatsError::empty(self.name.as_str()));
        };
        Ok(GroupOutput::new()
            .stat(self.name.clone(), json!(degree as u64))
            .stat(format!("{}_id", self.name), json!(id))
            .stat(format!("{}_pkg", self.name), json!(self.graph.label(id))))
    }
}

/// Top-N rankings over provider metrics, labelled with package names.
pub struct CentralityGroup<'a> {
    name: &'static str,
    /// `(cache key, metric)` pairs.
    rankings: Vec<(&'static str, &'static str)>,
    top_n: usize,
    graph: &'a SimilarityGraph,
    provider: &'a dyn ScoreProvider,
}

impl<'a> CentralityGroup<'a> {
    fn new(
        name: &'static str,
        rankings: Vec<(&'static str, &'static str)>,
        top_n: usize,
        graph: &'a SimilarityGraph,
        provider: &'a dyn ScoreProvider,
    ) -> Self {
        Self {
            name,
            rankings,
            top_n,
            graph,
            provider,
        }
    }

    /// `top_n_pagerank`
    pub fn pagerank(top_n: usize, graph: &'a SimilarityGraph, provider: &'a dyn ScoreProvider) -> Self {
        Self::new("pagerank", vec![("top_n_pagerank", METRIC_PAGERANK)], top_n, graph, provider)
    }

    /// `top_n_betweenness`
    pub fn betweenness(
        top_n: usize,
        graph: &'a SimilarityGraph,
        provider: &'a dyn ScoreProvider,
    ) -> Self {
        Self::new(
            "betweenness",
            vec![("top_n_betweenness", METRIC_BETWEENNESS)],
            top_n,
            graph,
            provider,
        )
    }

    /// `top_n_hits_hubs` and `top_n_hits_authorities`
    pub fn hits(top_n: usize, graph: &'a SimilarityGraph, provider: &'a dyn ScoreProvider) -> Self {
        Self::new(
            "hits",
            vec![
                ("top_n_hits_hubs", METRIC_HITS_HUBS),
                ("top_n_hits_authorities", METRIC_HITS_AUTHORITIES),
            ],
            top_n,
            graph,
            provider,
        )
    }
}

impl GroupSpec for CentralityGroup<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn required_keys(&self) -> Vec<StatKey> {
        self.rankings.iter().map(|(key, _)| key.to_string()).collect()
    }
}

impl TableGroup for CentralityGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        let mut output = GroupOutput::new();
        for (key, metric) in &self.rankings {
            let table = self.provider.score_table(metric)?;
            let ranking = labelled(&top_n_table(&table, self.top_n), self.graph.labels());
            output = output.stat(
                *key,
                Value::Array(
                    ranking
                        .into_iter()
                        .map(|(label, score)| json!([label, score]))
                        .collect(),
                ),
            );
        }
        Ok(output)
    }
}

/// Degree distribution artifact (`<dir>/<graph>_<dir>degree.histogram.json`).
pub struct DegreeDistributionGroup<'a> {
    name: String,
    direction: Direction,
    graph: &'a SimilarityGraph,
    artifact: PathBuf,
}

impl<'a> DegreeDistributionGroup<'a> {
    /// Group writing the `direction` degree distribution next to `graph_prefix`.
    pub fn new(graph: &'a SimilarityGraph, direction: Direction, graph_prefix: &Path) -> Self {
        Self {
            name: format!("{}_degree_distribution", direction.word()),
            direction,
            graph,
            artifact: suffixed(
                graph_prefix,
                &format!("_{}degree{HISTOGRAM_ARTIFACT_SUFFIX}", direction.word()),
            ),
        }
    }
}

impl GroupSpec for DegreeDistributionGroup<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_keys(&self) -> Vec<StatKey> {
        Vec::new()
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.artifact.clone())
    }
}

impl TableGroup for DegreeDistributionGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        let degrees = match self.direction {
            Direction::In => self.graph.in_degrees(),
            Direction::Out => self.graph.out_degrees(),
        };
        if degrees.is_empty() {
            return Err(StatsError::empty(self.name.as_str()));
        }
        let mut histogram = DiscreteHistogram::new();
        for degree in degrees.values() {
            histogram.add(*degree);
        }
        let artifact = HistogramArtifact::new(
            format!("{GRAPH_PLOT_TITLE} - {}-degree distribution", self.direction.word()),
            format!("{}-degree", self.direction.word()),
            "# nodes",
            histogram.to_json(),
        );
        Ok(GroupOutput::new().with_artifact(artifact.to_value()))
    }
}

fn artifact_for(graph_prefix: &Path, suffix: &str) -> PathBuf {
    suffixed(graph_prefix, &format!("_{suffix}{HISTOGRAM_ARTIFACT_SUFFIX}"))
}

/// `main_statistics`: node, edge, triad, and component counts.
pub struct GraphSummaryGroup<'a> {
    graph: &'a SimilarityGraph,
    adjacency: &'a Adjacency,
}

impl<'a> GraphSummaryGroup<'a> {
    /// Summary of `graph`; `adjacency` must have been built from it.
    pub fn new(graph: &'a SimilarityGraph, adjacency: &'a Adjacency) -> Self {
        Self { graph, adjacency }
    }
}

impl GroupSpec for GraphSummaryGroup<'_> {
    fn name(&self) -> &str {
        "main_statistics"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        vec!["main_statistics".to_string()]
    }
}

impl TableGroup for GraphSummaryGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        if self.graph.node_count() == 0 {
            return Err(StatsError::empty("main_statistics"));
        }
        let summary = GraphSummary::compute(self.graph, self.adjacency);
        let value = serde_json::to_value(&summary).map_err(|err| StatsError::Cache {
            path: "main_statistics".to_string(),
            reason: format!("failed encoding graph summary: {err}"),
        })?;
        Ok(GroupOutput::new().stat("main_statistics", value))
    }
}

/// Component kind a distribution group looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Strongly connected components (edge direction followed).
    Strong,
    /// Weakly connected components (direction ignored).
    Weak,
}

impl Connectivity {
    fn tag(self) -> &'static str {
        match self {
            Connectivity::Strong => "scc",
            Connectivity::Weak => "wcc",
        }
    }
}

/// Component size distribution: `n_<scc|wcc>`, `largest_<scc|wcc>`, and
/// `<graph>_<scc|wcc>.histogram.json`.
pub struct ComponentDistributionGroup<'a> {
    name: String,
    connectivity: Connectivity,
    adjacency: &'a Adjacency,
    artifact: PathBuf,
}

impl<'a> ComponentDistributionGroup<'a> {
    /// Group for `connectivity` writing next to `graph_prefix`.
    pub fn new(adjacency: &'a Adjacency, connectivity: Connectivity, graph_prefix: &Path) -> Self {
        Self {
            name: format!("{}_distribution", connectivity.tag()),
            connectivity,
            adjacency,
            artifact: artifact_for(graph_prefix, connectivity.tag()),
        }
    }
}

impl GroupSpec for ComponentDistributionGroup<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_keys(&self) -> Vec<StatKey> {
        let tag = self.connectivity.tag();
        vec![format!("n_{tag}"), format!("largest_{tag}")]
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.artifact.clone())
    }
}

impl TableGroup for ComponentDistributionGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        let components = match self.connectivity {
            Connectivity::Strong => self.adjacency.strong_components(),
            Connectivity::Weak => self.adjacency.weak_components(),
        };
        let mut histogram = DiscreteHistogram::new();
        for component in &components {
            histogram.add(component.len() as u64);
        }
        let Some(largest) = components.iter().map(Vec::len).max() else {
            return Err(StatsError::empty(self.name.as_str()));
        };
        let tag = self.connectivity.tag();
        let artifact = HistogramArtifact::new(
            format!("{GRAPH_PLOT_TITLE} - {} size distribution", tag.to_uppercase()),
            "component size (nodes)",
            "# components",
            histogram.to_json(),
        );
        Ok(GroupOutput::new()
            .stat(format!("n_{tag}"), json!(components.len()))
            .stat(format!("largest_{tag}"), json!(largest))
            .with_artifact(artifact.to_value()))
    }
}

/// Average clustering coefficient per undirected degree
/// (`<graph>_cf.histogram.json`) and `avg_clustering_coefficient`.
pub struct ClusteringGroup<'a> {
    adjacency: &'a Adjacency,
    artifact: PathBuf,
}

impl<'a> ClusteringGroup<'a> {
    /// Group writing next to `graph_prefix`.
    pub fn new(adjacency: &'a Adjacency, graph_prefix: &Path) -> Self {
        Self {
            adjacency,
            artifact: artifact_for(graph_prefix, "cf"),
        }
    }
}

impl GroupSpec for ClusteringGroup<'_> {
    fn name(&self) -> &str {
        "clustering_coefficient"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        vec!["avg_clustering_coefficient".to_string()]
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.artifact.clone())
    }
}

impl TableGroup for ClusteringGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        if self.adjacency.is_empty() {
            return Err(StatsError::empty("clustering_coefficient"));
        }
        let coefficients = self.adjacency.clustering_coefficients();
        let mut by_degree: BTreeMap<usize, (f64, u64)> = BTreeMap::new();
        let degrees = self.adjacency.undirected_degrees();
        for (degree, coefficient) in degrees.into_iter().zip(&coefficients) {
            let slot = by_degree.entry(degree).or_insert((0.0, 0));
            slot.0 += coefficient;
            slot.1 += 1;
        }
        let average = coefficients.iter().sum::<f64>() / coefficients.len() as f64;
        let buckets = by_degree
            .into_iter()
            .map(|(degree, (sum, nodes))| json!([degree, sum / nodes as f64]))
            .collect();
        let artifact = HistogramArtifact::new(
            format!("{GRAPH_PLOT_TITLE} - clustering coefficient"),
            "node degree",
            "average clustering coefficient",
            Value::Array(buckets),
        );
        Ok(GroupOutput::new()
            .stat("avg_clustering_coefficient", json!(average))
            .with_artifact(artifact.to_value()))
    }
}

/// Cumulative reachable pairs per hop from sampled sources
/// (`<graph>_hops.histogram.json`), plus `effective_diameter_90` and
/// `max_observed_hops`.
pub struct HopDistributionGroup<'a> {
    adjacency: &'a Adjacency,
    sources: usize,
    artifact: PathBuf,
}

impl<'a> HopDistributionGroup<'a> {
    /// Group running BFS from up to `sources` nodes.
    pub fn new(adjacency: &'a Adjacency, sources: usize, graph_prefix: &Path) -> Self {
        Self {
            adjacency,
            sources,
            artifact: artifact_for(graph_prefix, "hops"),
        }
    }
}

impl GroupSpec for HopDistributionGroup<'_> {
    fn name(&self) -> &str {
        "hop_distribution"
    }

    fn required_keys(&self) -> Vec<StatKey> {
        vec![
            "effective_diameter_90".to_string(),
            "max_observed_hops".to_string(),
        ]
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.artifact.clone())
    }
}

impl TableGroup for HopDistributionGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        let sources = self.adjacency.sample_sources(self.sources);
        let reached = cumulative(&self.adjacency.hop_counts(&sources));
        let Some(diameter) = effective_diameter(&reached, EFFECTIVE_DIAMETER_QUANTILE) else {
            return Err(StatsError::empty("hop_distribution"));
        };
        debug!(
            "[appstats:graph] hop distribution from {} sources, {} hops",
            sources.len(),
            reached.len()
        );
        let buckets = reached
            .iter()
            .enumerate()
            .map(|(idx, pairs)| json!([idx + 1, pairs]))
            .collect();
        let artifact = HistogramArtifact::new(
            format!("{GRAPH_PLOT_TITLE} - hop distribution"),
            "number of hops",
            "# reachable pairs",
            Value::Array(buckets),
        );
        Ok(GroupOutput::new()
            .stat("effective_diameter_90", json!(diameter))
            .stat("max_observed_hops", json!(reached.len()))
            .with_artifact(artifact.to_value()))
    }
}

/// What a k-core distribution counts for each k.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreMeasure {
    /// Nodes in the k-core.
    Nodes,
    /// Undirected edges in the k-core.
    Edges,
}

impl CoreMeasure {
    fn word(self) -> &'static str {
        match self {
            CoreMeasure::Nodes => "nodes",
            CoreMeasure::Edges => "edges",
        }
    }
}

/// K-core size per k (`<graph>_kcore_<nodes|edges>.histogram.json`); the
/// node variant also reports `max_core`.
pub struct CoreDistributionGroup<'a> {
    name: String,
    measure: CoreMeasure,
    adjacency: &'a Adjacency,
    artifact: PathBuf,
}

impl<'a> CoreDistributionGroup<'a> {
    /// Group counting `measure` per k, writing next to `graph_prefix`.
    pub fn new(adjacency: &'a Adjacency, measure: CoreMeasure, graph_prefix: &Path) -> Self {
        let name = format!("kcore_{}", measure.word());
        Self {
            artifact: artifact_for(graph_prefix, &name),
            name,
            measure,
            adjacency,
        }
    }
}

impl GroupSpec for CoreDistributionGroup<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_keys(&self) -> Vec<StatKey> {
        match self.measure {
            CoreMeasure::Nodes => vec!["max_core".to_string()],
            CoreMeasure::Edges => Vec::new(),
        }
    }

    fn artifact_path(&self) -> Option<PathBuf> {
        Some(self.artifact.clone())
    }
}

impl TableGroup for CoreDistributionGroup<'_> {
    fn compute(&self) -> Result<GroupOutput, StatsError> {
        if self.adjacency.is_empty() {
            return Err(StatsError::empty(self.name.as_str()));
        }
        let cores = self.adjacency.core_numbers();
        let max_core = cores.iter().copied().max().unwrap_or(0);
        let mut sizes = vec![0u64; max_core + 1];
        match self.measure {
            CoreMeasure::Nodes => {
                for core in &cores {
                    sizes[*core] += 1;
                }
            }
            CoreMeasure::Edges => {
                for (src, dst) in self.adjacency.undirected_edges() {
                    sizes[cores[src].min(cores[dst])] += 1;
                }
            }
        }
        // The k-core holds everything whose core number is at least k.
        for k in (0..max_core).rev() {
            sizes[k] += sizes[k + 1];
        }
        let buckets = sizes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, size)| json!([k, size]))
            .collect();
        let artifact = HistogramArtifact::new(
            format!("{GRAPH_PLOT_TITLE} - k-core {}", self.measure.word()),
            "k",
            format!("# {} in the k-core", self.measure.word()),
            Value::Array(buckets),
        );
        let mut output = GroupOutput::new().with_artifact(artifact.to_value());
        if self.measure == CoreMeasure::Nodes {
            output = output.stat("max_core", json!(max_core));
        }
        Ok(output)
    }
}

/// Compute the graph report for the graph stored at `graph_path`.
///
/// The cache document is `<dir>/<graph_name>_statistics.json`.
pub fn compute_graph_statistics(
    graph_path: &Path,
    provider: &dyn ScoreProvider,
    config: &GraphStatsConfig,
) -> Result<RunReport, StatsError> {
    let graph = SimilarityGraph::load(graph_path)?;
    let name = graph_name(graph_path);
    let dir = graph_path.parent().unwrap_or_else(|| Path::new("."));
    let prefix = dir.join(&name);
    info!(
        "[appstats:graph] statistics for '{}' ({} nodes, {} edges)",
        name,
        graph.node_count(),
        graph.edge_count()
    );

    let max_in = MaxDegreeGroup::new(&graph, Direction::In);
    let max_out = MaxDegreeGroup::new(&graph, Direction::Out);
    let pagerank = CentralityGroup::pagerank(config.top_n, &graph, provider);
    let betweenness = CentralityGroup::betweenness(config.top_n, &graph, provider);
    let hits = CentralityGroup::hits(config.top_n, &graph, provider);
    let in_distribution = DegreeDistributionGroup::new(&graph, Direction::In, &prefix);
    let out_distribution = DegreeDistributionGroup::new(&graph, Direction::Out, &prefix);

    let adjacency = Adjacency::new(&graph);
    let summary = GraphSummaryGroup::new(&graph, &adjacency);
    let scc = ComponentDistributionGroup::new(&adjacency, Connectivity::Strong, &prefix);
    let wcc = ComponentDistributionGroup::new(&adjacency, Connectivity::Weak, &prefix);
    let clustering = ClusteringGroup::new(&adjacency, &prefix);
    let hops = HopDistributionGroup::new(&adjacency, config.hop_sources, &prefix);
    let core_edges = CoreDistributionGroup::new(&adjacency, CoreMeasure::Edges, &prefix);
    let core_nodes = CoreDistributionGroup::new(&adjacency, CoreMeasure::Nodes, &prefix);

    let mut groups: Vec<&dyn TableGroup> =
        vec![&summary as &dyn TableGroup, &max_in, &max_out, &pagerank];
    if config.compute_betweenness {
        groups.push(&betweenness);
    }
    groups.extend([
        &hits as &dyn TableGroup,
        &in_distribution,
        &out_distribution,
        &scc,
        &wcc,
        &clustering,
        &hops,
        &core_edges,
        &core_nodes,
    ]);

    let mut orchestrator = StatisticsOrchestrator::new(
        StatisticsCache::new(suffixed(&prefix, GRAPH_CACHE_SUFFIX)),
        config.recompute.clone(),
        PassMode::PerGroup,
    );
    orchestrator.run_tables(&groups)
}

/// Labels of the `n` nodes with the highest PageRank, descending.
pub fn top_packages(
    graph: &SimilarityGraph,
    provider: &dyn ScoreProvider,
    n: usize,
) -> Result<Vec<Label>, StatsError> {
    let table = provider.score_table(METRIC_PAGERANK)?;
    Ok(labelled(&top_n_table(&table, n), graph.labels())
        .into_iter()
        .map(|(label, _)| label)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuildContext;
    use indexmap::IndexMap;

    struct FixedScores(IndexMap<&'static str, ScoreTable>);

    impl ScoreProvider for FixedScores {
        fn score_table(&self, metric: &str) -> Result<ScoreTable, StatsError> {
            self.0.get(metric).cloned().ok_or_else(|| StatsError::SourceUnavailable {
                source_id: "fixed".into(),
                reason: format!("no table for {metric}"),
            })
        }
    }

    fn graph() -> SimilarityGraph {
        let mut context = GraphBuildContext::new();
        let a = context.node_id("com.a");
        let b = context.node_id("com.b");
        let c = context.node_id("com.c");
        context.into_graph(vec![(a, b), (a, c), (b, c), (c, a), (a, c)])
    }

    #[test]
    fn max_degree_reports_id_and_package() {
        let graph = graph();
        let output = MaxDegreeGroup::new(&graph, Direction::In).compute().unwrap();
        assert_eq!(output.statistics["max_in_degree"], json!(3));
        assert_eq!(output.statistics["max_in_degree_id"], json!(2));
        assert_eq!(output.statistics["max_in_degree_pkg"], json!("com.c"));
    }

    #[test]
    fn centrality_rankings_are_labelled_and_descending() {
        let graph = graph();
        let scores = FixedScores(IndexMap::from([
            (METRIC_PAGERANK, ScoreTable::from([(0, 0.2), (1, 0.5), (2, 0.3)])),
            (METRIC_HITS_HUBS, ScoreTable::from([(0, 0.9), (1, 0.1)])),
            (METRIC_HITS_AUTHORITIES, ScoreTable::from([(2, 1.0)])),
        ]));
        let output = CentralityGroup::pagerank(2, &graph, &scores).compute().unwrap();
        assert_eq!(
            output.statistics["top_n_pagerank"],
            json!([["com.b", 0.5], ["com.c", 0.3]])
        );
        let hits = CentralityGroup::hits(2, &graph, &scores).compute().unwrap();
        assert_eq!(hits.statistics["top_n_hits_authorities"], json!([["com.c", 1.0]]));
        assert_eq!(
            top_packages(&graph, &scores, 3).unwrap(),
            vec!["com.b", "com.c", "com.a"]
        );
    }

    #[test]
    fn missing_score_table_fails_the_group() {
        let graph = graph();
        let scores = FixedScores(IndexMap::new());
        assert!(CentralityGroup::betweenness(5, &graph, &scores).compute().is_err());
    }

    #[test]
    fn degree_scores_only_serve_degrees() {
        let graph = graph();
        let scores = DegreeScores::new(&graph);
        assert_eq!(scores.score_table(METRIC_OUT_DEGREE).unwrap()[&0], 3.0);
        assert!(matches!(
            scores.score_table(METRIC_PAGERANK),
            Err(StatsError::Configuration(_))
        ));
    }

    #[test]
    fn structure_groups_report_components_cores_and_hops() {
        let temp = tempfile::tempdir().unwrap();
        let prefix = temp.path().join("play");
        let graph = graph();
        let adjacency = Adjacency::new(&graph);

        let scc = ComponentDistributionGroup::new(&adjacency, Connectivity::Strong, &prefix);
        assert!(scc.artifact_path().unwrap().ends_with("play_scc.histogram.json"));
        let output = scc.compute().unwrap();
        assert_eq!(output.statistics["n_scc"], json!(1));
        assert_eq!(output.statistics["largest_scc"], json!(3));

        let clustering = ClusteringGroup::new(&adjacency, &prefix).compute().unwrap();
        assert_eq!(clustering.statistics["avg_clustering_coefficient"], json!(1.0));

        let cores = CoreDistributionGroup::new(&adjacency, CoreMeasure::Edges, &prefix);
        assert!(cores.required_keys().is_empty());
        let artifact = cores.compute().unwrap().artifact.unwrap();
        assert_eq!(artifact["buckets"], json!([[1, 3], [2, 3]]));

        let hops = HopDistributionGroup::new(&adjacency, 10, &prefix).compute().unwrap();
        let diameter = hops.statistics["effective_diameter_90"].as_f64().unwrap();
        assert!((diameter - 1.7).abs() < 1e-12);
        assert_eq!(hops.statistics["max_observed_hops"], json!(2));
    }

    #[test]
    fn structure_groups_fail_on_empty_graphs() {
        let graph = GraphBuildContext::new().into_graph(Vec::new());
        let adjacency = Adjacency::new(&graph);
        let prefix = Path::new("empty");
        assert!(GraphSummaryGroup::new(&graph, &adjacency).compute().is_err());
        assert!(ClusteringGroup::new(&adjacency, prefix).compute().is_err());
        assert!(HopDistributionGroup::new(&adjacency, 10, prefix).compute().is_err());
        assert!(
            ComponentDistributionGroup::new(&adjacency, Connectivity::Weak, prefix)
                .compute()
                .is_err()
        );
    }

    #[test]
    fn score_files_are_read_by_graph_name() {
        let temp = tempfile::tempdir().unwrap();
        let provider = ScoreFileProvider::new(temp.path(), "play");
        fs::write(provider.table_path(METRIC_PAGERANK), r#"{"0": 0.25, "1": 0.75}"#).unwrap();
        let table = provider.score_table(METRIC_PAGERANK).unwrap();
        assert_eq!(table[&1], 0.75);
        assert!(provider.table_path("hits_hubs").ends_with("play_hits_hubs.json"));
        assert!(matches!(
            provider.score_table(METRIC_BETWEENNESS),
            Err(StatsError::SourceUnavailable { .. })
        ));
    }
}
