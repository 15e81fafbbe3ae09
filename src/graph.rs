//! Similarity graph build and persistence.
//!
//! A build streams catalog records once, adding a node per package id and a
//! directed edge to every entry of its `similarTo` list. Package-to-node ids
//! are owned by a [`GraphBuildContext`] that lives exactly as long as one
//! build, so two builds never share id assignments.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{suffixed, write_atomic, write_json_atomic};
use crate::constants::fields::SIMILAR_TO;
use crate::constants::graph::{EDGE_LIST_HEADER, EDGE_LIST_SUFFIX, GRAPH_SUFFIX, LABEL_DICT_SUFFIX};
use crate::constants::source::ID_FIELD;
use crate::constants::stats::PROGRESS_EVERY;
use crate::errors::StatsError;
use crate::extract::{FieldPath, extract_strings};
use crate::ranking::{LabelTable, ScoreTable};
use crate::source::{PackageFilter, RecordSource};
use crate::types::{Label, NodeId};

/// Package-to-node-id assignment for one graph build.
#[derive(Clone, Debug, Default)]
pub struct GraphBuildContext {
    ids: IndexMap<Label, NodeId>,
}

impl GraphBuildContext {
    /// Empty context; ids start at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Node id for `package`, assigning the next free id on first sight.
    pub fn node_id(&mut self, package: &str) -> NodeId {
        if let Some(id) = self.ids.get(package) {
            return *id;
        }
        let id = self.ids.len() as NodeId;
        self.ids.insert(package.to_string(), id);
        id
    }

    /// Number of assigned ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no id was assigned.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Package to node id, in assignment order.
    pub fn package_ids(&self) -> &IndexMap<Label, NodeId> {
        &self.ids
    }

    /// Finish the build with `edges`.
    pub fn into_graph(self, edges: Vec<(NodeId, NodeId)>) -> SimilarityGraph {
        let labels = self.ids.into_iter().map(|(label, id)| (id, label)).collect();
        SimilarityGraph { labels, edges }
    }
}

/// Directed similarity graph with package labels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGraph {
    labels: LabelTable,
    edges: Vec<(NodeId, NodeId)>,
}

/// Files written by [`SimilarityGraph::save`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphFiles {
    /// `<out>.graph.json`
    pub graph: PathBuf,
    /// `<out>.edgelist.txt`
    pub edge_list: PathBuf,
    /// `<out>.pkg_to_id_dict.json`
    pub label_dict: PathBuf,
}

impl GraphFiles {
    /// File layout for output prefix `out`.
    pub fn for_prefix(out: &Path) -> Self {
        Self {
            graph: suffixed(out, GRAPH_SUFFIX),
            edge_list: suffixed(out, EDGE_LIST_SUFFIX),
            label_dict: suffixed(out, LABEL_DICT_SUFFIX),
        }
    }
}

impl SimilarityGraph {
    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.labels.len()
    }

    /// Number of edges (parallel edges count separately).
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node id to package label.
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Label of `id`.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// In-degree of every node, in node order.
    pub fn in_degrees(&self) -> IndexMap<NodeId, u64> {
        self.degrees(|(_, dst)| *dst)
    }

    /// Out-degree of every node, in node order.
    pub fn out_degrees(&self) -> IndexMap<NodeId, u64> {
        self.degrees(|(src, _)| *src)
    }

    fn degrees(&self, endpoint: impl Fn(&(NodeId, NodeId)) -> NodeId) -> IndexMap<NodeId, u64> {
        let mut degrees: IndexMap<NodeId, u64> = self.labels.keys().map(|id| (*id, 0)).collect();
        for edge in &self.edges {
            *degrees.entry(endpoint(edge)).or_insert(0) += 1;
        }
        degrees
    }

    /// Degree table as floating-point scores.
    pub fn degree_scores(degrees: &IndexMap<NodeId, u64>) -> ScoreTable {
        degrees.iter().map(|(id, degree)| (*id, *degree as f64)).collect()
    }

    /// Write the graph, its edge list, and the package dictionary under `out`.
    pub fn save(&self, out: &Path) -> Result<GraphFiles, StatsError> {
        let files = GraphFiles::for_prefix(out);
        let encoded = serde_json::to_value(self).map_err(|err| StatsError::Cache {
            path: files.graph.display().to_string(),
            reason: format!("failed encoding graph: {err}"),
        })?;
        write_json_atomic(&files.graph, &encoded)?;
        write_atomic(&files.edge_list, self.edge_list().as_bytes())?;

        let dict: IndexMap<&str, NodeId> = self
            .labels
            .iter()
            .map(|(id, label)| (label.as_str(), *id))
            .collect();
        let dict = serde_json::to_value(&dict).map_err(|err| StatsError::Cache {
            path: files.label_dict.display().to_string(),
            reason: format!("failed encoding package dictionary: {err}"),
        })?;
        write_json_atomic(&files.label_dict, &dict)?;
        info!(
            "[appstats:graph] saved {} nodes / {} edges to {}",
            self.node_count(),
            self.edge_count(),
            files.graph.display()
        );
        Ok(files)
    }

    /// Tab-separated edge list with a `#` header.
    pub fn edge_list(&self) -> String {
        let mut out = format!(
            "# {EDGE_LIST_HEADER}\n# Nodes: {}\tEdges: {}\n# SrcNId\tDstNId\n",
            self.node_count(),
            self.edge_count()
        );
        for (src, dst) in &self.edges {
            out.push_str(&format!("{src}\t{dst}\n"));
        }
        out
    }

    /// Load a graph saved by [`Self::save`]. Edges must reference known nodes.
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        let raw = fs::read_to_string(path).map_err(|err| StatsError::SourceUnavailable {
            source_id: path.display().to_string(),
            reason: format!("failed reading graph: {err}"),
        })?;
        let graph: SimilarityGraph =
            serde_json::from_str(&raw).map_err(|err| StatsError::SourceInconsistent {
                source_id: path.display().to_string(),
                details: format!("invalid graph document: {err}"),
            })?;
        if let Some((src, dst)) = graph
            .edges
            .iter()
            .find(|(src, dst)| !graph.labels.contains_key(src) || !graph.labels.contains_key(dst))
        {
            return Err(StatsError::SourceInconsistent {
                source_id: path.display().to_string(),
                details: format!("edge {src} -> {dst} references an unknown node"),
            });
        }
        Ok(graph)
    }
}

/// Graph name used for companion files: the file name without `.graph.json`.
pub fn graph_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(GRAPH_SUFFIX)
        .or_else(|| name.strip_suffix(".graph"))
        .unwrap_or(&name)
        .to_string()
}

/// Build the similarity graph from one traversal of `source`.
pub fn build_graph(
    source: &dyn RecordSource,
    filter: Option<&PackageFilter>,
) -> Result<SimilarityGraph, StatsError> {
    let similar = FieldPath::parse(SIMILAR_TO)?;
    let fields = [FieldPath::parse(ID_FIELD)?, similar.clone()];
    let started = Instant::now();
    let mut context = GraphBuildContext::new();
    let mut edges = Vec::new();
    let mut scanned = 0u64;

    for record in source.fetch_projected(filter, &fields)? {
        let record = record?;
        scanned += 1;
        let Some(package) = record.id() else {
            warn!("[appstats:graph] record {} has no package id; skipping", scanned);
            continue;
        };
        let node = context.node_id(package);
        for target in extract_strings(&record, &similar).unwrap_or_default() {
            let target = context.node_id(target);
            edges.push((node, target));
        }
        if scanned % PROGRESS_EVERY == 0 {
            info!(
                "[appstats:graph] {} records, {} nodes, {} edges ({:.1}s)",
                scanned,
                context.len(),
                edges.len(),
                started.elapsed().as_secs_f64()
            );
        }
    }
    info!(
        "[appstats:graph] build finished: {} records, {} nodes, {} edges in {:.2}s",
        scanned,
        context.len(),
        edges.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(context.into_graph(edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use crate::source::InMemorySource;
    use serde_json::json;
    use tempfile::tempdir;

    fn source() -> InMemorySource {
        InMemorySource::new(
            "mem",
            vec![
                Record::new(json!({"docid": "com.a", "similarTo": ["com.b", "com.c"]})),
                Record::new(json!({"docid": "com.b", "similarTo": ["com.a"]})),
                Record::new(json!({"similarTo": ["com.z"]})),
                Record::new(json!({"docid": "com.d"})),
            ],
        )
    }

    #[test]
    fn build_assigns_ids_in_first_seen_order() {
        let graph = build_graph(&source(), None).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.label(0), Some("com.a"));
        assert_eq!(graph.label(2), Some("com.c"));
        assert_eq!(graph.label(3), Some("com.d"));
        assert_eq!(graph.edges(), &[(0, 1), (0, 2), (1, 0)]);
        assert_eq!(graph.in_degrees().values().copied().collect::<Vec<_>>(), vec![1, 1, 1, 0]);
        assert_eq!(graph.out_degrees()[&0], 2);
    }

    #[test]
    fn separate_builds_do_not_share_ids() {
        let filter = PackageFilter::new(["com.b"]);
        let first = build_graph(&source(), Some(&filter)).unwrap();
        let second = build_graph(&source(), Some(&filter)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.label(0), Some("com.b"));
    }

    #[test]
    fn save_and_load_graph_files() {
        let temp = tempdir().unwrap();
        let graph = build_graph(&source(), None).unwrap();
        let files = graph.save(&temp.path().join("play")).unwrap();
        assert_eq!(graph_name(&files.graph), "play");
        assert_eq!(SimilarityGraph::load(&files.graph).unwrap(), graph);

        let edge_list = fs::read_to_string(&files.edge_list).unwrap();
        assert!(edge_list.starts_with("# "));
        assert!(edge_list.ends_with("0\t1\n0\t2\n1\t0\n"));

        let dict: IndexMap<String, NodeId> =
            serde_json::from_str(&fs::read_to_string(&files.label_dict).unwrap()).unwrap();
        assert_eq!(dict["com.c"], 2);
    }

    #[test]
    fn dangling_edges_are_inconsistent() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.graph.json");
        fs::write(&path, r#"{"labels": {"0": "com.a"}, "edges": [[0, 7]]}"#).unwrap();
        assert!(matches!(
            SimilarityGraph::load(&path),
            Err(StatsError::SourceInconsistent { .. })
        ));
    }
}
