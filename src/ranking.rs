//! Top-N reduction over precomputed score tables.
//!
//! The reducer has no knowledge of where scores come from: a centrality table
//! written by a graph library and a per-record metric go through the same
//! [`BoundedTopK`] selection.

use indexmap::IndexMap;

use crate::topk::BoundedTopK;
use crate::types::{Label, NodeId};

/// Node id to score mapping, in the order the producer listed it.
pub type ScoreTable = IndexMap<NodeId, f64>;

/// Node id to label mapping.
pub type LabelTable = IndexMap<NodeId, Label>;

/// The `n` highest-scored entries, descending.
///
/// Admission is strict: an entry tying the current worst kept score is not
/// inserted once the ranking is full. Earlier entries win ties.
pub fn top_n<I, V: PartialOrd>(scores: impl IntoIterator<Item = (I, V)>, n: usize) -> Vec<(I, V)> {
    let mut ranking = BoundedTopK::largest(n);
    for (id, score) in scores {
        ranking.offer(id, score);
    }
    ranking.into_pairs()
}

/// Convenience wrapper for [`ScoreTable`]s.
pub fn top_n_table(table: &ScoreTable, n: usize) -> Vec<(NodeId, f64)> {
    top_n(table.iter().map(|(id, score)| (*id, *score)), n)
}

/// Labels for `ids`, skipping ids the table does not know.
pub fn resolve_labels<'a>(
    ids: impl IntoIterator<Item = &'a NodeId>,
    labels: &LabelTable,
) -> IndexMap<NodeId, Label> {
    ids.into_iter()
        .filter_map(|id| labels.get(id).map(|label| (*id, label.clone())))
        .collect()
}

/// Replace ids by labels, falling back to the decimal id when unknown.
pub fn labelled(ranking: &[(NodeId, f64)], labels: &LabelTable) -> Vec<(Label, f64)> {
    ranking
        .iter()
        .map(|(id, score)| {
            let label = labels.get(id).cloned().unwrap_or_else(|| id.to_string());
            (label, *score)
        })
        .collect()
}
