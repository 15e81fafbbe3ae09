//! Structural measures over a [`SimilarityGraph`]: connected components,
//! clustering coefficients, k-cores, hop counts, and the summary block.
//!
//! Nodes are addressed by their position in the graph's label table. The
//! undirected view drops self loops and parallel edges; the directed view
//! keeps every edge as stored.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::graph::SimilarityGraph;
use crate::types::NodeId;

/// Adjacency lists of a graph, built once per report.
#[derive(Clone, Debug, Default)]
pub struct Adjacency {
    out: Vec<Vec<usize>>,
    undirected: Vec<Vec<usize>>,
}

impl Adjacency {
    /// Build directed and undirected adjacency for `graph`.
    ///
    /// Edges naming unknown nodes are ignored.
    pub fn new(graph: &SimilarityGraph) -> Self {
        let labels = graph.labels();
        let n = labels.len();
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut undirected: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (src, dst) in graph.edges() {
            let (Some(src), Some(dst)) = (labels.get_index_of(src), labels.get_index_of(dst)) else {
                continue;
            };
            out[src].push(dst);
            if src != dst {
                undirected[src].push(dst);
                undirected[dst].push(src);
            }
        }
        for neighbors in &mut undirected {
            neighbors.sort_unstable();
            neighbors.dedup();
        }
        Self { out, undirected }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// True for a graph without nodes.
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Undirected degree (distinct non-loop neighbors) of every node.
    pub fn undirected_degrees(&self) -> Vec<usize> {
        self.undirected.iter().map(Vec::len).collect()
    }

    /// Number of distinct non-loop undirected edges.
    pub fn undirected_edge_count(&self) -> usize {
        self.undirected.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Distinct non-loop undirected edges as `(low, high)` positions.
    pub fn undirected_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.undirected.iter().enumerate().flat_map(|(node, neighbors)| {
            neighbors
                .iter()
                .filter(move |other| **other > node)
                .map(move |other| (node, *other))
        })
    }

    /// Strongly connected components (Tarjan, explicit call stack).
    pub fn strong_components(&self) -> Vec<Vec<usize>> {
        const UNVISITED: usize = usize::MAX;
        let n = self.len();
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut components = Vec::new();
        let mut counter = 0usize;

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            index[root] = counter;
            low[root] = counter;
            counter += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = calls.last_mut() {
                let node = frame.0;
                if let Some(&next) = self.out[node].get(frame.1) {
                    frame.1 += 1;
                    if index[next] == UNVISITED {
                        index[next] = counter;
                        low[next] = counter;
                        counter += 1;
                        stack.push(next);
                        on_stack[next] = true;
                        calls.push((next, 0));
                    } else if on_stack[next] {
                        low[node] = low[node].min(index[next]);
                    }
                    continue;
                }
                calls.pop();
                if let Some(&(parent, _)) = calls.last() {
                    low[parent] = low[parent].min(low[node]);
                }
                if low[node] == index[node] {
                    let mut component = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
        components
    }

    /// Weakly connected components (BFS over the undirected view).
    pub fn weak_components(&self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut seen = vec![false; n];
        let mut components = Vec::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for &next in &self.undirected[node] {
                    if !seen[next] {
                        seen[next] = true;
                        component.push(next);
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Per node, the number of undirected edges among its neighbors.
    pub fn neighbor_links(&self) -> Vec<u64> {
        let n = self.len();
        let mut mark = vec![usize::MAX; n];
        let mut links = vec![0u64; n];
        for node in 0..n {
            for &neighbor in &self.undirected[node] {
                mark[neighbor] = node;
            }
            for &neighbor in &self.undirected[node] {
                for &other in &self.undirected[neighbor] {
                    if other > neighbor && mark[other] == node {
                        links[node] += 1;
                    }
                }
            }
        }
        links
    }

    /// Local clustering coefficient of every node; 0 below degree 2.
    pub fn clustering_coefficients(&self) -> Vec<f64> {
        self.neighbor_links()
            .into_iter()
            .zip(&self.undirected)
            .map(|(links, neighbors)| {
                let degree = neighbors.len() as f64;
                if neighbors.len() < 2 {
                    0.0
                } else {
                    2.0 * links as f64 / (degree * (degree - 1.0))
                }
            })
            .collect()
    }

    /// Core number of every node over the undirected view (bucket peeling).
    pub fn core_numbers(&self) -> Vec<usize> {
        let n = self.len();
        let mut degree = self.undirected_degrees();
        let max_degree = degree.iter().copied().max().unwrap_or(0);

        let mut bins = vec![0usize; max_degree + 1];
        for d in &degree {
            bins[*d] += 1;
        }
        let mut start = 0;
        for bin in bins.iter_mut() {
            let count = *bin;
            *bin = start;
            start += count;
        }

        let mut order = vec![0usize; n];
        let mut position = vec![0usize; n];
        for node in 0..n {
            position[node] = bins[degree[node]];
            order[position[node]] = node;
            bins[degree[node]] += 1;
        }
        for d in (1..=max_degree).rev() {
            bins[d] = bins[d - 1];
        }
        bins[0] = 0;

        for i in 0..n {
            let node = order[i];
            for &neighbor in &self.undirected[node] {
                if degree[neighbor] > degree[node] {
                    let d = degree[neighbor];
                    let from = position[neighbor];
                    let to = bins[d];
                    let swapped = order[to];
                    if neighbor != swapped {
                        position[neighbor] = to;
                        order[from] = swapped;
                        position[swapped] = from;
                        order[to] = neighbor;
                    }
                    bins[d] += 1;
                    degree[neighbor] -= 1;
                }
            }
        }
        degree
    }

    /// `counts[h - 1]` = number of (source, target) pairs at directed distance
    /// exactly `h`, for BFS started from each of `sources`.
    pub fn hop_counts(&self, sources: &[usize]) -> Vec<u64> {
        let n = self.len();
        let mut counts: Vec<u64> = Vec::new();
        let mut distance = vec![usize::MAX; n];
        let mut touched: Vec<usize> = Vec::new();
        for &source in sources {
            if source >= n {
                continue;
            }
            distance[source] = 0;
            touched.push(source);
            let mut queue = VecDeque::from([source]);
            while let Some(node) = queue.pop_front() {
                let next_distance = distance[node] + 1;
                for &next in &self.out[node] {
                    if distance[next] != usize::MAX {
                        continue;
                    }
                    distance[next] = next_distance;
                    touched.push(next);
                    queue.push_back(next);
                    if counts.len() < next_distance {
                        counts.resize(next_distance, 0);
                    }
                    counts[next_distance - 1] += 1;
                }
            }
            for node in touched.drain(..) {
                distance[node] = usize::MAX;
            }
        }
        counts
    }

    /// Up to `limit` evenly spread node positions, always starting at 0.
    pub fn sample_sources(&self, limit: usize) -> Vec<usize> {
        let n = self.len();
        if limit >= n {
            return (0..n).collect();
        }
        let stride = n as f64 / limit as f64;
        (0..limit).map(|i| (i as f64 * stride) as usize).collect()
    }
}

/// Running sums of `counts`.
pub fn cumulative(counts: &[u64]) -> Vec<u64> {
    counts
        .iter()
        .scan(0u64, |total, count| {
            *total += count;
            Some(*total)
        })
        .collect()
}

/// Interpolated hop count at which `quantile` of the reachable pairs are
/// covered. `cumulative[h - 1]` holds the pairs within `h` hops.
pub fn effective_diameter(cumulative: &[u64], quantile: f64) -> Option<f64> {
    let total = *cumulative.last()? as f64;
    if total == 0.0 {
        return None;
    }
    let target = quantile * total;
    let mut previous = 0.0;
    for (idx, reached) in cumulative.iter().enumerate() {
        let reached = *reached as f64;
        let hop = (idx + 1) as f64;
        if reached >= target {
            if reached == previous {
                return Some(hop);
            }
            return Some(hop - 1.0 + (target - previous) / (reached - previous));
        }
        previous = reached;
    }
    None
}

/// Headline numbers of a graph (node, edge, degree, triad, and component
/// counts).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Nodes.
    pub nodes: usize,
    /// Stored edges, parallel edges included.
    pub edges: usize,
    /// Nodes without any incident edge.
    pub zero_degree_nodes: usize,
    /// Nodes without incoming edges.
    pub zero_in_degree_nodes: usize,
    /// Nodes without outgoing edges.
    pub zero_out_degree_nodes: usize,
    /// Nodes with both incoming and outgoing edges.
    pub nonzero_in_out_degree_nodes: usize,
    /// Distinct `(src, dst)` pairs.
    pub unique_directed_edges: usize,
    /// Distinct non-loop node pairs, direction ignored.
    pub unique_undirected_edges: usize,
    /// Distinct self loops.
    pub self_edges: usize,
    /// Distinct directed edges whose reverse edge also exists.
    pub bidirectional_edges: usize,
    /// Triangles in the undirected view.
    pub closed_triangles: u64,
    /// Connected triples that are not closed.
    pub open_triads: u64,
    /// Closed triads over all connected triples.
    pub closed_triad_fraction: f64,
    /// Nodes in the largest weakly connected component.
    pub largest_wcc_nodes: usize,
    /// Share of nodes in the largest weakly connected component.
    pub largest_wcc_fraction: f64,
    /// Nodes in the largest strongly connected component.
    pub largest_scc_nodes: usize,
    /// Share of nodes in the largest strongly connected component.
    pub largest_scc_fraction: f64,
}

impl GraphSummary {
    /// Summarize `graph`; `adjacency` must have been built from it.
    pub fn compute(graph: &SimilarityGraph, adjacency: &Adjacency) -> Self {
        let in_degrees = graph.in_degrees();
        let out_degrees = graph.out_degrees();
        let mut zero_degree_nodes = 0;
        let mut zero_in_degree_nodes = 0;
        let mut zero_out_degree_nodes = 0;
        for (id, in_degree) in &in_degrees {
            let out_degree = out_degrees.get(id).copied().unwrap_or(0);
            zero_in_degree_nodes += usize::from(*in_degree == 0);
            zero_out_degree_nodes += usize::from(out_degree == 0);
            zero_degree_nodes += usize::from(*in_degree == 0 && out_degree == 0);
        }
        let nodes = graph.node_count();
        let nonzero_in_out_degree_nodes =
            nodes + zero_degree_nodes - zero_in_degree_nodes - zero_out_degree_nodes;

        let unique: HashSet<(NodeId, NodeId)> = graph.edges().iter().copied().collect();
        let self_edges = unique.iter().filter(|(src, dst)| src == dst).count();
        let bidirectional_edges = unique
            .iter()
            .filter(|(src, dst)| src != dst && unique.contains(&(*dst, *src)))
            .count();

        let links = adjacency.neighbor_links();
        let closed: u64 = links.iter().sum();
        let triads: u64 = adjacency
            .undirected_degrees()
            .into_iter()
            .map(|degree| (degree as u64) * (degree as u64).saturating_sub(1) / 2)
            .sum();

        let largest =
            |components: Vec<Vec<usize>>| components.iter().map(Vec::len).max().unwrap_or(0);
        let largest_wcc_nodes = largest(adjacency.weak_components());
        let largest_scc_nodes = largest(adjacency.strong_components());
        let share = |count: usize| if nodes == 0 { 0.0 } else { count as f64 / nodes as f64 };

        Self {
            nodes,
            edges: graph.edge_count(),
            zero_degree_nodes,
            zero_in_degree_nodes,
            zero_out_degree_nodes,
            nonzero_in_out_degree_nodes,
            unique_directed_edges: unique.len(),
            unique_undirected_edges: adjacency.undirected_edge_count(),
            self_edges,
            bidirectional_edges,
            closed_triangles: closed / 3,
            open_triads: triads - closed,
            closed_triad_fraction: if triads == 0 {
                0.0
            } else {
                closed as f64 / triads as f64
            },
            largest_wcc_nodes,
            largest_wcc_fraction: share(largest_wcc_nodes),
            largest_scc_nodes,
            largest_scc_fraction: share(largest_scc_nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuildContext;

    /// a->b->c->a cycle, c->d, d<->e, a self loop, and a parallel a->b.
    fn graph() -> SimilarityGraph {
        let mut context = GraphBuildContext::new();
        let [a, b, c, d, e] = ["a", "b", "c", "d", "e"].map(|name| context.node_id(name));
        context.into_graph(vec![
            (a, b),
            (b, c),
            (c, a),
            (c, d),
            (d, e),
            (e, d),
            (a, a),
            (a, b),
        ])
    }

    fn sorted_sizes(components: Vec<Vec<usize>>) -> Vec<usize> {
        let mut sizes: Vec<usize> = components.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        sizes
    }

    #[test]
    fn components_follow_edge_direction() {
        let adjacency = Adjacency::new(&graph());
        assert_eq!(sorted_sizes(adjacency.strong_components()), vec![2, 3]);
        assert_eq!(sorted_sizes(adjacency.weak_components()), vec![5]);
    }

    #[test]
    fn isolated_nodes_are_their_own_components() {
        let mut context = GraphBuildContext::new();
        let a = context.node_id("a");
        let b = context.node_id("b");
        context.node_id("lonely");
        let adjacency = Adjacency::new(&context.into_graph(vec![(a, b)]));
        assert_eq!(sorted_sizes(adjacency.strong_components()), vec![1, 1, 1]);
        assert_eq!(sorted_sizes(adjacency.weak_components()), vec![1, 2]);
    }

    #[test]
    fn clustering_counts_closed_neighbor_pairs() {
        let adjacency = Adjacency::new(&graph());
        assert_eq!(adjacency.neighbor_links(), vec![1, 1, 1, 0, 0]);
        let coefficients = adjacency.clustering_coefficients();
        assert_eq!(coefficients[0], 1.0);
        assert!((coefficients[2] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(coefficients[4], 0.0);
    }

    #[test]
    fn core_numbers_peel_the_tail() {
        let adjacency = Adjacency::new(&graph());
        assert_eq!(adjacency.core_numbers(), vec![2, 2, 2, 1, 1]);
    }

    #[test]
    fn hop_counts_and_effective_diameter() {
        let adjacency = Adjacency::new(&graph());
        let counts = adjacency.hop_counts(&adjacency.sample_sources(100));
        assert_eq!(counts, vec![6, 5, 2, 1]);
        let reached = cumulative(&counts);
        assert_eq!(reached, vec![6, 11, 13, 14]);
        let diameter = effective_diameter(&reached, 0.9).unwrap();
        assert!((diameter - 2.8).abs() < 1e-12);
        assert_eq!(effective_diameter(&[], 0.9), None);
    }

    #[test]
    fn sampled_sources_are_spread_and_bounded() {
        let adjacency = Adjacency::new(&graph());
        assert_eq!(adjacency.sample_sources(2), vec![0, 2]);
        assert_eq!(adjacency.sample_sources(0), Vec::<usize>::new());
    }

    #[test]
    fn summary_counts_edges_and_triads() {
        let graph = graph();
        let summary = GraphSummary::compute(&graph, &Adjacency::new(&graph));
        assert_eq!(summary.nodes, 5);
        assert_eq!(summary.edges, 8);
        assert_eq!(summary.unique_directed_edges, 7);
        assert_eq!(summary.unique_undirected_edges, 5);
        assert_eq!(summary.self_edges, 1);
        assert_eq!(summary.bidirectional_edges, 2);
        assert_eq!(summary.zero_degree_nodes, 0);
        assert_eq!(summary.nonzero_in_out_degree_nodes, 5);
        assert_eq!(summary.closed_triangles, 1);
        assert_eq!(summary.open_triads, 3);
        assert_eq!(summary.closed_triad_fraction, 0.5);
        assert_eq!(summary.largest_scc_nodes, 3);
        assert_eq!(summary.largest_wcc_fraction, 1.0);
    }
}
