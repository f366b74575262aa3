use std::collections::VecDeque;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::graph::vertex::VariableVertex;

/// Deterministic breadth-first walk from `root`: each layer's ready nodes are
/// processed in stable sorted order by display key before moving to the next
/// layer, so the same graph always evaluates in the same order regardless of
/// insertion order.
pub fn topo_walk(graph: &DiGraph<VariableVertex, ()>, root: NodeIndex) -> Vec<NodeIndex> {
    let mut indegree: Vec<usize> = graph.node_indices().map(|n| graph.edges_directed(n, Direction::Incoming).count()).collect();
    let mut order = Vec::with_capacity(graph.node_count());
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();
    queue.push_back(root);
    indegree[root.index()] = 0;

    while !queue.is_empty() {
        let mut ready: Vec<NodeIndex> = queue.drain(..).collect();
        ready.sort_by_key(|n| graph[*n].display_key());
        let mut next_layer: Vec<NodeIndex> = Vec::new();
        for node in ready {
            order.push(node);
            for edge in graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                indegree[target.index()] -= 1;
                if indegree[target.index()] == 0 {
                    next_layer.push(target);
                }
            }
        }
        next_layer.sort_by_key(|n| graph[*n].display_key());
        queue.extend(next_layer);
    }
    order
}
