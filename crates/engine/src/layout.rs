//! Automatic layout for freshly loaded workflows.
//!
//! Nodes are banded into columns by their longest distance from a root,
//! left to right, and stacked top to bottom inside a column in input order.
//! Only `position` changes; ids, types, data and edges are copied through.

use std::collections::{BTreeSet, HashMap};

use nodes::{Edge, Node, Position};

/// Spacing used by [`layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Top-left corner of the first column.
    pub origin: Position,
    /// Width assumed for nodes without a measured `width`.
    pub node_width: f64,
    /// Height assumed for nodes without a measured `height`.
    pub node_height: f64,
    /// Horizontal gap between columns.
    pub column_spacing: f64,
    /// Vertical gap between nodes in a column.
    pub row_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin: Position::new(0.0, 0.0),
            node_width: 280.0,
            node_height: 120.0,
            column_spacing: 80.0,
            row_spacing: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Lay out a graph. Deterministic: the same input always yields the same
/// positions, whatever positions the input already had.
pub fn layout(nodes: &[Node], edges: &[Edge], config: &LayoutConfig) -> LayoutResult {
    let depths = column_of_each_node(nodes, edges);
    let column_count = depths.iter().copied().max().map_or(0, |d| d + 1);

    // Column membership in input order.
    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); column_count];
    for (i, &depth) in depths.iter().enumerate() {
        columns[depth].push(i);
    }

    let mut positioned = nodes.to_vec();
    let mut x = config.origin.x;
    for column in &columns {
        let mut y = config.origin.y;
        let mut widest = config.node_width;
        for &i in column {
            let node = &mut positioned[i];
            node.position = Position::new(x, y);
            y += node.height.unwrap_or(config.node_height) + config.row_spacing;
            widest = widest.max(node.width.unwrap_or(config.node_width));
        }
        x += widest + config.column_spacing;
    }

    LayoutResult {
        nodes: positioned,
        edges: edges.to_vec(),
    }
}

/// Longest-path depth for every node reachable through acyclic edges.
/// Nodes stuck behind a cycle share one extra column after the rest.
fn column_of_each_node(nodes: &[Node], edges: &[Edge]) -> Vec<usize> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree = vec![0usize; nodes.len()];
    for edge in edges {
        if let (Some(&from), Some(&to)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
    }

    let mut depth: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut tentative = vec![0usize; nodes.len()];

    while let Some(next) = ready.pop_first() {
        depth[next] = Some(tentative[next]);
        for &neighbour in &adjacency[next] {
            tentative[neighbour] = tentative[neighbour].max(tentative[next] + 1);
            in_degree[neighbour] -= 1;
            if in_degree[neighbour] == 0 {
                ready.insert(neighbour);
            }
        }
    }

    let overflow = depth.iter().flatten().copied().max().map_or(0, |d| d + 1);
    depth.into_iter().map(|d| d.unwrap_or(overflow)).collect()
}
