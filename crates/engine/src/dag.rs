//! Graph validation — run this after every structural edit and before any run.
//!
//! Checks, all collected (never short-circuited):
//! 0. Node ids are unique (`duplicate-node-id`).
//! 1. Every edge references existing nodes (`dangling-edge`).
//! 2. No cycles (`cycle`, one error per strongly connected group).
//! 3. Each `(target, targetHandle)` has at most one incoming edge
//!    (`multiple-sources-for-target-handle`).
//! 4. Each node's mandatory inputs are connected
//!    (`missing-required-connection`).
//!
//! [`execution_order`] then yields the topological order the executor walks.

use std::collections::{BTreeSet, HashMap, HashSet};

use nodes::{Edge, Node};

use crate::models::{WorkflowDefinition, WorkflowError};
use crate::EngineError;

/// Validate `nodes`/`edges` and return them together with every structural
/// error found. Pure: inputs are only read.
pub fn prepare_workflow(nodes: &[Node], edges: &[Edge]) -> WorkflowDefinition {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut errors = Vec::new();

    // -----------------------------------------------------------------------
    // 0. Unique ids
    // -----------------------------------------------------------------------
    let mut by_id: Vec<(&str, Vec<&Node>)> = Vec::new();
    for node in nodes {
        match by_id.iter_mut().find(|(id, _)| *id == node.id) {
            Some((_, group)) => group.push(node),
            None => by_id.push((node.id.as_str(), vec![node])),
        }
    }
    for (_, group) in by_id {
        if group.len() > 1 {
            errors.push(WorkflowError::DuplicateNodeId {
                nodes: group.into_iter().cloned().collect(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 1. Edge endpoints
    // -----------------------------------------------------------------------
    let mut live_edges: Vec<&Edge> = Vec::with_capacity(edges.len());
    for edge in edges {
        if index.contains_key(edge.source.as_str()) && index.contains_key(edge.target.as_str()) {
            live_edges.push(edge);
        } else {
            errors.push(WorkflowError::DanglingEdge { edge: edge.clone() });
        }
    }

    // -----------------------------------------------------------------------
    // 2. Cycles
    // -----------------------------------------------------------------------
    errors.extend(find_cycles(nodes.len(), &index, &live_edges));

    // -----------------------------------------------------------------------
    // 3. Fan-in per target handle
    // -----------------------------------------------------------------------
    let mut by_target: Vec<((&str, &str), Vec<&Edge>)> = Vec::new();
    for edge in &live_edges {
        let key = (edge.target.as_str(), edge.target_handle.as_str());
        match by_target.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(edge),
            None => by_target.push((key, vec![edge])),
        }
    }
    for (_, group) in by_target {
        if group.len() > 1 {
            errors.push(WorkflowError::MultipleSourcesForTargetHandle {
                edges: group.into_iter().cloned().collect(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 4. Required connections
    // -----------------------------------------------------------------------
    let connected: HashSet<(&str, &str)> = live_edges
        .iter()
        .map(|e| (e.target.as_str(), e.target_handle.as_str()))
        .collect();
    for node in nodes {
        let missing: Vec<String> = node
            .required_inputs()
            .into_iter()
            .filter(|handle| {
                !connected.contains(&(node.id.as_str(), *handle)) && !node.satisfies_without_edge(handle)
            })
            .map(str::to_owned)
            .collect();
        if !missing.is_empty() {
            errors.push(WorkflowError::MissingRequiredConnection {
                node: node.clone(),
                handles: missing,
            });
        }
    }

    WorkflowDefinition {
        nodes: nodes.to_vec(),
        edges: edges.to_vec(),
        errors,
    }
}

/// Tarjan's strongly connected components over the live edges. Each group
/// with a cycle (more than one node, or a self-loop) yields one `cycle`
/// error listing every edge inside the group, in input order.
fn find_cycles(node_count: usize, index: &HashMap<&str, usize>, edges: &[&Edge]) -> Vec<WorkflowError> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for edge in edges {
        adjacency[index[edge.source.as_str()]].push(index[edge.target.as_str()]);
    }

    let mut tarjan = Tarjan::new(node_count);
    for v in 0..node_count {
        if tarjan.order[v].is_none() {
            tarjan.visit(v, &adjacency);
        }
    }

    let mut errors = Vec::new();
    let mut groups: Vec<usize> = tarjan.component.iter().filter_map(|c| *c).collect();
    groups.sort_unstable();
    groups.dedup();
    // Report groups in order of their first node.
    groups.sort_by_key(|g| tarjan.component.iter().position(|c| *c == Some(*g)));

    for group in groups {
        let cyclic: Vec<Edge> = edges
            .iter()
            .filter(|e| {
                tarjan.component[index[e.source.as_str()]] == Some(group)
                    && tarjan.component[index[e.target.as_str()]] == Some(group)
            })
            .map(|e| (*e).clone())
            .collect();
        let members = tarjan.component.iter().filter(|c| **c == Some(group)).count();
        let self_loop = cyclic.iter().any(|e| e.source == e.target);
        if members > 1 || self_loop {
            errors.push(WorkflowError::Cycle { edges: cyclic });
        }
    }
    errors
}

struct Tarjan {
    counter: usize,
    order: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    component: Vec<Option<usize>>,
    next_component: usize,
}

impl Tarjan {
    fn new(n: usize) -> Self {
        Self {
            counter: 0,
            order: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            component: vec![None; n],
            next_component: 0,
        }
    }

    fn visit(&mut self, v: usize, adjacency: &[Vec<usize>]) {
        self.order[v] = Some(self.counter);
        self.low[v] = self.counter;
        self.counter += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        for &w in &adjacency[v] {
            match self.order[w] {
                None => {
                    self.visit(w, adjacency);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                // `w` is on the current recursion stack: back edge.
                Some(order_w) if self.on_stack[w] => {
                    self.low[v] = self.low[v].min(order_w);
                }
                Some(_) => {}
            }
        }

        if Some(self.low[v]) == self.order[v] {
            let id = self.next_component;
            self.next_component += 1;
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                self.component[w] = Some(id);
                if w == v {
                    break;
                }
            }
        }
    }
}

/// Topological execution order (Kahn's algorithm). Among ready nodes the one
/// listed first in `nodes` runs first. Edges to unknown nodes are ignored.
///
/// # Errors
/// [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn execution_order(nodes: &[Node], edges: &[Edge]) -> Result<Vec<String>, EngineError> {
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

    // Seed with nodes that have no incoming edges, smallest index first.
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(next) = ready.pop_first() {
        sorted.push(nodes[next].id.clone());
        for &neighbour in &adjacency[next] {
            in_degree[neighbour] -= 1;
            if in_degree[neighbour] == 0 {
                ready.insert(neighbour);
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}
