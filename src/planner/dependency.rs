//! Metric dependency graph: cycle detection and phase assignment.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::model::MetricDefinition;

/// A circular metric dependency. `cycle` lists the metric names forming
/// the closed path, in traversal order, with the first name repeated at
/// the end to make the closure explicit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circular metric dependency: {}", cycle.join(" -> "))]
pub struct MetricCycleError {
    pub cycle: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Build the dependency graph induced by `query_metrics` (deps outside
/// this set are ignored for scheduling purposes, but the caller still
/// resolves them for evaluation), detect cycles, and assign each metric
/// an `executionPhase` by iterated peeling.
///
/// Returns the phase-ordered, within-phase-order-preserving evaluation
/// order alongside a `name -> phase` map.
pub fn build_phases(
    query_metrics: &[String],
    all_metrics: &HashMap<String, MetricDefinition>,
) -> Result<(Vec<String>, HashMap<String, usize>), MetricCycleError> {
    let in_scope: HashSet<&str> = query_metrics.iter().map(|s| s.as_str()).collect();

    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
    for name in query_metrics {
        let idx = graph.add_node(name.clone());
        index_of.insert(name.clone(), idx);
    }
    for name in query_metrics {
        let Some(def) = all_metrics.get(name) else {
            continue;
        };
        for dep in def.direct_dependencies() {
            if in_scope.contains(dep.as_str()) {
                graph.add_edge(index_of[name], index_of[&dep], ());
            }
        }
    }

    detect_cycle(&graph, query_metrics, &index_of)?;

    let phases = assign_phases(&graph, query_metrics, &index_of);

    let mut order: Vec<(String, usize)> = query_metrics
        .iter()
        .map(|n| (n.clone(), phases[n]))
        .collect();
    order.sort_by_key(|(_, phase)| *phase);
    let eval_order = order.into_iter().map(|(n, _)| n).collect();

    Ok((eval_order, phases))
}

fn detect_cycle(
    graph: &DiGraph<String, ()>,
    query_metrics: &[String],
    index_of: &HashMap<String, NodeIndex>,
) -> Result<(), MetricCycleError> {
    let mut color: HashMap<NodeIndex, Color> = HashMap::new();
    for name in query_metrics {
        color.insert(index_of[name], Color::White);
    }

    for name in query_metrics {
        let start = index_of[name];
        if color[&start] == Color::White {
            let mut path = Vec::new();
            if let Some(cycle) = visit(graph, start, &mut color, &mut path) {
                return Err(MetricCycleError { cycle });
            }
        }
    }
    Ok(())
}

fn visit(
    graph: &DiGraph<String, ()>,
    node: NodeIndex,
    color: &mut HashMap<NodeIndex, Color>,
    path: &mut Vec<NodeIndex>,
) -> Option<Vec<String>> {
    color.insert(node, Color::Gray);
    path.push(node);

    for edge in graph.edges(node) {
        let target = edge.target();
        match color.get(&target).copied().unwrap_or(Color::White) {
            Color::White => {
                if let Some(cycle) = visit(graph, target, color, path) {
                    return Some(cycle);
                }
            }
            Color::Gray => {
                let start = path.iter().position(|&n| n == target).unwrap();
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&n| graph[n].clone()).collect();
                cycle.push(graph[target].clone());
                return Some(cycle);
            }
            Color::Black => {}
        }
    }

    path.pop();
    color.insert(node, Color::Black);
    None
}

fn assign_phases(
    graph: &DiGraph<String, ()>,
    query_metrics: &[String],
    index_of: &HashMap<String, NodeIndex>,
) -> HashMap<String, usize> {
    let mut phases: HashMap<String, usize> = HashMap::new();
    let mut remaining: HashSet<&str> = query_metrics.iter().map(|s| s.as_str()).collect();
    let mut phase = 0usize;

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|name| {
                graph
                    .edges(index_of[*name])
                    .all(|e| !remaining.contains(graph[e.target()].as_str()))
            })
            .collect();

        // Cycles are rejected before this runs, so `ready` is never
        // empty while `remaining` is non-empty.
        for name in &ready {
            phases.insert(name.to_string(), phase);
        }
        for name in &ready {
            remaining.remove(name);
        }
        phase += 1;
    }

    phases
}
