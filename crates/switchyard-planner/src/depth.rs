use std::collections::HashSet;

use switchyard_core::graph::TaskGraph;

/// Longest dependency chain in the graph, counted in nodes.
///
/// A node with no dependencies has depth 1. Safe on invalid graphs: a
/// dependency that is still being expanded (a cycle) contributes 0 and
/// dangling dependencies are ignored. Only used as a risk input.
pub fn dag_depth(graph: &TaskGraph) -> usize {
    node_depths(graph).into_iter().max().unwrap_or(0)
}

/// Per-node depth, in the order of `graph.nodes`.
pub fn node_depths(graph: &TaskGraph) -> Vec<usize> {
    let index = graph.index();
    let n = graph.nodes.len();
    let mut memo: Vec<Option<usize>> = vec![None; n];
    let mut on_stack = vec![false; n];

    for start in 0..n {
        if memo[start].is_some() {
            continue;
        }
        on_stack[start] = true;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(top) = stack.last_mut() {
            let (u, i) = *top;
            let deps = &graph.nodes[u].depends_on;

            if i < deps.len() {
                top.1 += 1;
                if let Some(&v) = index.get(deps[i].as_str()) {
                    if memo[v].is_none() && !on_stack[v] {
                        on_stack[v] = true;
                        stack.push((v, 0));
                    }
                }
                continue;
            }

            let deepest = deps
                .iter()
                .filter_map(|d| index.get(d.as_str()))
                .map(|&v| memo[v].unwrap_or(0))
                .max()
                .unwrap_or(0);
            memo[u] = Some(deepest + 1);
            on_stack[u] = false;
            stack.pop();
        }
    }

    memo.into_iter().map(|d| d.unwrap_or(0)).collect()
}

/// Wave partition of a graph, computed without running anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WavePlan {
    /// Node ids per wave, in graph order within a wave.
    pub waves: Vec<Vec<String>>,
    /// Nodes that can never become ready (cycle or dangling dependency).
    pub unresolved: Vec<String>,
}

/// Layer the graph into waves: a node joins the first wave after all of its
/// dependencies have been placed.
pub fn execution_waves(graph: &TaskGraph) -> WavePlan {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<usize> = (0..graph.nodes.len()).collect();
    let mut waves = Vec::new();

    loop {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| {
                graph.nodes[i]
                    .depends_on
                    .iter()
                    .all(|d| placed.contains(d.as_str()))
            })
            .collect();
        if ready.is_empty() {
            break;
        }
        remaining.retain(|i| !ready.contains(i));
        let wave: Vec<String> = ready.iter().map(|&i| graph.nodes[i].id.clone()).collect();
        for &i in &ready {
            placed.insert(graph.nodes[i].id.as_str());
        }
        waves.push(wave);
    }

    WavePlan {
        waves,
        unresolved: remaining
            .into_iter()
            .map(|i| graph.nodes[i].id.clone())
            .collect(),
    }
}
