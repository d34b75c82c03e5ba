use std::collections::HashSet;

use switchyard_core::error::DagIssue;
use switchyard_core::graph::TaskGraph;
use switchyard_core::types::CandidatePool;

/// Outcome of structural validation. Valid iff there are no issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<DagIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Human-readable error list.
    pub fn errors(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}

/// Structurally validate a graph against the candidate pool it was planned from.
///
/// Checks run in a fixed order and accumulate: uniqueness, dependency
/// existence, whitelist membership, cycles, then empty fields. An empty graph
/// stops immediately.
pub fn validate(graph: &TaskGraph, pool: &CandidatePool) -> ValidationReport {
    let mut issues = Vec::new();

    if graph.is_empty() {
        issues.push(DagIssue::EmptyGraph);
        return ValidationReport { issues };
    }

    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(DagIssue::DuplicateId(node.id.clone()));
        }
    }

    for node in &graph.nodes {
        for dep in &node.depends_on {
            if !seen.contains(dep.as_str()) {
                issues.push(DagIssue::MissingDependency {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let whitelist = pool.whitelist();
    for node in &graph.nodes {
        if !whitelist.contains(&(node.agent.clone(), node.capability.clone())) {
            issues.push(DagIssue::Hallucinated {
                node: node.id.clone(),
                agent: node.agent.clone(),
                capability: node.capability.clone(),
            });
        }
    }

    if let Some((from, to)) = find_cycle(graph) {
        issues.push(DagIssue::Cycle { from, to });
    }

    for node in &graph.nodes {
        if node.capability.trim().is_empty() {
            issues.push(DagIssue::EmptyField {
                node: node.id.clone(),
                field: "capability",
            });
        }
        if node.agent.trim().is_empty() {
            issues.push(DagIssue::EmptyField {
                node: node.id.clone(),
                field: "agent",
            });
        }
    }

    ValidationReport { issues }
}

const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

/// Find the first back-edge in the dependency relation.
///
/// Iterative depth-first search with an explicit stack; edges point from a
/// node to each of its dependencies. Returns `(from, to)` where `to` is still
/// on the stack. Dangling dependencies are skipped.
pub fn find_cycle(graph: &TaskGraph) -> Option<(String, String)> {
    let index = graph.index();
    let mut color = vec![WHITE; graph.nodes.len()];

    for start in 0..graph.nodes.len() {
        if color[start] != WHITE {
            continue;
        }
        color[start] = GRAY;
        // (node, next dependency to look at)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(top) = stack.last_mut() {
            let (u, i) = *top;
            let deps = &graph.nodes[u].depends_on;
            if i >= deps.len() {
                color[u] = BLACK;
                stack.pop();
                continue;
            }
            top.1 += 1;

            let Some(&v) = index.get(deps[i].as_str()) else {
                continue;
            };
            match color[v] {
                WHITE => {
                    color[v] = GRAY;
                    stack.push((v, 0));
                }
                GRAY => {
                    return Some((graph.nodes[u].id.clone(), graph.nodes[v].id.clone()));
                }
                _ => {}
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::graph::TaskNode;
    use switchyard_core::types::CandidateMatch;

    fn pool() -> CandidatePool {
        CandidatePool {
            agents: vec![
                CandidateMatch::agent("fs", 0.9)
                    .with_capabilities(vec!["read".into(), "write".into()]),
                CandidateMatch::agent("conv", 0.8).with_capabilities(vec!["convert".into()]),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn valid_chain_passes() {
        let graph = TaskGraph::new(vec![
            TaskNode::new("t1", "read", "fs"),
            TaskNode::new("t2", "convert", "conv").after(&["t1"]),
            TaskNode::new("t3", "write", "fs").after(&["t2"]),
        ]);
        let report = validate(&graph, &pool());
        assert!(report.is_valid(), "{:?}", report.errors());
    }

    #[test]
    fn empty_graph_short_circuits() {
        let report = validate(&TaskGraph::default(), &pool());
        assert_eq!(report.issues, vec![DagIssue::EmptyGraph]);
    }

    #[test]
    fn two_node_cycle_names_both() {
        let graph = TaskGraph::new(vec![
            TaskNode::new("T1", "read", "fs").after(&["T2"]),
            TaskNode::new("T2", "write", "fs").after(&["T1"]),
        ]);
        let report = validate(&graph, &pool());
        assert!(!report.is_valid());
        let cycle = report
            .errors()
            .into_iter()
            .find(|e| e.starts_with("cycle:"))
            .expect("cycle reported");
        assert!(cycle.contains("T1") && cycle.contains("T2"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = TaskGraph::new(vec![TaskNode::new("a", "read", "fs").after(&["a"])]);
        assert_eq!(find_cycle(&graph), Some(("a".into(), "a".into())));
    }

    #[test]
    fn long_cycle_found_without_recursion() {
        let n = 5_000;
        let mut nodes: Vec<TaskNode> = (0..n)
            .map(|i| TaskNode::new(format!("n{}", i), "read", "fs"))
            .collect();
        for i in 1..n {
            nodes[i].depends_on = vec![format!("n{}", i - 1)];
        }
        nodes[0].depends_on = vec![format!("n{}", n - 1)];
        let graph = TaskGraph::new(nodes);
        assert!(find_cycle(&graph).is_some());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = TaskGraph::new(vec![
            TaskNode::new("a", "read", "fs"),
            TaskNode::new("b", "convert", "conv").after(&["a"]),
            TaskNode::new("c", "convert", "conv").after(&["a"]),
            TaskNode::new("d", "write", "fs").after(&["b", "c"]),
        ]);
        assert_eq!(find_cycle(&graph), None);
    }

    #[test]
    fn errors_accumulate() {
        let graph = TaskGraph::new(vec![
            TaskNode::new("a", "read", "fs"),
            TaskNode::new("a", "write", "fs"),
            TaskNode::new("b", "teleport", "fs").after(&["ghost"]),
            TaskNode::new("c", "", "fs"),
        ]);
        let report = validate(&graph, &pool());
        assert!(report.issues.contains(&DagIssue::DuplicateId("a".into())));
        assert!(report.issues.contains(&DagIssue::MissingDependency {
            node: "b".into(),
            dependency: "ghost".into(),
        }));
        assert!(report
            .errors()
            .iter()
            .any(|e| e.starts_with("hallucinated capability: task b")));
        assert!(report.issues.contains(&DagIssue::EmptyField {
            node: "c".into(),
            field: "capability",
        }));
    }

    #[test]
    fn agent_capability_pair_must_match() {
        // both names exist in the pool, but not as a pair
        let graph = TaskGraph::new(vec![TaskNode::new("a", "convert", "fs")]);
        let report = validate(&graph, &pool());
        assert!(matches!(report.issues[0], DagIssue::Hallucinated { .. }));
    }

    #[test]
    fn validation_is_pure() {
        let graph = TaskGraph::new(vec![
            TaskNode::new("T1", "read", "fs").after(&["T2"]),
            TaskNode::new("T2", "write", "fs").after(&["T1"]),
        ]);
        let p = pool();
        assert_eq!(validate(&graph, &p), validate(&graph, &p));
    }
}
