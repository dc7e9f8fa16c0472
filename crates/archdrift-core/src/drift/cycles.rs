use super::{Hit, RuleView};
use crate::graph::CodeNode;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// One hit per strongly connected component with a cycle in it.
pub(crate) fn check(view: &RuleView<'_>) -> Vec<Hit> {
    let mut graph: DiGraph<&CodeNode, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in view.nodes() {
        index.insert(node.id.as_str(), graph.add_node(node));
    }

    let mut successors: BTreeMap<NodeIndex, BTreeSet<NodeIndex>> = BTreeMap::new();
    for (edge, _, _) in view.edges() {
        if let (Some(&from), Some(&to)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            if successors.entry(from).or_default().insert(to) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let kinds: Vec<&str> = view.rule().edges.iter().map(|k| k.as_str()).collect();
    let expected = format!("no cycles over {} edges", kinds.join("/"));

    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| {
            scc.len() > 1 || successors.get(&scc[0]).is_some_and(|next| next.contains(&scc[0]))
        })
        .map(|scc| {
            let members: BTreeSet<NodeIndex> = scc.iter().copied().collect();
            let mut names: Vec<&str> = scc.iter().map(|&i| graph[i].name.as_str()).collect();
            names.sort_unstable();
            let component = names.join(", ");

            let path = representative_cycle(&graph, &successors, &members);
            let instance = path
                .iter()
                .map(|&i| graph[i].name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");

            Hit {
                explanation: format!(
                    "{} components depend on each other in a cycle: {}",
                    names.len(),
                    component
                ),
                suggested_fix: "Break the cycle by inverting one dependency or extracting the shared part into its own component"
                    .to_string(),
                expected: expected.clone(),
                instance,
                component,
            }
        })
        .collect()
}

/// Shortest cycle through the member with the smallest name, closed back
/// onto its start.
fn representative_cycle(
    graph: &DiGraph<&CodeNode, ()>,
    successors: &BTreeMap<NodeIndex, BTreeSet<NodeIndex>>,
    members: &BTreeSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let Some(&start) = members.iter().min_by_key(|&&i| graph[i].name.as_str()) else {
        return Vec::new();
    };
    let next_of = |node: NodeIndex| {
        let mut next: Vec<NodeIndex> = successors
            .get(&node)
            .map(|s| s.iter().copied().filter(|n| members.contains(n)).collect())
            .unwrap_or_default();
        next.sort_by_key(|&n| graph[n].name.as_str());
        next
    };

    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for next in next_of(current) {
            if next == start {
                let mut path = vec![start];
                let mut cursor = current;
                while cursor != start {
                    path.push(cursor);
                    cursor = parent[&cursor];
                }
                path.push(start);
                let len = path.len();
                path[1..len - 1].reverse();
                return path;
            }
            if next != start && !parent.contains_key(&next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }
    vec![start]
}
