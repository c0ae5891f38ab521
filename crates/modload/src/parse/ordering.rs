//! Decode order of pending blocks
use std::collections::{BTreeMap, BTreeSet};

/// Cycles among declared dependencies
///
/// Carries the order of every block that is not part of a cycle so decoding can go on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle: {}", self.describe())]
pub struct OrderingError {
    pub cycles: Vec<Vec<String>>,
    pub order: Vec<String>,
}

impl OrderingError {
    fn describe(&self) -> String {
        self.cycles
            .iter()
            .map(|cycle| cycle.join(" -> "))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn participants(&self) -> impl Iterator<Item = &String> {
        self.cycles.iter().flatten()
    }
}

/// Nodes in declaration order and "depends on" edges between them
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: BTreeMap<String, usize>,
    depends_on: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn add_node(&mut self, key: &str) -> usize {
        if let Some(&index) = self.index.get(key) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(key.to_string());
        self.index.insert(key.to_string(), index);
        self.depends_on.push(BTreeSet::new());
        index
    }

    /// `from` must be decoded after `to`. Edges to unknown nodes are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let (Some(&from), Some(&to)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        self.depends_on[from].insert(to);
    }

    /// Topological order, ties broken by declaration order
    pub fn order(&self) -> Result<Vec<String>, OrderingError> {
        let cycles = self.cycles();
        let excluded: BTreeSet<usize> = cycles.iter().flatten().copied().collect();

        let mut remaining: Vec<usize> = self
            .depends_on
            .iter()
            .enumerate()
            .map(|(node, deps)| {
                deps.iter()
                    .filter(|dep| **dep != node && !excluded.contains(dep))
                    .count()
            })
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![vec![]; self.nodes.len()];
        for (node, deps) in self.depends_on.iter().enumerate() {
            for &dep in deps {
                if dep != node && !excluded.contains(&dep) {
                    dependents[dep].push(node);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|node| remaining[*node] == 0 && !excluded.contains(node))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(self.nodes[node].clone());
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 && !excluded.contains(&dependent) {
                    ready.insert(dependent);
                }
            }
        }

        if cycles.is_empty() {
            return Ok(order);
        }

        Err(OrderingError {
            cycles: cycles
                .into_iter()
                .map(|cycle| cycle.into_iter().map(|n| self.nodes[n].clone()).collect())
                .collect(),
            order,
        })
    }

    /// Strongly connected components with more than one node, and self loops (Tarjan)
    ///
    /// Iterative, so long dependency chains do not grow the call stack.
    fn cycles(&self) -> Vec<Vec<usize>> {
        struct Tarjan {
            next_index: usize,
            index: Vec<Option<usize>>,
            low_link: Vec<usize>,
            on_stack: Vec<bool>,
            stack: Vec<usize>,
        }

        impl Tarjan {
            fn enter(&mut self, node: usize) {
                self.index[node] = Some(self.next_index);
                self.low_link[node] = self.next_index;
                self.next_index += 1;
                self.stack.push(node);
                self.on_stack[node] = true;
            }
        }

        let count = self.nodes.len();
        let deps: Vec<Vec<usize>> = self
            .depends_on
            .iter()
            .map(|d| d.iter().copied().collect())
            .collect();
        let mut tarjan = Tarjan {
            next_index: 0,
            index: vec![None; count],
            low_link: vec![0; count],
            on_stack: vec![false; count],
            stack: vec![],
        };
        let mut cycles = vec![];

        for root in 0..count {
            if tarjan.index[root].is_some() {
                continue;
            }
            tarjan.enter(root);
            // (node, position of the next dependency to visit)
            let mut work = vec![(root, 0)];

            while let Some(&(node, position)) = work.last() {
                if let Some(&dep) = deps[node].get(position) {
                    if let Some(frame) = work.last_mut() {
                        frame.1 += 1;
                    }
                    match tarjan.index[dep] {
                        None => {
                            tarjan.enter(dep);
                            work.push((dep, 0));
                        }
                        Some(dep_index) if tarjan.on_stack[dep] => {
                            tarjan.low_link[node] = tarjan.low_link[node].min(dep_index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    tarjan.low_link[parent] = tarjan.low_link[parent].min(tarjan.low_link[node]);
                }
                if Some(tarjan.low_link[node]) != tarjan.index[node] {
                    continue;
                }

                let mut component = vec![];
                while let Some(member) = tarjan.stack.pop() {
                    tarjan.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                if component.len() > 1 || self.depends_on[node].contains(&node) {
                    component.sort_unstable();
                    cycles.push(component);
                }
            }
        }

        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for node in nodes {
            graph.add_node(node);
        }
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    #[test]
    fn declaration_order_without_edges() {
        let graph = graph(&["c", "a", "b"], &[]);
        assert_eq!(graph.order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn dependencies_come_first() {
        let graph = graph(&["a", "b", "c"], &[("a", "c"), ("b", "a")]);
        assert_eq!(graph.order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn cycles_are_reported_with_the_remaining_order() {
        let graph = graph(
            &["x", "y", "z", "self"],
            &[("x", "y"), ("y", "x"), ("self", "self")],
        );
        let err = graph.order().unwrap_err();

        assert_eq!(
            err.cycles,
            vec![vec!["x".to_string(), "y".to_string()], vec!["self".to_string()]]
        );
        assert_eq!(err.order, vec!["z"]);
        assert_eq!(err.to_string(), "dependency cycle: x -> y; self");
    }

    #[test]
    fn long_chains_are_ordered_without_recursion() {
        let names: Vec<String> = (0..100_000).map(|i| format!("n{i}")).collect();
        let mut graph = DependencyGraph::default();
        for name in &names {
            graph.add_node(name);
        }
        for pair in names.windows(2) {
            graph.add_edge(&pair[0], &pair[1]);
        }
        // closing the chain makes every node part of one cycle
        let mut closed = graph.clone();
        closed.add_edge(&names[names.len() - 1], &names[0]);

        let order = graph.order().unwrap();
        assert_eq!(order.first(), names.last());
        assert_eq!(order.last(), names.first());

        let err = closed.order().unwrap_err();
        assert_eq!(err.cycles.len(), 1);
        assert_eq!(err.cycles[0].len(), names.len());
        assert!(err.order.is_empty());
    }
}
