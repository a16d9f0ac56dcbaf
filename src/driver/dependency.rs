//! Duplicate detection and dependency ordering of generated equations.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use log::{debug, warn};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::ErrorKind;
use crate::expand::Compiled;

/// A generated equation with the variable it defines and the current-period
/// variables it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquationEntry {
    pub text: String,
    pub defines: Option<String>,
    pub references: Vec<String>,
}

impl EquationEntry {
    pub fn from_compiled(compiled: &Compiled) -> Self {
        Self {
            text: compiled.to_string(),
            defines: compiled.defined_variable().map(String::from),
            references: compiled.referenced_variables(),
        }
    }
}

/// Generated equations in generation order, at most one per defined variable.
#[derive(Debug, Default)]
pub struct EquationSet {
    entries: Vec<Option<EquationEntry>>,
    definers: HashMap<String, usize>,
}

impl EquationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equation. Defining an already defined variable is an error
    /// unless `overriding`, in which case the earlier equation is dropped.
    pub fn push(&mut self, entry: EquationEntry, overriding: bool) -> Result<(), ErrorKind> {
        if let Some(name) = &entry.defines {
            if let Some(&previous) = self.definers.get(name) {
                if !overriding {
                    return Err(ErrorKind::DuplicateDefinition(name.clone()));
                }
                if let Some(dropped) = self.entries[previous].take() {
                    warn!("`{}` replaces `{}`", entry.text, dropped.text);
                }
            }
            self.definers.insert(name.clone(), self.entries.len());
        }
        self.entries.push(Some(entry));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &EquationEntry> {
        self.entries.iter().flatten()
    }

    pub fn in_source_order(&self) -> Vec<&str> {
        self.iter().map(|e| e.text.as_str()).collect()
    }

    /// Equations ordered so that each comes after the equations defining the
    /// variables it reads. Ties, and equations in a simultaneous block, keep
    /// generation order.
    pub fn in_dependency_order(&self) -> Vec<&str> {
        let entries = self.iter().collect::<Vec<_>>();
        let mut graph = DiGraph::<usize, ()>::with_capacity(entries.len(), 0);
        let nodes = (0..entries.len())
            .map(|i| graph.add_node(i))
            .collect::<Vec<_>>();
        let definers = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.defines.as_deref().map(|name| (name, i)))
            .collect::<HashMap<_, _>>();
        for (i, entry) in entries.iter().enumerate() {
            for name in &entry.references {
                match definers.get(name.as_str()) {
                    Some(&j) if j != i => {
                        graph.update_edge(nodes[j], nodes[i], ());
                    }
                    _ => {}
                }
            }
        }

        // collapse simultaneous blocks, then order the blocks
        let mut components = tarjan_scc(&graph);
        for component in components.iter_mut() {
            component.sort_by_key(|n| graph[*n]);
        }
        let mut component_of = vec![0; entries.len()];
        for (c, component) in components.iter().enumerate() {
            for node in component {
                component_of[graph[*node]] = c;
            }
        }
        if components.iter().any(|c| c.len() > 1) {
            debug!(
                "{} simultaneous blocks",
                components.iter().filter(|c| c.len() > 1).count()
            );
        }

        let mut successors = vec![Vec::new(); components.len()];
        let mut in_degree = vec![0usize; components.len()];
        for edge in graph.raw_edges() {
            let from = component_of[graph[edge.source()]];
            let to = component_of[graph[edge.target()]];
            if from != to && !successors[from].contains(&to) {
                successors[from].push(to);
                in_degree[to] += 1;
            }
        }

        let first = |c: usize| -> usize { graph[components[c][0]] };
        let mut ready = (0..components.len())
            .filter(|c| in_degree[*c] == 0)
            .map(|c| Reverse((first(c), c)))
            .collect::<BinaryHeap<_>>();
        let mut ordered = Vec::with_capacity(entries.len());
        while let Some(Reverse((_, c))) = ready.pop() {
            ordered.extend(
                components[c]
                    .iter()
                    .map(|n: &NodeIndex| entries[graph[*n]].text.as_str()),
            );
            for &next in &successors[c] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((first(next), next)));
                }
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, defines: &str, references: &[&str]) -> EquationEntry {
        EquationEntry {
            text: text.to_string(),
            defines: Some(defines.to_string()),
            references: references.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let mut set = EquationSet::new();
        set.push(entry("X = 1", "X", &[]), false).unwrap();
        assert_eq!(
            set.push(entry("X = 2", "X", &[]), false),
            Err(ErrorKind::DuplicateDefinition("X".to_string()))
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn override_replaces_earlier_definition() {
        let mut set = EquationSet::new();
        set.push(entry("X = 1", "X", &[]), false).unwrap();
        set.push(entry("Y = X", "Y", &["X"]), false).unwrap();
        set.push(entry("X = 2", "X", &[]), true).unwrap();
        assert_eq!(set.in_source_order(), vec!["Y = X", "X = 2"]);
    }

    #[test]
    fn dependencies_come_first() {
        let mut set = EquationSet::new();
        set.push(entry("C = A + B", "C", &["A", "B"]), false).unwrap();
        set.push(entry("B = A", "B", &["A"]), false).unwrap();
        set.push(entry("D = 1", "D", &[]), false).unwrap();
        set.push(entry("A = 1", "A", &[]), false).unwrap();
        assert_eq!(
            set.in_dependency_order(),
            vec!["D = 1", "A = 1", "B = A", "C = A + B"]
        );
    }

    #[test]
    fn cycles_keep_source_order() {
        let mut set = EquationSet::new();
        set.push(entry("Z = X", "Z", &["X"]), false).unwrap();
        set.push(entry("X = Y", "X", &["Y"]), false).unwrap();
        set.push(entry("Y = X + W", "Y", &["X", "W"]), false).unwrap();
        set.push(entry("W = 1", "W", &[]), false).unwrap();
        assert_eq!(
            set.in_dependency_order(),
            vec!["W = 1", "X = Y", "Y = X + W", "Z = X"]
        );
    }

    #[test]
    fn lines_without_definition_follow_their_inputs() {
        let mut set = EquationSet::new();
        set.push(
            EquationEntry {
                text: "PQ * Q = PA * A".to_string(),
                defines: None,
                references: vec!["PA".to_string(), "A".to_string()],
            },
            false,
        )
        .unwrap();
        set.push(entry("A = 1", "A", &[]), false).unwrap();
        assert_eq!(set.in_dependency_order(), vec!["A = 1", "PQ * Q = PA * A"]);
    }
}
