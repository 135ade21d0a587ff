use super::{Id, ProvenanceGraph};
use crate::node::Node;
use std::collections::BTreeSet;

/// A read-only, filtered view over a [`ProvenanceGraph`].
///
/// Only member vertices and the edges between them are visible.
#[derive(Debug, Clone)]
pub struct CollapsedView<'a> {
    graph: &'a ProvenanceGraph,
    members: BTreeSet<Id>,
}

impl<'a> CollapsedView<'a> {
    pub(super) fn new(graph: &'a ProvenanceGraph, members: BTreeSet<Id>) -> Self {
        Self { graph, members }
    }

    pub fn graph(&self) -> &'a ProvenanceGraph {
        self.graph
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn node_ids(&self) -> &BTreeSet<Id> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get_node(&self, id: &str) -> Option<&'a Node> {
        if !self.contains(id) {
            return None;
        }
        self.graph.get_node(id).ok().flatten()
    }

    pub fn predecessors(&self, id: &str) -> BTreeSet<&'a Id> {
        self.neighbors(id, self.graph.predecessors(id).ok())
    }

    pub fn successors(&self, id: &str) -> BTreeSet<&'a Id> {
        self.neighbors(id, self.graph.successors(id).ok())
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.successors(id).len()
    }

    /// `(parent, child)` edges with both ends inside the view, sorted.
    pub fn edges(&self) -> Vec<(&'a Id, &'a Id)> {
        self.graph
            .edges()
            .into_iter()
            .filter(|(parent, child)| self.contains(parent) && self.contains(child))
            .collect()
    }

    /// Members without children inside the view.
    pub fn terminal_ids(&self) -> BTreeSet<Id> {
        self.members
            .iter()
            .filter(|id| self.out_degree(id) == 0)
            .cloned()
            .collect()
    }

    fn neighbors(&self, id: &str, adjacent: Option<&'a BTreeSet<Id>>) -> BTreeSet<&'a Id> {
        match adjacent {
            Some(ids) if self.contains(id) => ids.iter().filter(|n| self.contains(n)).collect(),
            _ => BTreeSet::new(),
        }
    }
}
