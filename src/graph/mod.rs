//! The provenance DAG: one vertex per result, one edge per parent relationship.
//!
//! Edges point from parent to child. A vertex carries the parsed [`Node`] when
//! the archive recorded one, and `None` for ids only ever seen as someone's parent.

use crate::archive::{ChecksumDiff, ValidationCode};
use crate::config::Config;
use crate::error::{GraphError, ParseError};
use crate::node::Node;
use crate::parser::{GraphBuildResult, ParserDispatcher, ProvenanceInput};
use ahash::{AHashMap, AHashSet};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;

mod view;

pub use view::CollapsedView;

/// An opaque result identifier, unique across archives.
pub type Id = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `false` for unpayloaded vertices and for results that predate provenance.
    pub has_provenance: bool,
    pub node: Option<Node>,
}

impl GraphNode {
    fn new(node: Option<Node>) -> Self {
        Self {
            has_provenance: node.as_ref().is_some_and(Node::has_provenance),
            node,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceGraph {
    nodes: AHashMap<Id, GraphNode>,
    predecessors: AHashMap<Id, BTreeSet<Id>>,
    successors: AHashMap<Id, BTreeSet<Id>>,
    origin_ids: BTreeSet<Id>,
    validity: ValidationCode,
    checksum_diff: Option<ChecksumDiff>,
    warnings: Vec<String>,
    #[serde(skip)]
    terminal_ids: OnceLock<BTreeSet<Id>>,
}

impl ProvenanceGraph {
    /// A graph with no vertices. Its validity is `Valid`, the identity for union.
    pub fn empty() -> Self {
        Self {
            nodes: AHashMap::new(),
            predecessors: AHashMap::new(),
            successors: AHashMap::new(),
            origin_ids: BTreeSet::new(),
            validity: ValidationCode::Valid,
            checksum_diff: None,
            warnings: Vec::new(),
            terminal_ids: OnceLock::new(),
        }
    }

    pub fn from_build(build: GraphBuildResult) -> Self {
        Self::from_builds([build])
    }

    /// Builds one graph from any number of parse results.
    ///
    /// Every payloaded node contributes an edge from each of its parents.
    pub fn from_builds(builds: impl IntoIterator<Item = GraphBuildResult>) -> Self {
        let mut graph = Self::empty();
        for build in builds {
            graph.validity = graph.validity.worst(build.validity);
            graph.checksum_diff =
                ChecksumDiff::merge_optional(graph.checksum_diff.take(), build.checksum_diff);
            graph.origin_ids.extend(build.origin_ids);
            graph.warnings.extend(build.warnings);

            for (id, node) in build.node_map {
                let parents = node.parents().unwrap_or_default();
                graph.insert_vertex(id.clone(), GraphNode::new(Some(node)));
                for (_, parent) in parents {
                    graph.add_edge(parent, id.clone());
                }
            }
        }
        graph
    }

    /// Parses any supported input with the default dispatcher.
    pub fn from_input(input: impl Into<ProvenanceInput>, config: Config) -> Result<Self, ParseError> {
        ParserDispatcher::new(config).parse(input)
    }

    /// Adds or replaces a vertex. An existing payload is never replaced by `None`.
    fn insert_vertex(&mut self, id: Id, vertex: GraphNode) {
        match self.nodes.get_mut(&id) {
            Some(existing) if vertex.node.is_none() => {
                existing.has_provenance |= vertex.has_provenance;
            }
            Some(existing) => *existing = vertex,
            None => {
                self.predecessors.entry(id.clone()).or_default();
                self.successors.entry(id.clone()).or_default();
                self.nodes.insert(id, vertex);
            }
        }
    }

    fn add_edge(&mut self, parent: Id, child: Id) {
        if !self.nodes.contains_key(&parent) {
            self.insert_vertex(parent.clone(), GraphNode::new(None));
        }
        if !self.nodes.contains_key(&child) {
            self.insert_vertex(child.clone(), GraphNode::new(None));
        }
        self.successors
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        self.predecessors.entry(child).or_default().insert(parent);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All vertex ids, sorted.
    pub fn node_ids(&self) -> Vec<&Id> {
        let mut ids: Vec<&Id> = self.nodes.keys().collect();
        ids.sort();
        ids
    }

    /// All `(parent, child)` edges, sorted.
    pub fn edges(&self) -> Vec<(&Id, &Id)> {
        let mut edges: Vec<(&Id, &Id)> = self
            .successors
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |child| (parent, child)))
            .collect();
        edges.sort();
        edges
    }

    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        self.successors
            .get(parent)
            .is_some_and(|children| children.contains(child))
    }

    pub fn predecessors(&self, id: &str) -> Result<&BTreeSet<Id>, GraphError> {
        self.predecessors
            .get(id)
            .ok_or_else(|| GraphError::UnknownId(id.to_string()))
    }

    pub fn successors(&self, id: &str) -> Result<&BTreeSet<Id>, GraphError> {
        self.successors
            .get(id)
            .ok_or_else(|| GraphError::UnknownId(id.to_string()))
    }

    /// The ids callers asked to parse. Not the same as [`Self::terminal_ids`].
    pub fn origin_ids(&self) -> &BTreeSet<Id> {
        &self.origin_ids
    }

    pub fn validity(&self) -> ValidationCode {
        self.validity
    }

    pub fn checksum_diff(&self) -> Option<&ChecksumDiff> {
        self.checksum_diff.as_ref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn get_node(&self, id: &str) -> Result<Option<&Node>, GraphError> {
        self.vertex(id).map(|vertex| vertex.node.as_ref())
    }

    pub fn node_has_provenance(&self, id: &str) -> Result<bool, GraphError> {
        self.vertex(id).map(|vertex| vertex.has_provenance)
    }

    fn vertex(&self, id: &str) -> Result<&GraphNode, GraphError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::UnknownId(id.to_string()))
    }

    /// Ids without children inside the collapsed view. Computed once per mutation.
    pub fn terminal_ids(&self) -> &BTreeSet<Id> {
        self.terminal_ids
            .get_or_init(|| self.collapsed_view().terminal_ids())
    }

    /// Payloads of the terminal vertices, in id order.
    pub fn terminal_nodes(&self) -> Vec<&Node> {
        self.terminal_ids()
            .iter()
            .filter_map(|id| self.nodes.get(id).and_then(|v| v.node.as_ref()))
            .collect()
    }

    /// The origins plus everything reachable from them through predecessor edges.
    ///
    /// Pipeline-internal steps, which only feed other internal steps, are left out.
    pub fn collapsed_view(&self) -> CollapsedView<'_> {
        let mut members = BTreeSet::new();
        for origin in self.origin_ids.iter().filter(|id| self.nodes.contains_key(*id)) {
            members.insert(origin.clone());
            members.extend(self.ancestors(origin));
        }
        CollapsedView::new(self, members)
    }

    /// Every transitive predecessor of `id`, excluding `id` itself.
    pub fn get_ancestor_closure(&self, id: &str) -> Result<BTreeSet<Id>, GraphError> {
        self.vertex(id)?;
        Ok(self.ancestors(id))
    }

    fn ancestors(&self, id: &str) -> BTreeSet<Id> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&Id> = self
            .predecessors
            .get(id)
            .map(|preds| preds.iter().collect())
            .unwrap_or_default();

        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(preds) = self.predecessors.get(next) {
                stack.extend(preds.iter().filter(|p| !seen.contains(*p)));
            }
        }
        seen
    }

    /// Renames vertices in place. Ids absent from `mapping` keep their name.
    ///
    /// Origin ids and node payloads are renamed through the same mapping, and
    /// the terminal-id memo is cleared.
    pub fn relabel(&mut self, mapping: &AHashMap<Id, Id>) -> Result<(), GraphError> {
        if let Some(unknown) = mapping.keys().find(|id| !self.nodes.contains_key(*id)) {
            return Err(GraphError::UnknownId(unknown.clone()));
        }
        let rename = |id: &str| -> Id { mapping.get(id).cloned().unwrap_or_else(|| id.to_string()) };

        let mut renamed = AHashSet::with_capacity(self.nodes.len());
        for id in self.nodes.keys() {
            let new_id = rename(id.as_str());
            if !renamed.insert(new_id.clone()) {
                return Err(GraphError::DuplicateId(new_id));
            }
        }

        self.nodes = self
            .nodes
            .drain()
            .map(|(id, mut vertex)| {
                if let Some(node) = vertex.node.as_mut() {
                    node.relabel(rename);
                }
                (rename(id.as_str()), vertex)
            })
            .collect();
        let rename_adjacency = |adjacency: &mut AHashMap<Id, BTreeSet<Id>>| {
            *adjacency = adjacency
                .drain()
                .map(|(id, ids)| (rename(id.as_str()), ids.iter().map(|i| rename(i.as_str())).collect()))
                .collect();
        };
        rename_adjacency(&mut self.predecessors);
        rename_adjacency(&mut self.successors);
        self.origin_ids = self.origin_ids.iter().map(|id| rename(id.as_str())).collect();

        self.terminal_ids = OnceLock::new();
        Ok(())
    }

    /// Merges `others` into this graph in place.
    ///
    /// Validity becomes the worst code seen and checksum diffs are merged. When
    /// two graphs both carry a payload for one id, the incoming payload wins;
    /// the terminal-id memo is cleared.
    pub fn union(&mut self, others: impl IntoIterator<Item = ProvenanceGraph>) {
        for other in others {
            self.validity = self.validity.worst(other.validity);
            self.checksum_diff =
                ChecksumDiff::merge_optional(self.checksum_diff.take(), other.checksum_diff);
            self.origin_ids.extend(other.origin_ids);
            self.warnings.extend(other.warnings);

            for (id, vertex) in other.nodes {
                self.insert_vertex(id, vertex);
            }
            for (child, parents) in other.predecessors {
                for parent in parents {
                    self.add_edge(parent, child.clone());
                }
            }
        }
        self.terminal_ids = OnceLock::new();
    }

    /// Saves the graph to a file using the bincode format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ParseError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut file = fs::File::create(path).map_err(|e| {
            ParseError::Persistence(format!("Could not create file '{}': {}", path.display(), e))
        })?;
        file.write_all(&bytes).map_err(|e| {
            ParseError::Persistence(format!("Could not write to file '{}': {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Loads a graph saved with [`Self::save`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).map_err(|e| {
            ParseError::Persistence(format!("Could not open file '{}': {}", path.display(), e))
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            ParseError::Persistence(format!("Could not read from file '{}': {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        encode_to_vec(self, standard())
            .map_err(|e| ParseError::Persistence(format!("Serialization failed: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        decode_from_slice(bytes, standard())
            .map(|(graph, _)| graph)
            .map_err(|e| ParseError::Persistence(format!("Deserialization failed: {}", e)))
    }
}

impl Default for ProvenanceGraph {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ProvenanceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProvenanceGraph(nodes={}, edges={}, origins=[{}], validity={})",
            self.nodes.len(),
            self.successors.values().map(BTreeSet::len).sum::<usize>(),
            self.origin_ids.iter().join(", "),
            self.validity
        )
    }
}
