//! The per-result data model: one [`Node`] per artifact or visualization.

use crate::error::ParseError;
use crate::graph::Id;
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod loader;
pub mod value;

pub use loader::*;
pub use value::*;

/// Role name given to artifacts that reached an action as metadata parameters.
/// Their real semantic type is recorded on their own node.
pub const ARTIFACT_AS_METADATA_ROLE: &str = "artifact_passed_as_metadata";

/// Basic facts about one result, from its `metadata.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub id: Id,
    pub semantic_type: String,
    pub data_format: Option<String>,
}

impl fmt::Display for ResultMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Id:\t\t{}\nType:\t\t{}\nData Format:\t{}",
            self.id,
            self.semantic_type,
            self.data_format.as_deref().unwrap_or("None")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Import,
    Method,
    Visualizer,
    Pipeline,
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import" => Ok(ActionType::Import),
            "method" => Ok(ActionType::Method),
            "visualizer" => Ok(ActionType::Visualizer),
            "pipeline" => Ok(ActionType::Pipeline),
            other => Err(format!("unknown action type '{}'", other)),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionType::Import => "import",
            ActionType::Method => "method",
            ActionType::Visualizer => "visualizer",
            ActionType::Pipeline => "pipeline",
        };
        f.write_str(label)
    }
}

/// The recorded step that produced a node, from its `action/action.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub action_type: ActionType,
    /// `"framework"` for imports.
    pub plugin_name: String,
    /// `"import"` for imports.
    pub action_name: String,
    pub runtime_start: Option<DateTime<FixedOffset>>,
    pub runtime_end: Option<DateTime<FixedOffset>>,
    pub runtime_duration_text: Option<String>,
    /// Artifact inputs, one slot per id. Collection inputs are expanded into
    /// `name_0`, `name_1`, ... Always empty for imports.
    pub inputs: Vec<(String, Id)>,
    /// Non-artifact parameters in recorded order.
    pub parameters: Vec<(String, ProvValue)>,
    pub output_name: Option<String>,
    /// The imported format, for imports.
    pub format: Option<String>,
    pub transformers: Option<ProvValue>,
    pub environment: Option<ProvValue>,
}

impl Action {
    /// Elapsed time between the recorded start and end timestamps.
    pub fn runtime(&self) -> Option<Duration> {
        match (self.runtime_start, self.runtime_end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ProvValue> {
        self.parameters
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, v)| v)
    }

    /// `{parameter name: metadata info}` for every metadata-tagged parameter.
    pub fn metadata_parameters(&self) -> impl Iterator<Item = (&str, &MetadataInfo)> {
        self.parameters.iter().filter_map(|(name, value)| match value {
            ProvValue::Metadata(md) => Some((name.as_str(), md)),
            _ => None,
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Action(action_id={}, type={}, plugin={}, action={})",
            self.action_id, self.action_type, self.plugin_name, self.action_name
        )
    }
}

/// One bibliographic entry, kept opaque apart from its type and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub entry_type: String,
    pub key: String,
    pub fields: BTreeMap<String, String>,
}

pub type Citations = BTreeMap<String, CitationRecord>;

/// A metadata table, as loaded by a [`MetadataTableLoader`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MetadataTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of the column named `name`, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

/// One result in a provenance graph.
///
/// The id is fixed at construction. Renaming goes through
/// [`ProvenanceGraph::relabel`](crate::graph::ProvenanceGraph::relabel), which
/// keeps graph keys and payloads in step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) metadata: ResultMetadata,
    pub(crate) archive_version: String,
    pub(crate) framework_version: String,
    pub(crate) action: Option<Action>,
    pub(crate) citations: Citations,
    pub(crate) metadata_tables: Option<BTreeMap<String, MetadataTable>>,
    pub(crate) artifacts_passed_as_metadata: Vec<Id>,
}

impl Node {
    /// Assembles a node, enforcing the import and no-provenance invariants.
    pub fn new(
        metadata: ResultMetadata,
        archive_version: impl Into<String>,
        framework_version: impl Into<String>,
        action: Option<Action>,
        citations: Citations,
        metadata_tables: Option<BTreeMap<String, MetadataTable>>,
    ) -> Result<Self, ParseError> {
        let archive_version = archive_version.into();
        let has_provenance = archive_version != "0";
        if has_provenance && action.is_none() {
            return Err(ParseError::MalformedArchive(format!(
                "node {} declares format {} but has no action record",
                metadata.id, archive_version
            )));
        }

        let (mut action, metadata_tables) = if has_provenance {
            (action, metadata_tables)
        } else {
            (None, None)
        };
        if let Some(import) = action
            .as_mut()
            .filter(|a| a.action_type == ActionType::Import)
        {
            import.inputs.clear();
        }
        let artifacts_passed_as_metadata = action
            .iter()
            .flat_map(|a| a.metadata_parameters())
            .flat_map(|(_, md)| md.input_artifact_ids.iter().cloned())
            .collect();

        Ok(Self {
            metadata,
            archive_version,
            framework_version: framework_version.into(),
            action,
            citations,
            metadata_tables,
            artifacts_passed_as_metadata,
        })
    }

    pub fn id(&self) -> &Id {
        &self.metadata.id
    }

    pub fn semantic_type(&self) -> &str {
        &self.metadata.semantic_type
    }

    pub fn data_format(&self) -> Option<&str> {
        self.metadata.data_format.as_deref()
    }

    pub fn result_metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn archive_version(&self) -> &str {
        &self.archive_version
    }

    pub fn framework_version(&self) -> &str {
        &self.framework_version
    }

    /// False only for results written before provenance tracking existed.
    pub fn has_provenance(&self) -> bool {
        self.archive_version != "0"
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn citations(&self) -> &Citations {
        &self.citations
    }

    /// `None` if metadata parsing was disabled or the node has no provenance,
    /// `Some({})` if the action took no metadata parameters.
    pub fn metadata_tables(&self) -> Option<&BTreeMap<String, MetadataTable>> {
        self.metadata_tables.as_ref()
    }

    /// Ids of artifacts passed to this node's action as metadata.
    pub fn artifacts_passed_as_metadata(&self) -> &[Id] {
        &self.artifacts_passed_as_metadata
    }

    /// `(role, id)` for every parent: the action's inputs, then any artifacts
    /// passed as metadata. `None` when the node has no provenance.
    pub fn parents(&self) -> Option<Vec<(String, Id)>> {
        let action = self.action.as_ref().filter(|_| self.has_provenance())?;
        let mut parents = action.inputs.clone();
        parents.extend(
            self.artifacts_passed_as_metadata
                .iter()
                .map(|id| (ARTIFACT_AS_METADATA_ROLE.to_string(), id.clone())),
        );
        Some(parents)
    }

    /// Renames this node and every id it refers to. Only the owning graph calls this.
    pub(crate) fn relabel(&mut self, rename: impl Fn(&str) -> Id) {
        self.metadata.id = rename(self.metadata.id.as_str());
        if let Some(action) = self.action.as_mut() {
            for (_, id) in action.inputs.iter_mut() {
                *id = rename(id.as_str());
            }
            for (_, value) in action.parameters.iter_mut() {
                value.rename_ids(&rename);
            }
        }
        for id in self.artifacts_passed_as_metadata.iter_mut() {
            *id = rename(id.as_str());
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metadata)
    }
}
