//! Turns one archive into a [`GraphBuildResult`].
//!
//! A single [`ArchiveParser`] serves every supported format revision: the
//! archive's VERSION picks a row of [`FORMAT_TABLE`], and that row decides which
//! files each node must carry and how checksums are treated.

use crate::archive::{
    ArchiveReader, ChecksumDiff, ValidationCode, VERSION_FILE, node_provenance_dir,
    owning_node_id, read_version,
};
use crate::config::Config;
use crate::error::ParseError;
use crate::graph::{Id, ProvenanceGraph};
use crate::node::{
    BibtexCitationParser, CitationParser, METADATA_FILE, MetadataTableLoader, Node, NodeLoader,
    TsvTableLoader,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

pub mod dispatch;
pub mod format;

pub use dispatch::*;
pub use format::*;

/// Everything one archive parse produces, before graph construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBuildResult {
    pub origin_ids: BTreeSet<Id>,
    pub node_map: BTreeMap<Id, Node>,
    pub validity: ValidationCode,
    pub checksum_diff: Option<ChecksumDiff>,
    /// User-facing notices, e.g. for results that predate provenance tracking.
    pub warnings: Vec<String>,
}

pub struct ArchiveParser {
    config: Config,
    table_loader: Box<dyn MetadataTableLoader>,
    citation_parser: Box<dyn CitationParser>,
}

pub struct ArchiveParserBuilder {
    config: Config,
    table_loader: Box<dyn MetadataTableLoader>,
    citation_parser: Box<dyn CitationParser>,
}

impl ArchiveParserBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            table_loader: Box::new(TsvTableLoader),
            citation_parser: Box::new(BibtexCitationParser),
        }
    }

    pub fn with_table_loader(mut self, loader: Box<dyn MetadataTableLoader>) -> Self {
        self.table_loader = loader;
        self
    }

    pub fn with_citation_parser(mut self, parser: Box<dyn CitationParser>) -> Self {
        self.citation_parser = parser;
        self
    }

    pub fn build(self) -> ArchiveParser {
        ArchiveParser {
            config: self.config,
            table_loader: self.table_loader,
            citation_parser: self.citation_parser,
        }
    }
}

impl ArchiveParser {
    /// A parser with the default TSV table loader and BibTeX citation parser.
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> ArchiveParserBuilder {
        ArchiveParserBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parses the archive file at `path`. The file handle is released before returning.
    pub fn parse_path(&self, path: impl AsRef<Path>) -> Result<GraphBuildResult, ParseError> {
        let mut archive = ArchiveReader::open(path)?;
        self.parse_archive(&mut archive)
    }

    pub fn parse_bytes(
        &self,
        bytes: Vec<u8>,
        name: impl Into<String>,
    ) -> Result<GraphBuildResult, ParseError> {
        let mut archive = ArchiveReader::from_bytes(bytes, name)?;
        self.parse_archive(&mut archive)
    }

    /// Reads the root VERSION, selects the matching format and parses with it.
    pub fn parse_archive(
        &self,
        archive: &mut ArchiveReader,
    ) -> Result<GraphBuildResult, ParseError> {
        let version = read_version(archive, None)?;
        let format = format_for(&version.archive)?;
        verbose_event!(
            self.config.verbose,
            archive = archive.name(),
            format = format.version,
            framework = %version.framework,
            "selected archive format"
        );
        self.parse_with_format(archive, format)
    }

    /// Parses `archive` under the rules of `format`.
    ///
    /// Fails fast: a missing required file or malformed record aborts the whole
    /// parse and no partial result is returned.
    pub fn parse_with_format(
        &self,
        archive: &mut ArchiveReader,
        format: &FormatSpec,
    ) -> Result<GraphBuildResult, ParseError> {
        let root_id = archive.root_id()?;
        let (validity, checksum_diff) = format.checksum_strategy.run(&self.config, archive)?;

        let root_metadata = format!("{}/{}", root_id, METADATA_FILE);
        if !archive.contains(&root_metadata) {
            return Err(ParseError::MalformedArchive(format!(
                "root metadata.yaml misplaced or nonexistent in {}",
                archive.name()
            )));
        }

        let loader = NodeLoader::new(
            &self.config,
            self.table_loader.as_ref(),
            self.citation_parser.as_ref(),
        );
        let mut node_map = BTreeMap::new();
        let mut warnings = Vec::new();

        if !format.has_provenance() {
            let message = format!(
                "Artifact {} was created prior to provenance tracking. \
                 Provenance data will be incomplete.",
                root_id
            );
            warn!("{}", message);
            warnings.push(message);

            let files = [root_metadata, format!("{}/{}", root_id, VERSION_FILE)];
            let node = loader.load(archive, &root_id, &files)?;
            node_map.insert(root_id.clone(), node);
        } else {
            for (id, files) in group_provenance_files(archive, &root_id, format) {
                let node_format = node_format(archive, &root_id, &id, &files)?;
                require_node_files(&root_id, &id, &files, node_format)?;
                let node = loader.load(archive, &id, &files)?;
                node_map.insert(id, node);
            }
            warnings.extend(untracked_parent_warnings(&node_map));
        }

        verbose_event!(
            self.config.verbose,
            archive = archive.name(),
            nodes = node_map.len(),
            validity = %validity,
            "parsed archive"
        );
        Ok(GraphBuildResult {
            origin_ids: BTreeSet::from([root_id]),
            node_map,
            validity,
            checksum_diff,
            warnings,
        })
    }
}

/// Parses every input and unions the results into one graph.
pub fn parse_all<I>(inputs: I, config: Config) -> Result<ProvenanceGraph, ParseError>
where
    I: IntoIterator,
    I::Item: Into<ProvenanceInput>,
{
    ParserDispatcher::new(config).parse_all(inputs)
}

/// Groups the provenance files `format` cares about by the node that owns them.
///
/// The root always gets a group, even an empty one, so a root without
/// provenance files fails the required-file check instead of vanishing.
fn group_provenance_files(
    archive: &ArchiveReader,
    root_id: &str,
    format: &FormatSpec,
) -> BTreeMap<Id, Vec<String>> {
    let mut groups: BTreeMap<Id, Vec<String>> = BTreeMap::new();
    groups.entry(root_id.to_string()).or_default();

    for path in archive.file_entries() {
        let Some(id) = owning_node_id(root_id, path) else {
            continue;
        };
        let node_dir = node_provenance_dir(root_id, id);
        let Some(relative) = path
            .strip_prefix(node_dir.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            continue;
        };
        if format.every_node_files.contains(&relative) {
            groups.entry(id.to_string()).or_default().push(path.to_string());
        }
    }

    for file in format.root_only_files {
        let path = format!("{}/{}", root_id, file);
        if archive.contains(&path) {
            groups.entry(root_id.to_string()).or_default().push(path);
        }
    }
    groups
}

/// Reads a node's own VERSION: ancestors may come from older formats than the root.
fn node_format(
    archive: &mut ArchiveReader,
    root_id: &str,
    id: &str,
    files: &[String],
) -> Result<&'static FormatSpec, ParseError> {
    let version_path = format!("{}/{}", node_provenance_dir(root_id, id), VERSION_FILE);
    if !files.contains(&version_path) {
        return Err(missing_file(VERSION_FILE, id, root_id));
    }
    let version = read_version(archive, Some(version_path.as_str()))?;
    format_for(&version.archive)
}

fn require_node_files(
    root_id: &str,
    id: &str,
    files: &[String],
    format: &FormatSpec,
) -> Result<(), ParseError> {
    let node_dir = node_provenance_dir(root_id, id);
    for file in format.every_node_files {
        let expected = format!("{}/{}", node_dir, file);
        if !files.contains(&expected) {
            return Err(missing_file(file, id, root_id));
        }
    }
    Ok(())
}

fn missing_file(file: &str, id: &str, root_id: &str) -> ParseError {
    ParseError::MalformedArchive(format!(
        "Expected {} for node {} in archive {}: file misplaced or nonexistent",
        file, id, root_id
    ))
}

/// Notices for parents that were referenced but have no record in the archive.
fn untracked_parent_warnings(node_map: &BTreeMap<Id, Node>) -> Vec<String> {
    let untracked: BTreeSet<Id> = node_map
        .values()
        .filter_map(Node::parents)
        .flatten()
        .map(|(_, id)| id)
        .filter(|id| !node_map.contains_key(id))
        .collect();

    untracked
        .into_iter()
        .map(|id| {
            let message = format!(
                "Artifact {} was created prior to provenance tracking. \
                 Provenance data will be incomplete.",
                id
            );
            warn!("{}", message);
            message
        })
        .collect()
}
