use crate::archive::{CHECKSUM_FILE, ChecksumStrategy, VERSION_FILE};
use crate::error::ParseError;
use crate::node::{CITATIONS_FILE, METADATA_FILE};

/// What one archive format revision guarantees to be on disk.
///
/// `every_node_files` are relative to a node's provenance folder; `root_only_files`
/// are relative to the archive root folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub version: &'static str,
    pub every_node_files: &'static [&'static str],
    pub root_only_files: &'static [&'static str],
    pub checksum_strategy: ChecksumStrategy,
}

impl FormatSpec {
    /// Whether nodes of this format carry recorded provenance.
    pub fn has_provenance(&self) -> bool {
        self.version != "0"
    }
}

const V0_FILES: &[&str] = &[METADATA_FILE, VERSION_FILE];
const V1_FILES: &[&str] = &[METADATA_FILE, VERSION_FILE, ACTION_PATH];
const V4_FILES: &[&str] = &[METADATA_FILE, VERSION_FILE, ACTION_PATH, CITATIONS_FILE];

/// The action record, relative to a node's provenance folder.
pub const ACTION_PATH: &str = "action/action.yaml";

/// Every supported format revision, oldest first.
///
/// Each row's `every_node_files` is a superset of the previous row's. Versions
/// 2 and 3 change only the action schema, not the file set.
pub static FORMAT_TABLE: &[FormatSpec] = &[
    FormatSpec {
        version: "0",
        every_node_files: V0_FILES,
        root_only_files: &[],
        checksum_strategy: ChecksumStrategy::PredatesChecksums,
    },
    FormatSpec {
        version: "1",
        every_node_files: V1_FILES,
        root_only_files: &[],
        checksum_strategy: ChecksumStrategy::PredatesChecksums,
    },
    FormatSpec {
        version: "2",
        every_node_files: V1_FILES,
        root_only_files: &[],
        checksum_strategy: ChecksumStrategy::PredatesChecksums,
    },
    FormatSpec {
        version: "3",
        every_node_files: V1_FILES,
        root_only_files: &[],
        checksum_strategy: ChecksumStrategy::PredatesChecksums,
    },
    FormatSpec {
        version: "4",
        every_node_files: V4_FILES,
        root_only_files: &[],
        checksum_strategy: ChecksumStrategy::PredatesChecksums,
    },
    FormatSpec {
        version: "5",
        every_node_files: V4_FILES,
        root_only_files: &[CHECKSUM_FILE],
        checksum_strategy: ChecksumStrategy::Manifest,
    },
];

/// Looks up the format record for a raw archive version string.
pub fn format_for(version: &str) -> Result<&'static FormatSpec, ParseError> {
    FORMAT_TABLE
        .iter()
        .find(|spec| spec.version == version)
        .ok_or_else(|| ParseError::UnsupportedFormatVersion {
            version: version.to_string(),
        })
}

/// The newest supported format.
pub fn latest() -> &'static FormatSpec {
    &FORMAT_TABLE[FORMAT_TABLE.len() - 1]
}
