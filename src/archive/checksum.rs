use super::ArchiveReader;
use crate::config::Config;
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Name of the root-only checksum manifest, present from format version 5.
pub const CHECKSUM_FILE: &str = "checksums.md5";

/// Archive-level integrity summary.
///
/// Variants are declared worst-first, so `Ord::min` over several codes yields
/// the worst case. That is how unioned graphs compute their overall validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationCode {
    Invalid,
    PredatesChecksums,
    ValidationOptout,
    Valid,
}

impl ValidationCode {
    /// The worse of two codes.
    pub fn worst(self, other: Self) -> Self {
        self.min(other)
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationCode::Invalid => "INVALID",
            ValidationCode::PredatesChecksums => "PREDATES_CHECKSUMS",
            ValidationCode::ValidationOptout => "VALIDATION_OPTOUT",
            ValidationCode::Valid => "VALID",
        };
        f.write_str(label)
    }
}

/// An expected/observed pair for a file whose content hash changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedChecksum {
    pub expected: String,
    pub observed: String,
}

/// Differences between a recorded manifest and the archive's actual contents.
///
/// Paths are relative to the archive root folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumDiff {
    /// In the archive, absent from the manifest. Maps path to observed hash.
    pub added: BTreeMap<String, String>,
    /// In the manifest, absent from the archive. Maps path to expected hash.
    pub removed: BTreeMap<String, String>,
    /// In both, with differing hashes.
    pub changed: BTreeMap<String, ChangedChecksum>,
}

impl ChecksumDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Set-union of all three path collections.
    pub fn merge(&mut self, other: ChecksumDiff) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        self.changed.extend(other.changed);
    }

    /// Merges two optional diffs. A concrete diff always wins over `None`.
    pub fn merge_optional(left: Option<Self>, right: Option<Self>) -> Option<Self> {
        match (left, right) {
            (Some(mut l), Some(r)) => {
                l.merge(r);
                Some(l)
            }
            (l, r) => l.or(r),
        }
    }
}

/// How a format revision treats content checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStrategy {
    /// The format has no manifest; validity is always `PredatesChecksums`.
    PredatesChecksums,
    /// The format records `checksums.md5` at the archive root.
    Manifest,
}

impl ChecksumStrategy {
    /// Runs this strategy, honoring the caller's opt-out before any hashing work.
    pub fn run(
        self,
        config: &Config,
        archive: &mut ArchiveReader,
    ) -> Result<(ValidationCode, Option<ChecksumDiff>), ParseError> {
        if !config.perform_checksum_validation {
            return Ok((ValidationCode::ValidationOptout, None));
        }
        match self {
            ChecksumStrategy::PredatesChecksums => Ok((ValidationCode::PredatesChecksums, None)),
            ChecksumStrategy::Manifest => validate_checksums(archive),
        }
    }
}

/// Recomputes the md5 of every archived file and diffs it against `checksums.md5`.
///
/// A missing manifest yields `(Invalid, None)`; any difference yields `Invalid`
/// with the diff; a clean comparison yields `Valid` with an empty diff.
pub fn validate_checksums(
    archive: &mut ArchiveReader,
) -> Result<(ValidationCode, Option<ChecksumDiff>), ParseError> {
    let root_id = archive.root_id()?;
    let manifest_path = format!("{}/{}", root_id, CHECKSUM_FILE);
    if !archive.contains(&manifest_path) {
        warn!(archive = archive.name(), "checksum manifest is missing");
        return Ok((ValidationCode::Invalid, None));
    }

    let expected = parse_manifest(&archive.read_string(&manifest_path)?);
    let observed = observed_checksums(archive, &root_id)?;
    let diff = diff_checksums(&expected, &observed);

    if diff.is_empty() {
        debug!(archive = archive.name(), files = observed.len(), "checksums match");
        Ok((ValidationCode::Valid, Some(diff)))
    } else {
        warn!(
            archive = archive.name(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "checksums do not match the recorded manifest"
        );
        Ok((ValidationCode::Invalid, Some(diff)))
    }
}

/// md5 of every file under the root folder, keyed by root-relative path.
/// The manifest itself is excluded.
fn observed_checksums(
    archive: &mut ArchiveReader,
    root_id: &str,
) -> Result<BTreeMap<String, String>, ParseError> {
    let prefix = format!("{}/", root_id);
    let paths: Vec<String> = archive
        .file_entries()
        .filter(|name| name.starts_with(&prefix))
        .map(str::to_string)
        .collect();

    let mut observed = BTreeMap::new();
    for path in paths {
        let relative = &path[prefix.len()..];
        if relative == CHECKSUM_FILE {
            continue;
        }
        let digest = md5::compute(archive.read_bytes(&path)?);
        observed.insert(relative.to_string(), format!("{:x}", digest));
    }
    Ok(observed)
}

fn diff_checksums(
    expected: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> ChecksumDiff {
    let mut diff = ChecksumDiff::default();
    for (path, hash) in observed {
        match expected.get(path) {
            None => {
                diff.added.insert(path.clone(), hash.clone());
            }
            Some(exp) if exp != hash => {
                diff.changed.insert(
                    path.clone(),
                    ChangedChecksum {
                        expected: exp.clone(),
                        observed: hash.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (path, hash) in expected {
        if !observed.contains_key(path) {
            diff.removed.insert(path.clone(), hash.clone());
        }
    }
    diff
}

/// Parses md5sum-formatted manifest text into `{path: hash}`.
///
/// Lines that do not follow `<32 hex> <sep><path>` are skipped; their files
/// then surface as `added` in the diff.
pub fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    text.lines().filter_map(parse_manifest_line).collect()
}

fn parse_manifest_line(line: &str) -> Option<(String, String)> {
    // md5sum prefixes a line with '\' when the filename needed escaping
    let (escaped, line) = match line.strip_prefix('\\') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    if line.len() < 34 || !line.is_char_boundary(32) {
        return None;
    }
    let (hash, rest) = line.split_at(32);
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    // two-space text mode or " *" binary mode
    let path = rest.strip_prefix("  ").or_else(|| rest.strip_prefix(" *"))?;
    if path.is_empty() {
        return None;
    }
    let path = if escaped {
        unescape_path(path)
    } else {
        path.to_string()
    };
    Some((path, hash.to_ascii_lowercase()))
}

fn unescape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lines_parse_in_text_and_binary_mode() {
        let text = "d41d8cd98f00b204e9800998ecf8427e  VERSION\n\
                    0123456789ABCDEF0123456789abcdef *data/index.html\n";
        let manifest = parse_manifest(text);
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest["VERSION"], "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(manifest["data/index.html"], "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn escaped_manifest_paths_are_unescaped() {
        let text = "\\d41d8cd98f00b204e9800998ecf8427e  data/odd\\nname\\\\x.txt";
        let manifest = parse_manifest(text);
        assert!(manifest.contains_key("data/odd\nname\\x.txt"));
    }

    #[test]
    fn malformed_manifest_lines_are_skipped() {
        let text = "not a checksum line\nabc  short\n\n";
        assert!(parse_manifest(text).is_empty());
    }

    #[test]
    fn diff_classifies_added_removed_and_changed() {
        let expected = BTreeMap::from([
            ("a".to_string(), "1".repeat(32)),
            ("b".to_string(), "2".repeat(32)),
        ]);
        let observed = BTreeMap::from([
            ("a".to_string(), "f".repeat(32)),
            ("c".to_string(), "3".repeat(32)),
        ]);
        let diff = diff_checksums(&expected, &observed);
        assert_eq!(diff.added.keys().collect::<Vec<_>>(), ["c"]);
        assert_eq!(diff.removed.keys().collect::<Vec<_>>(), ["b"]);
        assert_eq!(diff.changed["a"].expected, "1".repeat(32));
        assert_eq!(diff.changed["a"].observed, "f".repeat(32));
    }

    #[test]
    fn validation_codes_order_worst_first() {
        assert_eq!(
            ValidationCode::Valid.worst(ValidationCode::Invalid),
            ValidationCode::Invalid
        );
        assert_eq!(
            ValidationCode::Valid.worst(ValidationCode::ValidationOptout),
            ValidationCode::ValidationOptout
        );
        assert_eq!(
            ValidationCode::PredatesChecksums.worst(ValidationCode::ValidationOptout),
            ValidationCode::PredatesChecksums
        );
    }
}
