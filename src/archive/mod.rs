//! Scoped access to one zip-structured result archive.
//!
//! An [`ArchiveReader`] owns the open zip handle for exactly as long as a parse
//! needs it; dropping the reader releases the handle on every exit path.

use crate::error::ParseError;
use crate::graph::Id;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

pub mod checksum;
pub mod version;

pub use checksum::*;
pub use version::*;

/// Name of the folder holding recorded lineage inside every archive root.
pub const PROVENANCE_DIR: &str = "provenance";
/// Name of the folder holding one sub-folder per ancestor inside `provenance/`.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Any seekable byte source a zip archive can be read from.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// An open archive plus its entry listing, in archive order.
pub struct ArchiveReader {
    zip: ZipArchive<Box<dyn ReadSeek>>,
    name: String,
    entries: Vec<String>,
}

impl ArchiveReader {
    /// Opens the archive at `path`. Directories are rejected with `NotAFile`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(ParseError::NotAFile(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(ParseError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| ParseError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::new(Box::new(file), path.display().to_string())
    }

    /// Reads an archive held entirely in memory.
    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Result<Self, ParseError> {
        Self::new(Box::new(Cursor::new(bytes)), name)
    }

    pub fn new(reader: Box<dyn ReadSeek>, name: impl Into<String>) -> Result<Self, ParseError> {
        let name = name.into();
        let mut zip =
            ZipArchive::new(reader).map_err(|e| ParseError::Zip(format!("{}: {}", name, e)))?;

        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip
                .by_index_raw(i)
                .map_err(|e| ParseError::Zip(format!("{}: {}", name, e)))?;
            entries.push(entry.name().to_string());
        }

        Ok(Self { zip, name, entries })
    }

    /// The display name used in error messages (usually the file path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every entry name in the archive, directories included.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Entry names that denote files rather than directories.
    pub fn file_entries(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(String::as_str)
            .filter(|name| !name.ends_with('/'))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// The archive root id: the first path segment of the first listed entry.
    pub fn root_id(&self) -> Result<Id, ParseError> {
        self.entries
            .first()
            .and_then(|first| first.split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ParseError::MalformedArchive(format!("{} contains no entries", self.name))
            })
    }

    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>, ParseError> {
        let mut file = self.zip.by_name(path).map_err(|e| match e {
            ZipError::FileNotFound => ParseError::MalformedArchive(format!(
                "{} misplaced or nonexistent in {}",
                path, self.name
            )),
            other => ParseError::Zip(format!("{} in {}: {}", path, self.name, other)),
        })?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| ParseError::Io {
            path: format!("{}:{}", self.name, path),
            message: e.to_string(),
        })?;
        Ok(bytes)
    }

    pub fn read_string(&mut self, path: &str) -> Result<String, ParseError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes)
            .map_err(|e| ParseError::invalid(path, format!("not valid UTF-8: {}", e)))
    }
}

/// The provenance folder of the archive root: `<root>/provenance`.
pub fn root_provenance_dir(root_id: &str) -> String {
    format!("{}/{}", root_id, PROVENANCE_DIR)
}

/// The provenance folder of node `id` inside an archive rooted at `root_id`.
pub fn node_provenance_dir(root_id: &str, id: &str) -> String {
    if root_id == id {
        root_provenance_dir(root_id)
    } else {
        format!("{}/{}/{}/{}", root_id, PROVENANCE_DIR, ARTIFACTS_DIR, id)
    }
}

/// Which node a provenance path belongs to.
///
/// Paths under `<root>/provenance/artifacts/<id>/` belong to `<id>`; every other
/// path under `<root>/provenance/` belongs to the archive root. Paths outside
/// the provenance folder yield `None`.
pub fn owning_node_id<'a>(root_id: &'a str, path: &'a str) -> Option<&'a str> {
    let mut parts = path.split('/');
    if parts.next()? != root_id || parts.next()? != PROVENANCE_DIR {
        return None;
    }
    match (parts.next(), parts.next()) {
        (Some(ARTIFACTS_DIR), Some(id)) if !id.is_empty() => Some(id),
        _ => Some(root_id),
    }
}
