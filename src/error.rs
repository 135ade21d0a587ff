use crate::graph::Id;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading an archive and building its provenance.
///
/// Every variant is fatal to the parse that raised it: no partially built graph
/// is ever returned alongside one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed Archive: {0}")]
    MalformedArchive(String),

    #[error("Archive format version '{version}' is not supported by any registered parser")]
    UnsupportedFormatVersion { version: String },

    #[error("Expected a file, but '{0}' is a directory")]
    NotAFile(PathBuf),

    #[error("No such file: '{0}'")]
    FileNotFound(PathBuf),

    #[error("I/O failure on '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Not a readable zip archive: {0}")]
    Zip(String),

    #[error("Invalid content in '{path}': {message}")]
    InvalidContent { path: String, message: String },

    #[error("Could not load metadata table '{path}': {message}")]
    MetadataTable { path: String, message: String },

    #[error("Could not parse citations in '{path}': {message}")]
    Citations { path: String, message: String },

    #[error("No parser could handle the input:\n{}", attempts.join("\n"))]
    NoParserFound { attempts: Vec<String> },

    #[error("Graph persistence failed: {0}")]
    Persistence(String),
}

impl ParseError {
    pub(crate) fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        ParseError::InvalidContent {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by misuse of graph operations after construction.
///
/// These are fatal to the call that raised them, never to the graph itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Id '{0}' is not a node of this provenance graph")]
    UnknownId(Id),

    #[error("Relabeling would merge distinct nodes into id '{0}'")]
    DuplicateId(Id),
}
