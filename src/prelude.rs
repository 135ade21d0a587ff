//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the provdag crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use provdag::prelude::*;
//!
//! # fn run_example() -> Result<(), ParseError> {
//! let graph = ProvenanceGraph::from_input("path/to/result.qza", Config::default())?;
//! for id in graph.terminal_ids() {
//!     println!("terminal: {}", id);
//! }
//! # Ok(())
//! # }
//! ```

// Parsing
pub use crate::config::Config;
pub use crate::parser::{
    ArchiveParser, GraphBuildResult, ParserDispatcher, ProvenanceInput, parse_all,
};

// Graph
pub use crate::graph::{CollapsedView, Id, ProvenanceGraph};

// Data model
pub use crate::archive::{ChecksumDiff, ValidationCode};
pub use crate::node::{
    Action, ActionType, BibtexCitationParser, CitationParser, MetadataTable, MetadataTableLoader,
    Node, ProvValue, TsvTableLoader,
};

// Error types
pub use crate::error::{GraphError, ParseError};
