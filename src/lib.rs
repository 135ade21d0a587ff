//! # provdag - Archive Provenance Parser and Lineage Graph
//!
//! **provdag** reads self-describing, zip-structured result archives and rebuilds
//! the full computational lineage recorded inside them as a directed acyclic
//! graph. Every result an archive knows about becomes a vertex; every "was
//! computed from" relationship becomes an edge.
//!
//! ## Core Workflow
//!
//! 1.  **Read**: [`archive::ArchiveReader`] opens the zip and resolves its root id.
//!     [`archive::read_version`] validates the `VERSION` file.
//! 2.  **Select a format**: the archive version picks a row of
//!     [`parser::FORMAT_TABLE`], which says which files every node must carry and
//!     how checksums are treated.
//! 3.  **Parse**: [`parser::ArchiveParser`] validates checksums, groups provenance
//!     files by node, checks that nothing is missing and loads each
//!     [`node::Node`].
//! 4.  **Build and combine**: [`graph::ProvenanceGraph`] turns parse results into a
//!     DAG, and can union graphs from several archives or relabel their ids.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provdag::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default().with_study_metadata(false);
//!
//!     // One archive
//!     let graph = ProvenanceGraph::from_input("results/table.qza", config)?;
//!     println!("{}", graph);
//!     println!("Validity: {}", graph.validity());
//!
//!     // Several archives, unioned into one lineage
//!     let combined = parse_all(["results/table.qza", "results/tree.qza"], config)?;
//!     for node in combined.terminal_nodes() {
//!         if let Some(action) = node.action() {
//!             println!("{} <- {}.{}", node.id(), action.plugin_name, action.action_name);
//!         }
//!     }
//!
//!     // Cache the parsed lineage for later
//!     combined.save("lineage.bin")?;
//!     Ok(())
//! }
//! ```
//!
//! Custom collaborators for metadata tables and citations plug in through the
//! parser builder:
//!
//! ```rust,no_run
//! use provdag::prelude::*;
//!
//! # fn run(bytes: Vec<u8>) -> Result<(), ParseError> {
//! let parser = ArchiveParser::builder(Config::default())
//!     .with_table_loader(Box::new(TsvTableLoader))
//!     .with_citation_parser(Box::new(BibtexCitationParser))
//!     .build();
//! let build = parser.parse_bytes(bytes, "in-memory.qza")?;
//! let graph = ProvenanceGraph::from_build(build);
//! # Ok(())
//! # }
//! ```

/// Emits a `tracing` event at `info` when `verbose` is set, otherwise at `debug`.
macro_rules! verbose_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod archive;
pub mod config;
pub mod error;
pub mod graph;
pub mod node;
pub mod parser;
pub mod prelude;
