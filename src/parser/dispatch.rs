use super::ArchiveParser;
use crate::config::Config;
use crate::error::ParseError;
use crate::graph::ProvenanceGraph;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const ZIP_MAGIC: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06"];

/// Anything a [`ParserDispatcher`] can turn into a [`ProvenanceGraph`].
#[derive(Debug, Clone)]
pub enum ProvenanceInput {
    /// An archive file, or a graph saved with [`ProvenanceGraph::save`].
    Path(PathBuf),
    /// The same, already read into memory. `name` is used in messages.
    Bytes { name: String, bytes: Vec<u8> },
    /// A graph that is already built; passed through unchanged.
    Graph(Box<ProvenanceGraph>),
}

impl ProvenanceInput {
    /// Buffers an arbitrary reader.
    pub fn from_reader(name: impl Into<String>, mut reader: impl Read) -> Result<Self, ParseError> {
        let name = name.into();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|e| ParseError::Io {
            path: name.clone(),
            message: e.to_string(),
        })?;
        Ok(ProvenanceInput::Bytes { name, bytes })
    }

    /// Short description for logs and `NoParserFound` messages.
    pub fn describe(&self) -> String {
        match self {
            ProvenanceInput::Path(path) => path.display().to_string(),
            ProvenanceInput::Bytes { name, bytes } => format!("{} ({} bytes)", name, bytes.len()),
            ProvenanceInput::Graph(graph) => format!("{}", graph),
        }
    }
}

impl From<PathBuf> for ProvenanceInput {
    fn from(path: PathBuf) -> Self {
        ProvenanceInput::Path(path)
    }
}

impl From<&Path> for ProvenanceInput {
    fn from(path: &Path) -> Self {
        ProvenanceInput::Path(path.to_path_buf())
    }
}

impl From<&str> for ProvenanceInput {
    fn from(path: &str) -> Self {
        ProvenanceInput::Path(PathBuf::from(path))
    }
}

impl From<String> for ProvenanceInput {
    fn from(path: String) -> Self {
        ProvenanceInput::Path(PathBuf::from(path))
    }
}

impl From<ProvenanceGraph> for ProvenanceInput {
    fn from(graph: ProvenanceGraph) -> Self {
        ProvenanceInput::Graph(Box::new(graph))
    }
}

/// A parser's answer to "can you handle this input?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Accept,
    /// Declined, with the reason reported if no parser accepts.
    Decline(String),
}

/// Defines the contract for turning one kind of input into a provenance graph.
pub trait Parser: Send + Sync {
    fn name(&self) -> &str;
    /// Human-readable kinds of input this parser handles.
    fn accepted_data_types(&self) -> &[&str];
    fn claim(&self, input: &ProvenanceInput) -> Claim;
    fn parse(&self, input: ProvenanceInput) -> Result<ProvenanceGraph, ParseError>;
}

/// Parses zip result archives of every supported format.
pub struct ArtifactParser {
    inner: ArchiveParser,
}

impl ArtifactParser {
    pub fn new(inner: ArchiveParser) -> Self {
        Self { inner }
    }
}

impl Parser for ArtifactParser {
    fn name(&self) -> &str {
        "ArtifactParser"
    }

    fn accepted_data_types(&self) -> &[&str] {
        &["path to a zip result archive", "zip archive bytes"]
    }

    fn claim(&self, input: &ProvenanceInput) -> Claim {
        let head = match input {
            ProvenanceInput::Path(path) => match read_head(path) {
                Ok(head) => head,
                Err(reason) => return Claim::Decline(reason),
            },
            ProvenanceInput::Bytes { bytes, .. } => bytes.iter().take(4).copied().collect(),
            ProvenanceInput::Graph(_) => {
                return Claim::Decline("input is an already built graph".to_string());
            }
        };
        if ZIP_MAGIC.iter().any(|magic| head.as_slice() == *magic) {
            Claim::Accept
        } else {
            Claim::Decline("input is not a zip archive".to_string())
        }
    }

    fn parse(&self, input: ProvenanceInput) -> Result<ProvenanceGraph, ParseError> {
        let build = match input {
            ProvenanceInput::Path(path) => self.inner.parse_path(path)?,
            ProvenanceInput::Bytes { name, bytes } => self.inner.parse_bytes(bytes, name)?,
            ProvenanceInput::Graph(graph) => return Ok(*graph),
        };
        Ok(ProvenanceGraph::from_build(build))
    }
}

/// Accepts built graphs as-is and reloads graphs saved with bincode.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphParser;

impl Parser for GraphParser {
    fn name(&self) -> &str {
        "GraphParser"
    }

    fn accepted_data_types(&self) -> &[&str] {
        &["ProvenanceGraph", "saved ProvenanceGraph file", "saved ProvenanceGraph bytes"]
    }

    fn claim(&self, input: &ProvenanceInput) -> Claim {
        let decoded = match input {
            ProvenanceInput::Graph(_) => return Claim::Accept,
            ProvenanceInput::Path(path) => ProvenanceGraph::from_file(path).map(|_| ()),
            ProvenanceInput::Bytes { bytes, .. } => ProvenanceGraph::from_bytes(bytes).map(|_| ()),
        };
        match decoded {
            Ok(()) => Claim::Accept,
            Err(e) => Claim::Decline(e.to_string()),
        }
    }

    fn parse(&self, input: ProvenanceInput) -> Result<ProvenanceGraph, ParseError> {
        match input {
            ProvenanceInput::Graph(graph) => Ok(*graph),
            ProvenanceInput::Path(path) => ProvenanceGraph::from_file(path),
            ProvenanceInput::Bytes { bytes, .. } => ProvenanceGraph::from_bytes(&bytes),
        }
    }
}

/// Picks the first registered parser that accepts an input.
///
/// Parsers added with [`ParserDispatcher::with_parser`] are consulted before the
/// built-in ones, so a caller can override how archives are read.
pub struct ParserDispatcher {
    config: Config,
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserDispatcher {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            parsers: vec![
                Box::new(ArtifactParser::new(ArchiveParser::new(config))),
                Box::new(GraphParser),
            ],
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parsers.insert(0, parser);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The parser that will handle `input`.
    ///
    /// Directories and missing paths are rejected directly; otherwise every
    /// parser's reason for declining is collected into `NoParserFound`.
    pub fn select(&self, input: &ProvenanceInput) -> Result<&dyn Parser, ParseError> {
        if let ProvenanceInput::Path(path) = input {
            if path.is_dir() {
                return Err(ParseError::NotAFile(path.clone()));
            }
            if !path.exists() {
                return Err(ParseError::FileNotFound(path.clone()));
            }
        }

        let mut attempts = Vec::with_capacity(self.parsers.len());
        for parser in &self.parsers {
            match parser.claim(input) {
                Claim::Accept => {
                    debug!(parser = parser.name(), input = %input.describe(), "parser selected");
                    return Ok(parser.as_ref());
                }
                Claim::Decline(reason) => {
                    attempts.push(format!(" {}: {}", parser.name(), reason));
                }
            }
        }
        Err(ParseError::NoParserFound { attempts })
    }

    pub fn parse(&self, input: impl Into<ProvenanceInput>) -> Result<ProvenanceGraph, ParseError> {
        let input = input.into();
        self.select(&input)?.parse(input)
    }

    /// Parses every input in order and unions them. Stops at the first failure.
    pub fn parse_all<I>(&self, inputs: I) -> Result<ProvenanceGraph, ParseError>
    where
        I: IntoIterator,
        I::Item: Into<ProvenanceInput>,
    {
        let graphs = inputs
            .into_iter()
            .map(|input| self.parse(input))
            .collect::<Result<Vec<_>, _>>()?;
        let mut union = ProvenanceGraph::empty();
        union.union(graphs);
        Ok(union)
    }
}

fn read_head(path: &Path) -> Result<Vec<u8>, String> {
    let file = fs::File::open(path).map_err(|e| format!("could not open: {}", e))?;
    let mut head = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut head)
        .map_err(|e| format!("could not read: {}", e))?;
    Ok(head)
}
