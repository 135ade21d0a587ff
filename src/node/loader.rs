use super::{
    Action, ActionType, CitationRecord, Citations, MetadataTable, Node, ProvValue, ResultMetadata,
};
use crate::archive::{ArchiveReader, VERSION_FILE, node_provenance_dir, read_version};
use crate::config::Config;
use crate::error::ParseError;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

pub const METADATA_FILE: &str = "metadata.yaml";
pub const ACTION_FILE: &str = "action.yaml";
pub const ACTION_DIR: &str = "action";
pub const CITATIONS_FILE: &str = "citations.bib";

/// Loads the table behind a metadata parameter.
///
/// Implementations receive the open archive, the table's full path inside it and
/// the id of the node that recorded it. Table contents are never interpreted by
/// the parser.
pub trait MetadataTableLoader: Send + Sync {
    fn load(
        &self,
        archive: &mut ArchiveReader,
        path: &str,
        context_id: &str,
    ) -> Result<MetadataTable, ParseError>;
}

/// Turns the raw text of a `citations.bib` file into records keyed by citation id.
pub trait CitationParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Citations, String>;
}

/// Reads tab-separated metadata files.
///
/// The first non-blank line is the header; later lines starting with `#` are
/// directives or comments and are skipped. Quoted cells lose their quotes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TsvTableLoader;

impl MetadataTableLoader for TsvTableLoader {
    fn load(
        &self,
        archive: &mut ArchiveReader,
        path: &str,
        _context_id: &str,
    ) -> Result<MetadataTable, ParseError> {
        let text = archive.read_string(path)?;
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().ok_or_else(|| ParseError::MetadataTable {
            path: path.to_string(),
            message: "file has no header line".to_string(),
        })?;

        let split = |line: &str| -> Vec<String> {
            line.split('\t').map(|cell| unquote(cell.trim()).to_string()).collect()
        };
        Ok(MetadataTable {
            columns: split(header),
            rows: lines
                .filter(|line| !line.starts_with('#'))
                .map(split)
                .collect(),
        })
    }
}

/// Strips one pair of surrounding double quotes.
fn unquote(cell: &str) -> &str {
    cell.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(cell)
}

/// A small BibTeX reader: entry type, key and `name = value` fields.
///
/// `@comment`, `@preamble` and `@string` blocks are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct BibtexCitationParser;

impl CitationParser for BibtexCitationParser {
    fn parse(&self, text: &str) -> Result<Citations, String> {
        let mut citations = Citations::new();
        let mut rest = text;

        while let Some(at) = rest.find('@') {
            rest = &rest[at + 1..];
            // Text outside entries is a comment, including a stray '@'.
            let Some(open) = rest.find(['{', '(']) else {
                break;
            };
            let entry_type = rest[..open].trim().to_lowercase();
            if !is_entry_type(&entry_type) {
                continue;
            }
            let closer = if rest[open..].starts_with('{') { '}' } else { ')' };

            let body = &rest[open + 1..];
            let end = find_closing(body, closer)
                .ok_or_else(|| format!("unterminated @{} entry", entry_type))?;
            let (entry, remainder) = (&body[..end], &body[end + 1..]);
            rest = remainder;

            if matches!(entry_type.as_str(), "comment" | "preamble" | "string") {
                continue;
            }
            let (key, fields) = entry.split_once(',').unwrap_or((entry, ""));
            let key = key.trim().to_string();
            citations.insert(
                key.clone(),
                CitationRecord {
                    entry_type,
                    key,
                    fields: parse_bib_fields(fields)?,
                },
            );
        }
        Ok(citations)
    }
}

fn is_entry_type(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Byte index of `closer` at brace depth zero.
fn find_closing(text: &str, closer: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            c if c == closer && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_bib_fields(text: &str) -> Result<BTreeMap<String, String>, String> {
    let mut fields = BTreeMap::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            return Ok(fields);
        }
        let eq = rest
            .find('=')
            .ok_or_else(|| format!("field without a value near '{}'", rest.trim()))?;
        let name = rest[..eq].trim().to_lowercase();
        rest = rest[eq + 1..].trim_start();

        let (value, remainder) = if let Some(inner) = rest.strip_prefix('{') {
            let end = find_closing(inner, '}').ok_or_else(|| format!("unbalanced braces in '{}'", name))?;
            (&inner[..end], &inner[end + 1..])
        } else if let Some(inner) = rest.strip_prefix('"') {
            let end = inner
                .find('"')
                .ok_or_else(|| format!("unterminated quote in '{}'", name))?;
            (&inner[..end], &inner[end + 1..])
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            (rest[..end].trim(), &rest[end..])
        };
        fields.insert(name, value.to_string());
        rest = remainder;
    }
}

/// Builds one [`Node`] from the files a format parser selected for it.
///
/// Recognized files are `VERSION`, `metadata.yaml`, `action.yaml` and
/// `citations.bib`; anything else in `files` is ignored. The file set is trusted:
/// only malformed contents fail here.
pub struct NodeLoader<'a> {
    config: &'a Config,
    tables: &'a dyn MetadataTableLoader,
    citations: &'a dyn CitationParser,
}

impl<'a> NodeLoader<'a> {
    pub fn new(
        config: &'a Config,
        tables: &'a dyn MetadataTableLoader,
        citations: &'a dyn CitationParser,
    ) -> Self {
        Self {
            config,
            tables,
            citations,
        }
    }

    pub fn load(
        &self,
        archive: &mut ArchiveReader,
        id: &str,
        files: &[String],
    ) -> Result<Node, ParseError> {
        let mut version = None;
        let mut metadata = None;
        let mut action = None;
        let mut citations = Citations::new();

        for path in files {
            match path.rsplit('/').next().unwrap_or(path) {
                VERSION_FILE => version = Some(read_version(archive, Some(path.as_str()))?),
                METADATA_FILE => {
                    metadata = Some(parse_result_metadata(&load_yaml(archive, path)?, path)?)
                }
                ACTION_FILE => action = Some(parse_action(&load_yaml(archive, path)?, path)?),
                CITATIONS_FILE => {
                    let text = archive.read_string(path)?;
                    citations =
                        self.citations
                            .parse(&text)
                            .map_err(|message| ParseError::Citations {
                                path: path.clone(),
                                message,
                            })?;
                }
                _ => {}
            }
        }

        let version = version.ok_or_else(|| {
            ParseError::MalformedArchive(format!("VERSION missing for node {}", id))
        })?;
        let metadata = metadata.ok_or_else(|| {
            ParseError::MalformedArchive(format!("metadata.yaml missing for node {}", id))
        })?;
        if metadata.id != id {
            return Err(ParseError::MalformedArchive(format!(
                "metadata.yaml for node {} records id {}",
                id, metadata.id
            )));
        }

        let tables = match &action {
            Some(action) if version.archive != "0" && self.config.parse_study_metadata => {
                Some(self.load_tables(archive, id, action)?)
            }
            _ => None,
        };

        verbose_event!(self.config.verbose, node = id, format = %version.archive, "loaded node");
        Node::new(
            metadata,
            version.archive,
            version.framework,
            action,
            citations,
            tables,
        )
    }

    fn load_tables(
        &self,
        archive: &mut ArchiveReader,
        id: &str,
        action: &Action,
    ) -> Result<BTreeMap<String, MetadataTable>, ParseError> {
        let root_id = archive.root_id()?;
        let action_dir = format!("{}/{}", node_provenance_dir(&root_id, id), ACTION_DIR);

        let mut tables = BTreeMap::new();
        for (param, md) in action.metadata_parameters() {
            let path = format!("{}/{}", action_dir, md.relative_path);
            tables.insert(param.to_string(), self.tables.load(archive, &path, id)?);
        }
        Ok(tables)
    }
}

fn load_yaml(archive: &mut ArchiveReader, path: &str) -> Result<ProvValue, ParseError> {
    let text = archive.read_string(path)?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| ParseError::invalid(path, e.to_string()))?;
    ProvValue::from_yaml(yaml, path)
}

fn required_str<'v>(doc: &'v ProvValue, key: &str, path: &str) -> Result<&'v str, ParseError> {
    doc.get(key)
        .and_then(ProvValue::as_str)
        .ok_or_else(|| ParseError::invalid(path, format!("missing or non-string field '{}'", key)))
}

fn optional_str(doc: &ProvValue, key: &str) -> Option<String> {
    doc.get(key).and_then(ProvValue::as_str).map(str::to_string)
}

pub(crate) fn parse_result_metadata(
    doc: &ProvValue,
    path: &str,
) -> Result<ResultMetadata, ParseError> {
    Ok(ResultMetadata {
        id: required_str(doc, "uuid", path)?.to_string(),
        semantic_type: required_str(doc, "type", path)?.to_string(),
        data_format: optional_str(doc, "format"),
    })
}

/// Converts a loaded `action.yaml` document into an [`Action`].
pub(crate) fn parse_action(doc: &ProvValue, path: &str) -> Result<Action, ParseError> {
    let execution = doc
        .get("execution")
        .ok_or_else(|| ParseError::invalid(path, "missing 'execution' section"))?;
    let details = doc
        .get("action")
        .ok_or_else(|| ParseError::invalid(path, "missing 'action' section"))?;

    let action_type: ActionType = required_str(details, "type", path)?
        .parse()
        .map_err(|message: String| ParseError::invalid(path, message))?;

    let (plugin_name, action_name) = if action_type == ActionType::Import {
        ("framework".to_string(), "import".to_string())
    } else {
        // plugin is recorded as `!ref 'environment:plugins:<name>'`
        let plugin = required_str(details, "plugin", path)?;
        let plugin = plugin.rsplit(':').next().unwrap_or(plugin).to_string();
        (plugin, required_str(details, "action", path)?.to_string())
    };

    let runtime = execution.get("runtime");
    let timestamp = |key: &str| runtime.and_then(|r| r.get(key)).and_then(parse_timestamp);

    let inputs = if action_type == ActionType::Import {
        Vec::new()
    } else {
        parse_inputs(details.get("inputs"), path)?
    };

    Ok(Action {
        action_id: required_str(execution, "uuid", path)?.to_string(),
        action_type,
        plugin_name,
        action_name,
        runtime_start: timestamp("start"),
        runtime_end: timestamp("end"),
        runtime_duration_text: runtime.and_then(|r| optional_str(r, "duration")),
        inputs,
        parameters: parse_parameters(details.get("parameters"), path)?,
        output_name: optional_str(details, "output-name"),
        format: optional_str(details, "format"),
        transformers: doc.get("transformers").cloned(),
        environment: doc.get("environment").cloned(),
    })
}

/// Flattens the `inputs` list into one `(role, id)` slot per artifact.
///
/// Collection inputs become `name_0`, `name_1`, ...; null optional inputs are skipped.
fn parse_inputs(inputs: Option<&ProvValue>, path: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut slots = Vec::new();
    let Some(entries) = inputs.filter(|v| !v.is_null()) else {
        return Ok(slots);
    };
    let entries = entries
        .as_items()
        .ok_or_else(|| ParseError::invalid(path, "'inputs' is not a list"))?;

    for entry in entries {
        let (name, value) = entry
            .as_single_entry()
            .ok_or_else(|| ParseError::invalid(path, format!("malformed input entry {}", entry)))?;

        if value.is_null() {
            continue;
        }
        if let Some(items) = value.as_items() {
            for (i, item) in items.iter().enumerate() {
                let id = item.as_str().ok_or_else(|| {
                    ParseError::invalid(path, format!("input '{}' holds a non-id value {}", name, item))
                })?;
                slots.push((format!("{}_{}", name, i), id.to_string()));
            }
        } else {
            let id = value.as_str().ok_or_else(|| {
                ParseError::invalid(path, format!("input '{}' holds a non-id value {}", name, value))
            })?;
            slots.push((name.to_string(), id.to_string()));
        }
    }
    Ok(slots)
}

fn parse_parameters(
    params: Option<&ProvValue>,
    path: &str,
) -> Result<Vec<(String, ProvValue)>, ParseError> {
    let Some(entries) = params.filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };
    let entries = entries
        .as_items()
        .ok_or_else(|| ParseError::invalid(path, "'parameters' is not a list"))?;

    entries
        .iter()
        .map(|entry| {
            entry
                .as_single_entry()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .ok_or_else(|| {
                    ParseError::invalid(path, format!("malformed parameter entry {}", entry))
                })
        })
        .collect()
}

fn parse_timestamp(value: &ProvValue) -> Option<DateTime<FixedOffset>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .ok()
}
