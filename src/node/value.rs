use crate::error::ParseError;
use crate::graph::Id;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;
use serde_yaml::value::TaggedValue;
use std::fmt;

/// A fully resolved value from a provenance YAML document.
///
/// Documents are first loaded into a generic `serde_yaml::Value` tree, then
/// [`ProvValue::from_yaml`] converts that tree in one pass, turning every
/// recognized tag into its typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProvValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<ProvValue>),
    Map(Vec<(String, ProvValue)>),
    /// `!set [...]`: a collection passed to a variadic input.
    Set(Vec<ProvValue>),
    /// `!metadata '<ids>:<file>'`: a Metadata or MetadataColumn parameter.
    Metadata(MetadataInfo),
    /// `!ref 'environment:plugins:<name>'`: a reference into the environment section.
    Ref(String),
    /// `!cite '<key>'`: a citation key.
    Cite(String),
    /// `!no-provenance '<id>'`: an input whose producer predates provenance tracking.
    NoProvenance(Id),
    /// `!color '<hex>'`
    Color(String),
}

/// Where a metadata parameter's table lives and which artifacts it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataInfo {
    pub input_artifact_ids: Vec<Id>,
    /// Path of the table relative to the owning node's `action/` folder.
    pub relative_path: String,
}

impl MetadataInfo {
    /// Parses the scalar of a `!metadata` tag: `"<file>"` or `"<id>[,<id>...]:<file>"`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((ids, file)) => Self {
                input_artifact_ids: ids
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect(),
                relative_path: file.to_string(),
            },
            None => Self {
                input_artifact_ids: Vec::new(),
                relative_path: raw.to_string(),
            },
        }
    }
}

impl ProvValue {
    /// Converts a loaded YAML tree. `path` names the source file in error messages.
    ///
    /// Unknown tags are rejected, so every tag that reaches the data model has a
    /// typed meaning.
    pub fn from_yaml(value: Yaml, path: &str) -> Result<Self, ParseError> {
        Ok(match value {
            Yaml::Null => ProvValue::Null,
            Yaml::Bool(b) => ProvValue::Bool(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => ProvValue::Int(i),
                None => ProvValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Yaml::String(s) => ProvValue::Str(s),
            Yaml::Sequence(items) => ProvValue::Seq(
                items
                    .into_iter()
                    .map(|item| Self::from_yaml(item, path))
                    .collect::<Result<_, _>>()?,
            ),
            Yaml::Mapping(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, val) in map {
                    entries.push((key_to_string(key, path)?, Self::from_yaml(val, path)?));
                }
                ProvValue::Map(entries)
            }
            Yaml::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                let tag = tag.to_string();
                let tag = tag.trim_start_matches('!');
                match tag {
                    "metadata" => ProvValue::Metadata(MetadataInfo::parse(&scalar(tag, value, path)?)),
                    "ref" => ProvValue::Ref(scalar(tag, value, path)?),
                    "cite" => ProvValue::Cite(scalar(tag, value, path)?),
                    "no-provenance" => ProvValue::NoProvenance(scalar(tag, value, path)?),
                    "color" => ProvValue::Color(scalar(tag, value, path)?),
                    "set" => match Self::from_yaml(value, path)? {
                        ProvValue::Seq(items) => ProvValue::Set(items),
                        ProvValue::Null => ProvValue::Set(Vec::new()),
                        other => {
                            return Err(ParseError::invalid(
                                path,
                                format!("!set expects a sequence, found {}", other),
                            ));
                        }
                    },
                    unknown => {
                        return Err(ParseError::invalid(
                            path,
                            format!("unrecognized YAML tag '!{}'", unknown),
                        ));
                    }
                }
            }
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProvValue::Str(s)
            | ProvValue::Ref(s)
            | ProvValue::Cite(s)
            | ProvValue::NoProvenance(s)
            | ProvValue::Color(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up `key` in a mapping. Returns `None` for non-mappings.
    pub fn get(&self, key: &str) -> Option<&ProvValue> {
        match self {
            ProvValue::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Items of a plain sequence or a `!set`.
    pub fn as_items(&self) -> Option<&[ProvValue]> {
        match self {
            ProvValue::Seq(items) | ProvValue::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ProvValue::Null)
    }

    /// The single `(key, value)` pair of a one-entry mapping, the shape used by
    /// `inputs` and `parameters` lists.
    pub fn as_single_entry(&self) -> Option<(&str, &ProvValue)> {
        match self {
            ProvValue::Map(entries) if entries.len() == 1 => {
                entries.first().map(|(k, v)| (k.as_str(), v))
            }
            _ => None,
        }
    }

    /// Rewrites every artifact id held in this value, at any depth.
    pub(crate) fn rename_ids(&mut self, rename: &impl Fn(&str) -> Id) {
        match self {
            ProvValue::Metadata(md) => {
                for id in md.input_artifact_ids.iter_mut() {
                    *id = rename(id.as_str());
                }
            }
            ProvValue::NoProvenance(id) => *id = rename(id.as_str()),
            ProvValue::Seq(items) | ProvValue::Set(items) => {
                items.iter_mut().for_each(|item| item.rename_ids(rename));
            }
            ProvValue::Map(entries) => {
                entries.iter_mut().for_each(|(_, value)| value.rename_ids(rename));
            }
            _ => {}
        }
    }
}

impl fmt::Display for ProvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvValue::Null => write!(f, "null"),
            ProvValue::Bool(b) => write!(f, "{}", b),
            ProvValue::Int(i) => write!(f, "{}", i),
            ProvValue::Float(x) => write!(f, "{}", x),
            ProvValue::Str(s) => write!(f, "{:?}", s),
            ProvValue::Seq(items) => write!(f, "[{}]", items.iter().join(", ")),
            ProvValue::Set(items) => write!(f, "!set [{}]", items.iter().join(", ")),
            ProvValue::Map(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .join(", ")
            ),
            ProvValue::Metadata(md) if md.input_artifact_ids.is_empty() => {
                write!(f, "!metadata {:?}", md.relative_path)
            }
            ProvValue::Metadata(md) => write!(
                f,
                "!metadata \"{}:{}\"",
                md.input_artifact_ids.join(","),
                md.relative_path
            ),
            ProvValue::Ref(s) => write!(f, "!ref {:?}", s),
            ProvValue::Cite(s) => write!(f, "!cite {:?}", s),
            ProvValue::NoProvenance(s) => write!(f, "!no-provenance {:?}", s),
            ProvValue::Color(s) => write!(f, "!color {:?}", s),
        }
    }
}

fn key_to_string(key: Yaml, path: &str) -> Result<String, ParseError> {
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(ParseError::invalid(
            path,
            format!("unsupported mapping key {:?}", other),
        )),
    }
}

fn scalar(tag: &str, value: Yaml, path: &str) -> Result<String, ParseError> {
    match value {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        other => Err(ParseError::invalid(
            path,
            format!("!{} expects a scalar, found {:?}", tag, other),
        )),
    }
}
