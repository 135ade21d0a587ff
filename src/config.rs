use crate::error::ParseError;
use serde::{Deserialize, Serialize};

/// Parse-time policy shared by every parser.
///
/// Drivers usually build one with the `with_*` setters, or load it from a
/// JSON/YAML document with [`Config::from_json_str`] / [`Config::from_yaml_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recompute and compare content checksums for formats that record them.
    pub perform_checksum_validation: bool,
    /// Load the tables referenced by metadata parameters into each node.
    pub parse_study_metadata: bool,
    /// Promote per-node parse events from `debug` to `info`.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            perform_checksum_validation: true,
            parse_study_metadata: true,
            verbose: false,
        }
    }
}

impl Config {
    pub fn with_checksum_validation(mut self, enabled: bool) -> Self {
        self.perform_checksum_validation = enabled;
        self
    }

    pub fn with_study_metadata(mut self, enabled: bool) -> Self {
        self.parse_study_metadata = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ParseError> {
        serde_json::from_str(json).map_err(|e| ParseError::invalid("<config>", e.to_string()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ParseError> {
        serde_yaml::from_str(yaml).map_err(|e| ParseError::invalid("<config>", e.to_string()))
    }
}
