use super::ArchiveReader;
use crate::error::ParseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const VERSION_FILE: &str = "VERSION";

/// The literal first line of every VERSION file.
pub const VERSION_MARKER: &str = "QIIME 2";

/// Grammar of a VERSION file after surrounding whitespace is trimmed.
pub const VERSION_PATTERN: &str = concat!(
    r"\AQIIME 2\n",
    r"archive: [0-9]{1,2}\n",
    r"framework: (?:20[0-9]{2}|2)\.(?:[1-9][0-2]?|0)\.[0-9]+(?:\.dev[0-9]*)?\z",
);

static VERSION_MATCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(VERSION_PATTERN).expect("VERSION_PATTERN is a valid regex"));

/// The two version strings recorded in a VERSION file, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Archive format version, e.g. `"5"`. Used as a key into the format table.
    pub archive: String,
    /// Version of the framework that wrote the archive, e.g. `"2020.6.0.dev0"`.
    pub framework: String,
}

/// Reads and validates a VERSION file.
///
/// `path` defaults to the archive root's `<root>/VERSION`. Nested nodes keep their
/// own copy at `<node provenance dir>/VERSION`.
pub fn read_version(
    archive: &mut ArchiveReader,
    path: Option<&str>,
) -> Result<VersionInfo, ParseError> {
    let path = match path {
        Some(p) => p.to_string(),
        None => format!("{}/{}", archive.root_id()?, VERSION_FILE),
    };

    if !archive.contains(&path) {
        return Err(ParseError::MalformedArchive(format!(
            "VERSION missing: {} misplaced or nonexistent in {}",
            path,
            archive.name()
        )));
    }

    let contents = archive.read_string(&path)?;
    parse_version_str(&contents).map_err(|_| {
        ParseError::MalformedArchive(format!(
            "VERSION out of spec in {} ({}): expected content matching `{}`, found:\n{}",
            archive.name(),
            path,
            VERSION_PATTERN,
            contents
        ))
    })
}

/// Validates VERSION contents against [`VERSION_PATTERN`] and extracts both versions.
///
/// The error carries the offending content untouched.
pub fn parse_version_str(contents: &str) -> Result<VersionInfo, String> {
    let trimmed = contents.trim();
    if !VERSION_MATCHER.is_match(trimmed) {
        return Err(contents.to_string());
    }

    let mut values = trimmed
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().last());
    match (values.next(), values.next()) {
        (Some(archive), Some(framework)) => Ok(VersionInfo {
            archive: archive.to_string(),
            framework: framework.to_string(),
        }),
        _ => Err(contents.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_release_and_dev_versions() {
        let v = parse_version_str("QIIME 2\narchive: 5\nframework: 2020.6.0.dev0\n").unwrap();
        assert_eq!(v.archive, "5");
        assert_eq!(v.framework, "2020.6.0.dev0");

        let v = parse_version_str("QIIME 2\narchive: 0\nframework: 2.0.6").unwrap();
        assert_eq!(v.archive, "0");
        assert_eq!(v.framework, "2.0.6");
    }

    #[test]
    fn rejects_out_of_grammar_content() {
        let bad = [
            "",
            "QIIME 1\narchive: 5\nframework: 2019.10.0",
            "QIIME 2\narchive: 5",
            "QIIME 2\narchive: 5\nframework: 2019.10.0\nextra: 1",
            "QIIME 2\narchive: 123\nframework: 2019.10.0",
            "QIIME 2\narchive: five\nframework: 2019.10.0",
            "QIIME 2\narchive: 5\nframework: 2019.13.0",
            "QIIME 2\narchive: 5\nframework: 2019.10.0-beta",
        ];
        for content in bad {
            assert_eq!(parse_version_str(content), Err(content.to_string()));
        }
    }
}
