//! Common test utilities for building result archives and parse results.
use provdag::node::{Action, ActionType, ResultMetadata};
use provdag::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const FRAMEWORK_VERSION: &str = "2023.5.1";

pub const ROOT_ID: &str = "a1b2c3d4-0000-4000-8000-000000000001";
pub const IMPORT_A: &str = "a1b2c3d4-0000-4000-8000-00000000000a";
pub const IMPORT_B: &str = "a1b2c3d4-0000-4000-8000-00000000000b";
pub const IMPORT_C: &str = "a1b2c3d4-0000-4000-8000-00000000000c";
pub const IMPORT_D: &str = "a1b2c3d4-0000-4000-8000-00000000000d";
pub const METADATA_ARTIFACT: &str = "a1b2c3d4-0000-4000-8000-0000000000e0";

/// Builds a zip-structured result archive file by file.
///
/// Paths are relative to the archive root folder. For format 5 and later a
/// `checksums.md5` manifest is computed over every file when the archive is
/// written; `tamper` and `drop_after_manifest` change the archive after that.
#[allow(dead_code)]
#[derive(Clone)]
pub struct ArchiveFixture {
    pub root_id: String,
    pub version: u8,
    files: Vec<(String, Vec<u8>)>,
    post_manifest: Vec<(String, Option<Vec<u8>>)>,
    manifest: bool,
}

#[allow(dead_code)]
impl ArchiveFixture {
    /// An archive with only the root `VERSION` and `metadata.yaml`.
    pub fn new(root_id: &str, version: u8, semantic_type: &str) -> Self {
        Self {
            root_id: root_id.to_string(),
            version,
            files: Vec::new(),
            post_manifest: Vec::new(),
            manifest: true,
        }
        .with_file("VERSION", version_text(version))
        .with_file("metadata.yaml", metadata_yaml(root_id, semantic_type))
    }

    /// Adds the root's own provenance folder.
    pub fn with_root_provenance(self, semantic_type: &str, action_yaml: &str) -> Self {
        let (id, version) = (self.root_id.clone(), self.version);
        self.with_node_files("provenance", &id, version, semantic_type, action_yaml)
    }

    /// Adds `provenance/artifacts/<id>/` for an ancestor written by format `version`.
    pub fn with_ancestor(
        self,
        id: &str,
        version: u8,
        semantic_type: &str,
        action_yaml: &str,
    ) -> Self {
        let dir = format!("provenance/artifacts/{}", id);
        self.with_node_files(&dir, id, version, semantic_type, action_yaml)
    }

    fn with_node_files(
        self,
        dir: &str,
        id: &str,
        version: u8,
        semantic_type: &str,
        action_yaml: &str,
    ) -> Self {
        let mut fixture = self
            .with_file(&format!("{}/VERSION", dir), version_text(version))
            .with_file(&format!("{}/metadata.yaml", dir), metadata_yaml(id, semantic_type));
        if version >= 1 {
            fixture = fixture.with_file(&format!("{}/action/action.yaml", dir), action_yaml);
        }
        if version >= 4 {
            fixture = fixture.with_file(&format!("{}/citations.bib", dir), citations_bib());
        }
        fixture
    }

    /// Adds or replaces a file.
    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let contents = contents.into();
        match self.files.iter_mut().find(|(p, _)| p == path) {
            Some(entry) => entry.1 = contents,
            None => self.files.push((path.to_string(), contents)),
        }
        self
    }

    pub fn without_file(mut self, path: &str) -> Self {
        self.files.retain(|(p, _)| p != path);
        self
    }

    /// Skips writing `checksums.md5`.
    pub fn without_manifest(mut self) -> Self {
        self.manifest = false;
        self
    }

    /// Writes `contents` to `path` after the manifest was computed.
    pub fn tamper(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.post_manifest
            .push((path.to_string(), Some(contents.into())));
        self
    }

    /// Removes `path` after the manifest was computed.
    pub fn drop_after_manifest(mut self, path: &str) -> Self {
        self.post_manifest.push((path.to_string(), None));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut files = self.files.clone();
        if self.version >= 5 && self.manifest {
            let manifest: String = files
                .iter()
                .map(|(path, contents)| format!("{:x}  {}\n", md5::compute(contents), path))
                .collect();
            files.push(("checksums.md5".to_string(), manifest.into_bytes()));
        }
        for (path, change) in &self.post_manifest {
            files.retain(|(p, _)| p != path);
            if let Some(contents) = change {
                files.push((path.clone(), contents.clone()));
            }
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (path, contents) in files {
            writer
                .start_file(format!("{}/{}", self.root_id, path), options)
                .expect("Failed to start zip entry");
            writer
                .write_all(&contents)
                .expect("Failed to write zip entry");
        }
        writer
            .finish()
            .expect("Failed to finish zip archive")
            .into_inner()
    }

    /// Writes the archive to `<dir>/<root id>.qza` and returns the path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.qza", self.root_id));
        std::fs::write(&path, self.to_bytes()).expect("Failed to write archive fixture");
        path
    }

    pub fn reader(&self) -> provdag::archive::ArchiveReader {
        provdag::archive::ArchiveReader::from_bytes(self.to_bytes(), format!("{}.qza", self.root_id))
            .expect("Failed to open archive fixture")
    }
}

#[allow(dead_code)]
pub fn version_text(version: u8) -> String {
    format!("QIIME 2\narchive: {}\nframework: {}\n", version, FRAMEWORK_VERSION)
}

#[allow(dead_code)]
pub fn metadata_yaml(id: &str, semantic_type: &str) -> String {
    format!("uuid: {}\ntype: {}\nformat: BIOMV210DirFmt\n", id, semantic_type)
}

#[allow(dead_code)]
pub fn citations_bib() -> String {
    format!(
        "@article{{framework|qiime2:{}|0,\n author = {{Bolyen, Evan and Rideout, Jai Ram}},\n \
         title = {{Reproducible, interactive, scalable and extensible microbiome data science}},\n \
         year = 2019\n}}\n",
        FRAMEWORK_VERSION
    )
}

#[allow(dead_code)]
pub fn import_action_yaml(action_id: &str) -> String {
    format!(
        "execution:
  uuid: {action_id}
  runtime:
    start: 2023-06-01T10:00:00.000000-07:00
    end: 2023-06-01T10:00:05.500000-07:00
    duration: 5 seconds, and 500000 microseconds

action:
  type: import
  format: BIOMV210Format
  manifest:
  - name: feature-table.biom
    md5sum: 0123456789abcdef0123456789abcdef

transformers:
  output:
  - from: BIOMV210Format
    to: BIOMV210DirFmt

environment:
  platform: linux-x86_64
  framework:
    version: {FRAMEWORK_VERSION}
"
    )
}

/// An `action.yaml` for a method, visualizer or pipeline.
///
/// `inputs` and `parameters` values are raw YAML, e.g. `"!set ['a', 'b']"` or `"null"`.
#[allow(dead_code)]
pub fn action_yaml(
    action_type: &str,
    plugin: &str,
    action: &str,
    inputs: &[(&str, &str)],
    parameters: &[(&str, &str)],
) -> String {
    let list = |entries: &[(&str, &str)]| -> String {
        if entries.is_empty() {
            " []".to_string()
        } else {
            entries
                .iter()
                .map(|(name, value)| format!("\n  - {}: {}", name, value))
                .collect()
        }
    };
    format!(
        "execution:
  uuid: action-{plugin}-{action}
  runtime:
    start: 2023-06-01 10:00:00.000000-07:00
    end: 2023-06-01 10:01:00.000000-07:00
    duration: 1 minute

action:
  type: {action_type}
  plugin: !ref 'environment:plugins:{plugin}'
  action: {action}
  inputs:{inputs}
  parameters:{parameters}
  output-name: result

environment:
  platform: linux-x86_64
  framework:
    version: {FRAMEWORK_VERSION}
  plugins:
    {plugin}:
      version: {FRAMEWORK_VERSION}
",
        inputs = list(inputs),
        parameters = list(parameters),
    )
}

/// A valid format 5 archive: `ROOT_ID` merges `IMPORT_A` with the collection
/// `[IMPORT_B, IMPORT_C, IMPORT_D]`.
#[allow(dead_code)]
pub fn create_merge_archive() -> ArchiveFixture {
    let merge = action_yaml(
        "method",
        "feature-table",
        "merge",
        &[
            ("table", IMPORT_A),
            (
                "tables",
                &format!("!set ['{}', '{}', '{}']", IMPORT_B, IMPORT_C, IMPORT_D),
            ),
            ("optional_taxonomy", "null"),
        ],
        &[("overlap_method", "error_on_overlapping_sample")],
    );
    let mut fixture = ArchiveFixture::new(ROOT_ID, 5, "FeatureTable[Frequency]")
        .with_file("data/feature-table.biom", "biom table contents")
        .with_root_provenance("FeatureTable[Frequency]", &merge);
    for id in [IMPORT_A, IMPORT_B, IMPORT_C, IMPORT_D] {
        fixture = fixture.with_ancestor(
            id,
            5,
            "FeatureTable[Frequency]",
            &import_action_yaml(&format!("import-{}", id)),
        );
    }
    fixture
}

/// A diversity run whose sample metadata was built from an artifact.
#[allow(dead_code)]
pub fn create_metadata_archive() -> ArchiveFixture {
    let action = action_yaml(
        "visualizer",
        "diversity",
        "alpha-group-significance",
        &[("alpha_diversity", IMPORT_A)],
        &[
            (
                "metadata",
                &format!("!metadata '{}:sample_metadata.tsv'", METADATA_ARTIFACT),
            ),
            ("color", "!color '#ff0000'"),
        ],
    );
    ArchiveFixture::new(ROOT_ID, 5, "Visualization")
        .with_root_provenance("Visualization", &action)
        .with_file(
            "provenance/action/sample_metadata.tsv",
            "sample-id\tbody-site\tsubject\n#q2:types\tcategorical\tcategorical\n\
             S1\tgut\tsubject-1\nS2\ttongue\tsubject-2\n",
        )
        .with_ancestor(
            IMPORT_A,
            5,
            "SampleData[AlphaDiversity]",
            &import_action_yaml("import-alpha"),
        )
        .with_ancestor(
            METADATA_ARTIFACT,
            5,
            "FeatureData[Taxonomy]",
            &import_action_yaml("import-taxonomy"),
        )
}

/// A single imported result in format `version`.
#[allow(dead_code)]
pub fn create_import_archive(root_id: &str, version: u8) -> ArchiveFixture {
    let fixture = ArchiveFixture::new(root_id, version, "FeatureData[Sequence]");
    if version == 0 {
        fixture
    } else {
        fixture.with_root_provenance(
            "FeatureData[Sequence]",
            &import_action_yaml(&format!("import-{}", root_id)),
        )
    }
}

/// `PIPE_OUT` is produced by a pipeline whose only external input is `PIPE_INPUT`.
/// Its internal steps `PIPE_STEP_1 -> PIPE_STEP_2` are recorded in the archive
/// but are not predecessors of the pipeline output.
#[allow(dead_code)]
pub fn create_pipeline_archive() -> ArchiveFixture {
    let pipeline = action_yaml(
        "pipeline",
        "diversity",
        "core-metrics",
        &[("table", PIPE_INPUT)],
        &[("sampling_depth", "1000")],
    );
    let step_1 = action_yaml("method", "feature-table", "rarefy", &[("table", PIPE_INPUT)], &[]);
    let step_2 = action_yaml("method", "diversity", "beta", &[("table", PIPE_STEP_1)], &[]);

    ArchiveFixture::new(PIPE_OUT, 5, "DistanceMatrix")
        .with_root_provenance("DistanceMatrix", &pipeline)
        .with_ancestor(PIPE_INPUT, 5, "FeatureTable[Frequency]", &import_action_yaml("import-input"))
        .with_ancestor(PIPE_STEP_1, 5, "FeatureTable[Frequency]", &step_1)
        .with_ancestor(PIPE_STEP_2, 5, "DistanceMatrix", &step_2)
}

pub const PIPE_OUT: &str = "b0000000-0000-4000-8000-0000000000a0";
pub const PIPE_INPUT: &str = "b0000000-0000-4000-8000-0000000000d0";
pub const PIPE_STEP_1: &str = "b0000000-0000-4000-8000-0000000000b0";
pub const PIPE_STEP_2: &str = "b0000000-0000-4000-8000-0000000000c0";

/// A format 5 node built directly, whose action takes `parents` as inputs.
#[allow(dead_code)]
pub fn synthetic_node(id: &str, parents: &[&str]) -> Node {
    let action_type = if parents.is_empty() {
        ActionType::Import
    } else {
        ActionType::Method
    };
    let action = Action {
        action_id: format!("action-{}", id),
        action_type,
        plugin_name: "test-plugin".to_string(),
        action_name: "combine".to_string(),
        runtime_start: None,
        runtime_end: None,
        runtime_duration_text: None,
        inputs: parents
            .iter()
            .enumerate()
            .map(|(i, parent)| (format!("input_{}", i), parent.to_string()))
            .collect(),
        parameters: Vec::new(),
        output_name: None,
        format: None,
        transformers: None,
        environment: None,
    };
    Node::new(
        ResultMetadata {
            id: id.to_string(),
            semantic_type: "FeatureTable[Frequency]".to_string(),
            data_format: None,
        },
        "5",
        FRAMEWORK_VERSION,
        Some(action),
        BTreeMap::new(),
        None,
    )
    .expect("Failed to build synthetic node")
}

/// A parse result holding `nodes`, with `origin` as its only origin id.
#[allow(dead_code)]
pub fn synthetic_build(
    origin: &str,
    nodes: Vec<Node>,
    validity: ValidationCode,
    checksum_diff: Option<ChecksumDiff>,
) -> GraphBuildResult {
    GraphBuildResult {
        origin_ids: BTreeSet::from([origin.to_string()]),
        node_map: nodes
            .into_iter()
            .map(|node| (node.id().clone(), node))
            .collect(),
        validity,
        checksum_diff,
        warnings: Vec::new(),
    }
}
