//! Checksum validation tests
//!
//! Manifest comparison, format-dependent strategies and the caller opt-out.
mod common;
use common::*;
use provdag::archive::{CHECKSUM_FILE, ChecksumStrategy, validate_checksums};
use provdag::prelude::*;

#[cfg(test)]
mod checksum_tests {
    use super::*;

    #[test]
    fn test_unmodified_archive_is_valid_with_empty_diff() {
        let mut archive = create_merge_archive().reader();
        let (code, diff) = validate_checksums(&mut archive).expect("Failed to validate");

        assert_eq!(code, ValidationCode::Valid);
        let diff = diff.expect("A valid archive should report an empty diff");
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_modified_files_are_reported() {
        let mut archive = create_merge_archive()
            .tamper("data/feature-table.biom", "edited by hand")
            .tamper("data/extra.txt", "not in the manifest")
            .drop_after_manifest("provenance/citations.bib")
            .reader();
        let (code, diff) = validate_checksums(&mut archive).expect("Failed to validate");

        assert_eq!(code, ValidationCode::Invalid);
        let diff = diff.expect("A mismatch should report a diff");
        assert_eq!(diff.added.keys().collect::<Vec<_>>(), ["data/extra.txt"]);
        assert_eq!(
            diff.removed.keys().collect::<Vec<_>>(),
            ["provenance/citations.bib"]
        );
        assert_eq!(
            diff.changed.keys().collect::<Vec<_>>(),
            ["data/feature-table.biom"]
        );
        let change = &diff.changed["data/feature-table.biom"];
        assert_eq!(change.expected, format!("{:x}", md5::compute("biom table contents")));
        assert_eq!(change.observed, format!("{:x}", md5::compute("edited by hand")));
    }

    #[test]
    fn test_manifest_never_lists_itself() {
        let mut archive = create_merge_archive().reader();
        let manifest = archive
            .read_string(&format!("{}/{}", ROOT_ID, CHECKSUM_FILE))
            .expect("Failed to read manifest");
        let (_, diff) = validate_checksums(&mut archive).expect("Failed to validate");

        assert!(!manifest.contains(CHECKSUM_FILE));
        assert!(!diff.unwrap().added.contains_key(CHECKSUM_FILE));
    }

    #[test]
    fn test_missing_manifest_is_invalid_without_diff() {
        let mut archive = create_merge_archive().without_manifest().reader();
        let result = validate_checksums(&mut archive).expect("Failed to validate");

        assert_eq!(result, (ValidationCode::Invalid, None));
    }

    #[test]
    fn test_opt_out_short_circuits() {
        let config = Config::default().with_checksum_validation(false);
        // Even a tampered archive is not inspected.
        let mut archive = create_merge_archive()
            .tamper("data/feature-table.biom", "edited")
            .reader();

        for strategy in [ChecksumStrategy::Manifest, ChecksumStrategy::PredatesChecksums] {
            let result = strategy.run(&config, &mut archive).expect("Failed to run strategy");
            assert_eq!(result, (ValidationCode::ValidationOptout, None));
        }
    }

    #[test]
    fn test_formats_before_five_predate_checksums() {
        for version in 1..=4 {
            let graph = ProvenanceGraph::from_input(
                ProvenanceInput::Bytes {
                    name: "import.qza".to_string(),
                    bytes: create_import_archive(ROOT_ID, version).to_bytes(),
                },
                Config::default(),
            )
            .expect("Failed to parse archive");

            assert_eq!(graph.validity(), ValidationCode::PredatesChecksums);
            assert_eq!(graph.checksum_diff(), None);
        }
    }

    #[test]
    fn test_checksum_mismatch_does_not_abort_parsing() {
        let bytes = create_merge_archive()
            .tamper("data/feature-table.biom", "edited")
            .to_bytes();
        let graph = ProvenanceGraph::from_input(
            ProvenanceInput::Bytes {
                name: "tampered.qza".to_string(),
                bytes,
            },
            Config::default(),
        )
        .expect("Failed to parse tampered archive");

        assert_eq!(graph.validity(), ValidationCode::Invalid);
        assert!(graph.checksum_diff().is_some_and(|d| d.changed.len() == 1));
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn test_parse_with_opt_out_reports_optout() {
        let graph = ProvenanceGraph::from_input(
            ProvenanceInput::Bytes {
                name: "merge.qza".to_string(),
                bytes: create_merge_archive().to_bytes(),
            },
            Config::default().with_checksum_validation(false),
        )
        .expect("Failed to parse archive");

        assert_eq!(graph.validity(), ValidationCode::ValidationOptout);
        assert_eq!(graph.checksum_diff(), None);
    }
}
