//! End-to-end: the small-file/large-file storage split (§4.5, §8 boundary
//! behavior) is visible through the facade, not just the updater's own
//! unit tests.

mod common;

use std::fs;

use common::Fixture;
use h5ar::config::ArchiveConfig;
use h5ar::storage::Storage;

#[test]
fn files_at_or_under_the_threshold_are_contiguous_above_it_are_chunked() {
    let mut config = ArchiveConfig::default();
    config.small_file_threshold = 16;
    let fixture = Fixture::with_config(config);
    let facade = fixture.facade();

    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("small.bin"), vec![1u8; 16]).unwrap();
    fs::write(src.path().join("large.bin"), vec![2u8; 17]).unwrap();
    facade.archive_from_filesystem("/", src.path()).unwrap();

    assert!(!fixture.storage.is_chunked("/small.bin").unwrap());
    assert!(fixture.storage.is_chunked("/large.bin").unwrap());

    let listed = facade.list("/").unwrap();
    let small = listed.iter().find(|e| e.archive_path == "/small.bin").unwrap();
    let large = listed.iter().find(|e| e.archive_path == "/large.bin").unwrap();
    assert_eq!(small.record.size, 16);
    assert_eq!(large.record.size, 17);
    assert!(small.record.has_crc32);
    assert!(large.record.has_crc32);
}

#[test]
fn disabling_compression_whitelist_keeps_everything_contiguous_regardless_of_size() {
    use h5ar::config::ArchivingStrategyKind;
    let mut config = ArchiveConfig::default();
    config.archiving_strategy = ArchivingStrategyKind::NoCompress;
    config.small_file_threshold = 4;
    let fixture = Fixture::with_config(config);
    let facade = fixture.facade();

    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("big.bin"), vec![9u8; 1000]).unwrap();
    facade.archive_from_filesystem("/", src.path()).unwrap();

    // Compression disabled forces the contiguous path regardless of the
    // threshold, per §4.5.
    assert!(!fixture.storage.is_chunked("/big.bin").unwrap());
}
