//! End-to-end: deleting a directory removes it from its parent's listing
//! and drops any cached index for everything beneath it (§4.6).

mod common;

use std::fs;

use common::Fixture;

#[test]
fn deleting_a_subtree_removes_it_from_listing_and_storage() {
    let fixture = Fixture::new();
    let facade = fixture.facade();

    let src = tempfile::tempdir().unwrap();
    fs::create_dir(src.path().join("doomed")).unwrap();
    fs::write(src.path().join("doomed/a.txt"), b"a").unwrap();
    fs::write(src.path().join("doomed/b.txt"), b"b").unwrap();
    fs::write(src.path().join("survivor.txt"), b"s").unwrap();
    facade.archive_from_filesystem("/", src.path()).unwrap();

    assert!(facade.exists("/doomed/a.txt").unwrap());
    facade.delete("/doomed").unwrap();

    assert!(!facade.exists("/doomed").unwrap());
    assert!(!facade.exists("/doomed/a.txt").unwrap());
    assert!(facade.exists("/survivor.txt").unwrap());

    let remaining: Vec<_> = facade.list("/").unwrap().into_iter().map(|e| e.archive_path).collect();
    assert!(!remaining.iter().any(|p| p.starts_with("/doomed")));
    assert!(remaining.contains(&"/survivor.txt".to_string()));

    facade.close().unwrap();
}

#[test]
fn deleting_a_nonexistent_path_fails() {
    let fixture = Fixture::new();
    let facade = fixture.facade();
    assert!(facade.delete("/nope").is_err());
}
