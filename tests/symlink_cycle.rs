//! End-to-end: a symlink that points at itself (directly, and through one
//! hop) is reported as a cycle rather than looping forever (§4.6).

mod common;

use common::Fixture;
use h5ar::storage::Storage;
use h5ar::{ArchiveError, FileLinkType, LinkRecord};

#[test]
fn direct_self_link_is_a_cycle() {
    let fixture = Fixture::new();
    fixture.storage.create_soft_link("/loop", "/loop").unwrap();

    let suffix = fixture.config.housekeeping_suffix.clone();
    let provider = h5ar::index_provider::IndexProvider::new(suffix.clone(), 10);
    let root = provider.get(&fixture.storage, "/", false, &h5ar::error::FailFast).unwrap();
    let mut record = LinkRecord::new("loop", FileLinkType::Symlink);
    record.link_target = Some("/loop".to_string());
    root.lock().unwrap().update(record);
    root.lock().unwrap().flush(&fixture.storage, &suffix).unwrap();

    let facade = fixture.facade();
    let result = facade.try_resolve_link("/loop");
    assert!(matches!(result, Err(ArchiveError::SymlinkCycle { .. })));
}

#[test]
fn two_hop_cycle_is_detected() {
    let fixture = Fixture::new();
    fixture.storage.create_soft_link("/b", "/a").unwrap();
    fixture.storage.create_soft_link("/a", "/b").unwrap();

    let suffix = fixture.config.housekeeping_suffix.clone();
    let provider = h5ar::index_provider::IndexProvider::new(suffix.clone(), 10);
    let root = provider.get(&fixture.storage, "/", false, &h5ar::error::FailFast).unwrap();
    {
        let mut guard = root.lock().unwrap();
        let mut a = LinkRecord::new("a", FileLinkType::Symlink);
        a.link_target = Some("/b".to_string());
        let mut b = LinkRecord::new("b", FileLinkType::Symlink);
        b.link_target = Some("/a".to_string());
        guard.update(a);
        guard.update(b);
        guard.flush(&fixture.storage, &suffix).unwrap();
    }

    let facade = fixture.facade();
    assert!(matches!(facade.try_resolve_link("/a"), Err(ArchiveError::SymlinkCycle { .. })));
}
