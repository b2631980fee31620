//! Per-entry metadata value type (§3, component C1).

use num_derive::{FromPrimitive, ToPrimitive};

/// Sentinel for fields whose value is unknown or not applicable.
pub const UNKNOWN: i64 = -1;
pub const UNKNOWN_I32: i32 = -1;
pub const UNKNOWN_I16: i16 = -1;

/// The kind of object a [`LinkRecord`] describes. Encoded on disk as its
/// ordinal, which is why this carries `FromPrimitive`/`ToPrimitive`
/// instead of a hand-rolled mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum FileLinkType {
    Directory = 0,
    RegularFile = 1,
    Symlink = 2,
    Other = 3,
}

/// Which optional fields were populated when a record was written,
/// controlling listing format (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Base,
    LastModified,
    Full,
}

/// One row of a directory index: metadata describing exactly one child
/// entry, plus transient verification state attached by list/verify/
/// extract operations.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub link_name: String,
    pub link_type: FileLinkType,
    pub size: i64,
    pub last_modified: i64,
    pub uid: i32,
    pub gid: i32,
    pub permissions: i16,
    pub crc32: i32,
    pub has_crc32: bool,
    pub link_target: Option<String>,

    pub verified_type: Option<FileLinkType>,
    pub verified_size: i64,
    pub verified_crc32: Option<u32>,
    pub verified_last_modified: i64,
    pub verification_error: Option<String>,
}

impl LinkRecord {
    /// A bare record with every optional field unknown (the `BASE`
    /// completeness level).
    pub fn new(link_name: impl Into<String>, link_type: FileLinkType) -> Self {
        LinkRecord {
            link_name: link_name.into(),
            link_type,
            size: UNKNOWN,
            last_modified: UNKNOWN,
            uid: UNKNOWN_I32,
            gid: UNKNOWN_I32,
            permissions: UNKNOWN_I16,
            crc32: 0,
            has_crc32: false,
            link_target: None,
            verified_type: None,
            verified_size: UNKNOWN,
            verified_crc32: None,
            verified_last_modified: UNKNOWN,
            verification_error: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.link_type == FileLinkType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.link_type == FileLinkType::Symlink
    }

    pub fn is_regular_file(&self) -> bool {
        self.link_type == FileLinkType::RegularFile
    }

    /// Derive the completeness level from which optional fields are set.
    pub fn completeness(&self) -> Completeness {
        if self.last_modified == UNKNOWN {
            Completeness::Base
        } else if self.permissions == UNKNOWN_I16 || self.uid == UNKNOWN_I32 || self.gid == UNKNOWN_I32 {
            Completeness::LastModified
        } else {
            Completeness::Full
        }
    }

    /// Reset the transient verification fields. Called by
    /// [`crate::link_store::LinkStore::iter`] before yielding each record,
    /// so repeated traversals see fresh state.
    pub fn reset_verification(&mut self) {
        self.verified_type = None;
        self.verified_size = UNKNOWN;
        self.verified_crc32 = None;
        self.verified_last_modified = UNKNOWN;
        self.verification_error = None;
    }

    /// Per-entry status line, classified per §7 "Visible behaviors".
    pub fn status(&self, verbose: bool) -> String {
        if let Some(err) = &self.verification_error {
            return format!("ERROR: {err}");
        }
        if let Some(vt) = self.verified_type {
            if vt != self.link_type {
                return "WRONG TYPE".to_string();
            }
        }
        if self.verified_size != UNKNOWN && self.is_regular_file() && self.verified_size != self.size {
            return "WRONG SIZE".to_string();
        }
        if let Some(vc) = self.verified_crc32 {
            if self.has_crc32 && vc != self.crc32 as u32 {
                return "WRONG CRC32".to_string();
            }
        }
        if self.verified_last_modified != UNKNOWN && self.verified_last_modified != self.last_modified {
            return "WRONG LASTMODIFICATION".to_string();
        }
        if verbose {
            format!("OK ({:?}, {} bytes)", self.link_type, self.size.max(0))
        } else {
            "OK".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_base_completeness() {
        let r = LinkRecord::new("a", FileLinkType::RegularFile);
        assert_eq!(r.completeness(), Completeness::Base);
    }

    #[test]
    fn full_completeness_requires_all_optional_fields() {
        let mut r = LinkRecord::new("a", FileLinkType::RegularFile);
        r.last_modified = 100;
        assert_eq!(r.completeness(), Completeness::LastModified);
        r.uid = 0;
        r.gid = 0;
        r.permissions = 0o644;
        assert_eq!(r.completeness(), Completeness::Full);
    }

    #[test]
    fn status_reports_ok_when_verification_matches() {
        let mut r = LinkRecord::new("a", FileLinkType::RegularFile);
        r.size = 3;
        r.crc32 = 0x2C6E_0C59u32 as i32;
        r.has_crc32 = true;
        r.verified_type = Some(FileLinkType::RegularFile);
        r.verified_size = 3;
        r.verified_crc32 = Some(0x2C6E_0C59);
        assert_eq!(r.status(false), "OK");
    }

    #[test]
    fn status_reports_wrong_size() {
        let mut r = LinkRecord::new("a", FileLinkType::RegularFile);
        r.size = 5;
        r.verified_type = Some(FileLinkType::RegularFile);
        r.verified_size = 6;
        assert_eq!(r.status(false), "WRONG SIZE");
    }
}
