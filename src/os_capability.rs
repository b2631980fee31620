//! Host OS operations needed to capture and restore filesystem metadata
//! (§6.2, used by the updater and extract processor).
//!
//! Grounded on the teacher's `examples/shadow_fs/fs/utils.rs`, which
//! performs the identical translation between `std::fs::Metadata` and a
//! protocol-level attribute struct (there: NFS `FileAttr`; here:
//! [`crate::link_record::LinkRecord`]).

use std::fs;
use std::path::Path;

use filetime::FileTime;

use crate::error::{ArchiveError, Result};
use crate::link_record::FileLinkType;

/// Owner/group/mode/mtime snapshot taken from a filesystem entry. `mode` is
/// `None` when permissions were never captured (e.g. a record reconstructed
/// from group enumeration), distinct from a real mode of `0`.
#[derive(Debug, Clone, Copy)]
pub struct UnixMetadata {
    pub uid: u32,
    pub gid: u32,
    pub mode: Option<u32>,
    pub mtime_secs: i64,
}

/// Host capability seam: everything the updater/extractor need from the
/// real OS, abstracted so tests can run without root or even a real
/// filesystem's metadata semantics.
pub trait OsCapability: Send + Sync {
    fn read_metadata(&self, path: &Path) -> Result<UnixMetadata>;
    fn read_symlink_target(&self, path: &Path) -> Result<String>;

    /// Apply ownership, permissions, and mtime to `path`, best-effort per
    /// §6.2's restoration rules (chown verbatim as root; chgrp only if the
    /// caller is a member of the target group; mtime always attempted;
    /// permissions skipped for symlinks, since changing them follows the
    /// link instead of the link itself). `link_type` tells the restorer
    /// what kind of filesystem entry `path` is.
    fn restore_metadata(&self, path: &Path, meta: &UnixMetadata, link_type: FileLinkType) -> Result<()>;

    fn is_root(&self) -> bool;
    fn is_member_of_group(&self, gid: u32) -> bool;

    /// Whether this OS capability can create symlinks at all (§4.9
    /// "OS doesn't support symlinks" fallback). Always true on Unix.
    fn supports_symlinks(&self) -> bool {
        true
    }
}

fn map_io_error(context: &str, err: std::io::Error) -> ArchiveError {
    ArchiveError::io(context.to_string(), err)
}

/// Real implementation backed by `std::os::unix` + `libc` + `filetime`,
/// the same trio the teacher reaches for in `shadow_fs`.
#[derive(Debug, Default)]
pub struct UnixOs;

impl OsCapability for UnixOs {
    fn read_metadata(&self, path: &Path) -> Result<UnixMetadata> {
        use std::os::unix::fs::MetadataExt;
        let meta = fs::symlink_metadata(path).map_err(|e| map_io_error("stat", e))?;
        Ok(UnixMetadata { uid: meta.uid(), gid: meta.gid(), mode: Some(meta.mode()), mtime_secs: meta.mtime() })
    }

    fn read_symlink_target(&self, path: &Path) -> Result<String> {
        let target = fs::read_link(path).map_err(|e| map_io_error("readlink", e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn restore_metadata(&self, path: &Path, meta: &UnixMetadata, link_type: FileLinkType) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if self.is_root() {
            chown(path, meta.uid, meta.gid)?;
        } else if self.is_member_of_group(meta.gid) {
            chown(path, u32::MAX, meta.gid)?;
        }

        // fs::set_permissions follows symlinks, so it must never be called
        // for one — it would chmod the link's target, not the link.
        if link_type != FileLinkType::Symlink {
            if let Some(mode) = meta.mode {
                let perms = fs::Permissions::from_mode(mode & 0o7777);
                fs::set_permissions(path, perms).map_err(|e| map_io_error("chmod", e))?;
            }
        }

        let mtime = FileTime::from_unix_time(meta.mtime_secs, 0);
        if link_type == FileLinkType::Symlink {
            filetime::set_symlink_file_times(path, mtime, mtime).map_err(|e| map_io_error("lutimes", e))?;
        } else {
            filetime::set_file_times(path, mtime, mtime).map_err(|e| map_io_error("utimes", e))?;
        }
        Ok(())
    }

    fn is_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn is_member_of_group(&self, gid: u32) -> bool {
        if unsafe { libc::getegid() } == gid {
            return true;
        }
        let mut groups = vec![0u32; 64];
        let count = unsafe { libc::getgroups(groups.len() as i32, groups.as_mut_ptr()) };
        if count < 0 {
            return false;
        }
        groups.truncate(count as usize);
        groups.contains(&gid)
    }
}

fn chown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| ArchiveError::storage("chown", e.to_string()))?;
    let raw_uid = if uid == u32::MAX { u32::MAX as libc::uid_t } else { uid as libc::uid_t };
    let raw_gid = if gid == u32::MAX { u32::MAX as libc::gid_t } else { gid as libc::gid_t };
    let rc = unsafe { libc::lchown(c_path.as_ptr(), raw_uid, raw_gid) };
    if rc != 0 {
        return Err(map_io_error("lchown", std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Non-operational stand-in for tests and for archive operations that run
/// under [`crate::storage::memory::MemoryStorage`], where there is no real
/// filesystem to touch.
#[derive(Debug, Default)]
pub struct NullOs;

impl OsCapability for NullOs {
    fn read_metadata(&self, _path: &Path) -> Result<UnixMetadata> {
        Ok(UnixMetadata { uid: 0, gid: 0, mode: Some(0o644), mtime_secs: 0 })
    }

    fn read_symlink_target(&self, _path: &Path) -> Result<String> {
        Ok(String::new())
    }

    fn restore_metadata(&self, _path: &Path, _meta: &UnixMetadata, _link_type: FileLinkType) -> Result<()> {
        Ok(())
    }

    fn is_root(&self) -> bool {
        false
    }

    fn is_member_of_group(&self, _gid: u32) -> bool {
        false
    }
}
