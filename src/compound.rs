//! On-disk layout of one `INDEX` compound record (§3).
//!
//! Field order, matching the spec exactly: `linkNameLength` (i32),
//! `linkType` (i32 ordinal into [`crate::link_record::FileLinkType`]),
//! `size` (i64), `lastModified` (i64), `uid` (i32), `gid` (i32),
//! `permissions` (i16), `crc32` (i32). Encoded little-endian via
//! `byteorder`, the same crate the teacher uses for all of its wire-format
//! (de)serialization.
//!
//! This encoding is packed with no inter-field padding, so the
//! field-by-field CRC convention and the legacy whole-buffer convention
//! happen to coincide for records this crate itself writes; both are
//! still implemented (§4.2) because a real HDF5 backend's compound type
//! may insert padding a foreign writer produced.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::io::Cursor;

use crate::error::{ArchiveError, Result};
use crate::link_record::{FileLinkType, LinkRecord, UNKNOWN, UNKNOWN_I16, UNKNOWN_I32};

/// Byte length of one encoded record (excludes the variable-length name,
/// which lives in the sibling `INDEXNAMES` dataset).
pub const RECORD_SIZE: usize = 4 + 4 + 8 + 8 + 4 + 4 + 2 + 4;

/// Byte ranges of each member within an encoded record, in on-disk order.
/// Used to slice out member bytes for the field-by-field CRC (§4.2).
pub const FIELD_RANGES: [(usize, usize); 8] = [
    (0, 4),   // linkNameLength
    (4, 8),   // linkType
    (8, 16),  // size
    (16, 24), // lastModified
    (24, 28), // uid
    (28, 32), // gid
    (32, 34), // permissions
    (34, 38), // crc32
];

/// Encode one record's fixed-width members. `link_name_length` is passed
/// separately because it reflects the name's byte length in
/// `INDEXNAMES`, which the caller computes while laying out that buffer.
pub fn encode_record(record: &LinkRecord, link_name_length: i32) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    let mut cursor = Cursor::new(&mut buf[..]);
    cursor.write_i32::<LittleEndian>(link_name_length).unwrap();
    cursor.write_i32::<LittleEndian>(record.link_type.to_i32().unwrap()).unwrap();
    cursor.write_i64::<LittleEndian>(record.size).unwrap();
    cursor.write_i64::<LittleEndian>(record.last_modified).unwrap();
    cursor.write_i32::<LittleEndian>(record.uid).unwrap();
    cursor.write_i32::<LittleEndian>(record.gid).unwrap();
    cursor.write_i16::<LittleEndian>(record.permissions).unwrap();
    cursor.write_i32::<LittleEndian>(record.crc32).unwrap();
    buf
}

/// Decode one record's fixed-width members, returning the record (with an
/// empty `link_name`, filled in later from `INDEXNAMES`) and the encoded
/// name length.
pub fn decode_record(bytes: &[u8]) -> Result<(LinkRecord, i32)> {
    if bytes.len() < RECORD_SIZE {
        return Err(ArchiveError::MalformedIndex {
            group_path: String::new(),
            detail: format!("record too short: {} < {RECORD_SIZE}", bytes.len()),
        });
    }
    let mut cursor = Cursor::new(bytes);
    let name_length = cursor.read_i32::<LittleEndian>().unwrap();
    let type_ordinal = cursor.read_i32::<LittleEndian>().unwrap();
    let size = cursor.read_i64::<LittleEndian>().unwrap();
    let last_modified = cursor.read_i64::<LittleEndian>().unwrap();
    let uid = cursor.read_i32::<LittleEndian>().unwrap();
    let gid = cursor.read_i32::<LittleEndian>().unwrap();
    let permissions = cursor.read_i16::<LittleEndian>().unwrap();
    let crc32 = cursor.read_i32::<LittleEndian>().unwrap();

    let link_type = FileLinkType::from_i32(type_ordinal).ok_or_else(|| ArchiveError::MalformedIndex {
        group_path: String::new(),
        detail: format!("unknown link type ordinal {type_ordinal}"),
    })?;

    let mut record = LinkRecord::new(String::new(), link_type);
    record.size = size;
    record.last_modified = last_modified;
    record.uid = uid;
    record.gid = gid;
    record.permissions = permissions;
    record.crc32 = crc32;
    record.has_crc32 = link_type == FileLinkType::RegularFile && (crc32 != 0 || size == 0);
    Ok((record, name_length))
}

/// Slice each member's on-disk bytes out of an encoded record, in order,
/// for field-by-field CRC digesting.
pub fn field_slices(encoded: &[u8; RECORD_SIZE]) -> [&[u8]; 8] {
    let mut out: [&[u8]; 8] = [&[]; 8];
    for (i, (start, end)) in FIELD_RANGES.iter().enumerate() {
        out[i] = &encoded[*start..*end];
    }
    out
}

/// True if every optional field of `record` is unknown and it is brand
/// new (used by directory-reconstruction to decide completeness).
pub fn is_bare(record: &LinkRecord) -> bool {
    record.size == UNKNOWN
        && record.last_modified == UNKNOWN
        && record.uid == UNKNOWN_I32
        && record.gid == UNKNOWN_I32
        && record.permissions == UNKNOWN_I16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let mut r = LinkRecord::new("ignored-here", FileLinkType::RegularFile);
        r.size = 12345;
        r.last_modified = 999;
        r.uid = 1000;
        r.gid = 1000;
        r.permissions = 0o644;
        r.crc32 = -42;
        let encoded = encode_record(&r, 7);
        let (decoded, name_len) = decode_record(&encoded).unwrap();
        assert_eq!(name_len, 7);
        assert_eq!(decoded.link_type, FileLinkType::RegularFile);
        assert_eq!(decoded.size, 12345);
        assert_eq!(decoded.last_modified, 999);
        assert_eq!(decoded.uid, 1000);
        assert_eq!(decoded.gid, 1000);
        assert_eq!(decoded.permissions, 0o644);
        assert_eq!(decoded.crc32, -42);
    }

    #[test]
    fn field_slices_cover_the_whole_buffer_with_no_gaps() {
        let r = LinkRecord::new("x", FileLinkType::Directory);
        let encoded = encode_record(&r, 1);
        let slices = field_slices(&encoded);
        let total: usize = slices.iter().map(|s| s.len()).sum();
        assert_eq!(total, RECORD_SIZE);
    }
}
