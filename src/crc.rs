//! CRC32 helpers.
//!
//! Two conventions exist for the `CRC32` attribute on index datasets
//! (§4.2): the current one digests only the semantic member bytes of each
//! compound record (skipping compiler-inserted padding), and a legacy one
//! digests the whole contiguous on-disk buffer including padding. Readers
//! accept either; writers always produce the current one.

use crc32fast::Hasher;

/// Running CRC32 accumulator, used by the streaming writer (§4.5) and the
/// list/verify/extract processors (§4.7–§4.9) to digest file content as it
/// streams past.
#[derive(Default, Clone)]
pub struct RunningCrc32 {
    hasher: Hasher,
}

impl RunningCrc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }

    /// Peek the digest without consuming the accumulator, so a caller can
    /// keep streaming bytes after checking the running value.
    pub fn finalize_clone(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// CRC32 of a single contiguous buffer (the legacy whole-buffer
/// convention, and also what's used for `INDEXNAMES`, which has no
/// padding to worry about).
pub fn crc32_of(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// CRC32 over a sequence of member-field byte slices, in on-disk member
/// order, skipping any padding between them. This is the current
/// convention for `INDEX` records (§4.2).
pub fn crc32_of_fields<'a>(fields: impl IntoIterator<Item = &'a [u8]>) -> u32 {
    let mut hasher = Hasher::new();
    for field in fields {
        hasher.update(field);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_matches_ieee_crc32() {
        // CRC32("hi\n") = 0x2C6E0C59 per the end-to-end scenario in the spec.
        assert_eq!(crc32_of(b"hi\n"), 0x2C6E_0C59);
    }

    #[test]
    fn field_by_field_matches_whole_buffer_when_contiguous() {
        let a = b"abc";
        let b = b"defg";
        let whole: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
        assert_eq!(crc32_of_fields([a.as_slice(), b.as_slice()]), crc32_of(&whole));
    }

    #[test]
    fn running_crc_matches_one_shot() {
        let mut running = RunningCrc32::new();
        running.update(b"hi");
        running.update(b"\n");
        assert_eq!(running.finalize(), crc32_of(b"hi\n"));
    }
}
