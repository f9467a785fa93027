//! Almanac — the trailing file table.
//!
//! # Wire layout (all integers big-endian)
//!
//! ```text
//! file_count: u64
//! per file:
//!   block_offset: u64    body offset of the file's compression block start
//!   size:         u64    raw uncompressed payload bytes
//!   modified:     u64    caller-defined timestamp
//!   name_len:     u16
//!   name:         name_len bytes (utf-8 relative path)
//! note_len:       u16
//! note:           note_len bytes (opaque user metadata)
//! almanac_mac:    8 bytes, SipHash-2-4(k3) over every preceding byte
//! ```
//!
//! The almanac is serialized as the body's final compression block, so it is
//! encrypted and covered by the body HMAC like everything else. Its own
//! SipHash tag lets a reader authenticate the file table without decrypting
//! any data block.
//!
//! Files sharing a `block_offset` live in the same compression block, in
//! insertion order; the offset algebra below recovers each file's position
//! inside its block and the block's compressed span inside the body.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

use crate::block::{BLOCK_MAC_LEN, BLOCK_MAX_FILES};
use crate::cipher::CIPHER_BLOCK_LEN;
use crate::error::{Error, Result};
use crate::keys::KeySchedule;

/// Smallest possible wire size of one file record (empty name).
const MIN_ENTRY_LEN: usize = 8 + 8 + 8 + 2;

/// Metadata locating one file inside the archive body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path without a leading separator.
    pub name: String,
    /// Caller-defined modification timestamp.
    pub modified: u64,
    /// Raw uncompressed size of the file payload.
    pub size: u64,
    /// Body offset at which the file's compression block begins.
    pub block_offset: u64,
}

/// The parsed file table plus the user note.
#[derive(Debug, Clone, Default)]
pub struct Almanac {
    pub files: Vec<FileEntry>,
    pub note: Vec<u8>,
}

impl Almanac {
    /// Serialize the almanac and append its SipHash tag.
    ///
    /// Length limits (u16 name and note fields) are enforced by the encoder
    /// before entries reach this point.
    pub(crate) fn to_bytes(&self, keys: &KeySchedule) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.files.len() * 40 + self.note.len() + BLOCK_MAC_LEN);

        buf.extend_from_slice(&(self.files.len() as u64).to_be_bytes());
        for file in &self.files {
            buf.extend_from_slice(&file.block_offset.to_be_bytes());
            buf.extend_from_slice(&file.size.to_be_bytes());
            buf.extend_from_slice(&file.modified.to_be_bytes());
            buf.extend_from_slice(&(file.name.len() as u16).to_be_bytes());
            buf.extend_from_slice(file.name.as_bytes());
        }
        buf.extend_from_slice(&(self.note.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.note);

        let tag = keys.block_tag(&buf);
        buf.extend_from_slice(&tag);
        buf
    }

    /// Parse a decompressed almanac and verify its SipHash tag.
    pub(crate) fn from_bytes(data: &[u8], keys: &KeySchedule) -> Result<Self> {
        let corrupt = |_| Error::IntegrityFailed("almanac");
        let mut r = data;

        let file_count = r.read_u64::<BigEndian>().map_err(corrupt)?;
        // A forged count cannot claim more entries than the buffer can hold.
        if file_count as usize > data.len() / MIN_ENTRY_LEN + 1 {
            return Err(Error::IntegrityFailed("almanac"));
        }

        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let block_offset = r.read_u64::<BigEndian>().map_err(corrupt)?;
            let size = r.read_u64::<BigEndian>().map_err(corrupt)?;
            let modified = r.read_u64::<BigEndian>().map_err(corrupt)?;
            let name_len = r.read_u16::<BigEndian>().map_err(corrupt)?;

            let mut name = vec![0u8; name_len as usize];
            r.read_exact(&mut name).map_err(corrupt)?;
            let name = String::from_utf8(name)
                .map_err(|e| Error::InvalidName(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;

            files.push(FileEntry { name, modified, size, block_offset });
        }

        let note_len = r.read_u16::<BigEndian>().map_err(corrupt)?;
        let mut note = vec![0u8; note_len as usize];
        r.read_exact(&mut note).map_err(corrupt)?;

        // Exactly the tag must remain.
        if r.len() != BLOCK_MAC_LEN {
            return Err(Error::IntegrityFailed("almanac"));
        }
        let tagged = data.len() - BLOCK_MAC_LEN;
        if keys.block_tag(&data[..tagged]) != <[u8; BLOCK_MAC_LEN]>::try_from(r).unwrap() {
            return Err(Error::IntegrityFailed("almanac"));
        }

        Ok(Self { files, note })
    }

    /// Structural sanity over a parsed table.
    ///
    /// Block offsets must be non-decreasing in insertion order and no block
    /// may claim more files than the format's per-block cap.
    pub(crate) fn check(&self, almanac_offset: u64) -> Result<()> {
        let mut previous = 0u64;
        let mut in_block = 0usize;

        for file in &self.files {
            if file.block_offset < previous {
                return Err(Error::IntegrityFailed("almanac"));
            }
            if file.block_offset >= almanac_offset {
                // No data block may start inside the almanac region.
                return Err(Error::IntegrityFailed("almanac"));
            }
            in_block = if file.block_offset == previous && in_block > 0 { in_block + 1 } else { 1 };
            if in_block > BLOCK_MAX_FILES {
                return Err(Error::TooManyFiles);
            }
            previous = file.block_offset;
        }

        Ok(())
    }

    // ── Offset algebra ───────────────────────────────────────────────────────

    /// Byte offset of file `i`'s payload within its decompressed block: the
    /// sum of sizes of earlier files sharing the same `block_offset`.
    pub fn start_within_block(&self, i: usize) -> u64 {
        let target = self.files[i].block_offset;
        self.files[..i]
            .iter()
            .rev()
            .take_while(|f| f.block_offset == target)
            .map(|f| f.size)
            .sum()
    }

    /// Compressed `(start, len)` span of file `i`'s block within the body.
    ///
    /// The block ends where the next block begins — or at `almanac_offset`
    /// when file `i` sits in the last data block.
    pub fn block_span(&self, i: usize, almanac_offset: u64) -> (u64, u64) {
        let start = self.files[i].block_offset;
        let end = self.files[i + 1..]
            .iter()
            .find(|f| f.block_offset != start)
            .map(|f| f.block_offset)
            .unwrap_or(almanac_offset);
        (start, end - start)
    }
}

/// Half-open cipher-row range `[lo, hi)` covering `len` body bytes at
/// `offset`. Rows are [`CIPHER_BLOCK_LEN`]-sized units of the CTR keystream.
pub fn cipher_rows(offset: u64, len: u64) -> (u64, u64) {
    let block = CIPHER_BLOCK_LEN as u64;
    (offset / block, (offset + len).div_ceil(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeySchedule, SALT_LEN};

    fn test_keys() -> KeySchedule {
        KeySchedule::derive(b"password123", &[11u8; SALT_LEN]).unwrap()
    }

    fn sample() -> Almanac {
        Almanac {
            files: vec![
                FileEntry { name: "test.txt".into(), modified: 10, size: 19, block_offset: 0 },
                FileEntry { name: "test2.txt".into(), modified: 20, size: 12, block_offset: 0 },
                FileEntry { name: "some/file.txt".into(), modified: 30, size: 16, block_offset: 57 },
            ],
            note: b"backup 2021".to_vec(),
        }
    }

    #[test]
    fn round_trip() {
        let keys = test_keys();
        let almanac = sample();

        let decoded = Almanac::from_bytes(&almanac.to_bytes(&keys), &keys).unwrap();
        assert_eq!(decoded.files, almanac.files);
        assert_eq!(decoded.note, almanac.note);
    }

    #[test]
    fn empty_table_round_trips() {
        let keys = test_keys();
        let almanac = Almanac::default();

        let decoded = Almanac::from_bytes(&almanac.to_bytes(&keys), &keys).unwrap();
        assert!(decoded.files.is_empty());
        assert!(decoded.note.is_empty());
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let keys = test_keys();
        let mut bytes = sample().to_bytes(&keys);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;

        assert!(matches!(
            Almanac::from_bytes(&bytes, &keys),
            Err(Error::IntegrityFailed("almanac"))
        ));
    }

    #[test]
    fn tampered_field_is_rejected() {
        let keys = test_keys();
        let mut bytes = sample().to_bytes(&keys);
        bytes[9] ^= 0x01; // inside the first entry's block_offset

        assert!(Almanac::from_bytes(&bytes, &keys).is_err());
    }

    #[test]
    fn forged_file_count_is_rejected() {
        let keys = test_keys();
        let mut bytes = sample().to_bytes(&keys);
        bytes[..8].copy_from_slice(&u64::MAX.to_be_bytes());

        assert!(Almanac::from_bytes(&bytes, &keys).is_err());
    }

    #[test]
    fn start_within_block_sums_preceding_sizes() {
        let almanac = sample();
        assert_eq!(almanac.start_within_block(0), 0);
        assert_eq!(almanac.start_within_block(1), 19);
        // First file of the second block starts at zero again.
        assert_eq!(almanac.start_within_block(2), 0);
    }

    #[test]
    fn block_span_ends_at_next_block_or_almanac() {
        let almanac = sample();
        assert_eq!(almanac.block_span(0, 100), (0, 57));
        assert_eq!(almanac.block_span(1, 100), (0, 57));
        assert_eq!(almanac.block_span(2, 100), (57, 43));
    }

    #[test]
    fn cipher_rows_cover_the_span() {
        assert_eq!(cipher_rows(0, 16), (0, 1));
        assert_eq!(cipher_rows(0, 17), (0, 2));
        assert_eq!(cipher_rows(57, 43), (3, 7));
        assert_eq!(cipher_rows(32, 0), (2, 2));
    }

    #[test]
    fn check_rejects_decreasing_offsets() {
        let keys = test_keys();
        let mut almanac = sample();
        almanac.files[2].block_offset = 0;
        almanac.files[1].block_offset = 57;
        let decoded = Almanac::from_bytes(&almanac.to_bytes(&keys), &keys).unwrap();

        assert!(matches!(decoded.check(100), Err(Error::IntegrityFailed("almanac"))));
    }

    #[test]
    fn check_rejects_offsets_inside_almanac_region() {
        let almanac = sample();
        assert!(almanac.check(57).is_err());
        assert!(almanac.check(58).is_ok());
    }
}
