//! Compression-block framing.
//!
//! A compression block is one or more file payloads concatenated tail-to-tail
//! (no per-file framing), followed by an 8-byte SipHash-2-4 tag over those
//! payloads, the whole thing Brotli-compressed and fed to the cipher stream.
//! Files are located purely by almanac metadata; the block is the unit of
//! authentication and of random-access decryption.
//!
//! The encoder seals the open block and starts a new one when the
//! accumulated raw size reaches [`BLOCK_TARGET_SIZE`] or the file count
//! reaches [`BLOCK_MAX_FILES`]. The boundary is checked only *before* a file
//! is added, so a single oversized file occupies one oversized block.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::keys::KeySchedule;

/// Soft raw-byte target for one compression block: 1 MiB.
pub const BLOCK_TARGET_SIZE: u64 = 1 << 20;
/// Maximum number of files in one compression block.
pub const BLOCK_MAX_FILES: usize = 200;
/// Byte length of the SipHash tag closing each block and the almanac.
pub const BLOCK_MAC_LEN: usize = 8;

/// Brotli quality used for every block. Format default.
pub const BROTLI_QUALITY: u32 = 6;
/// Brotli window size (log2).
pub const BROTLI_LGWIN: u32 = 22;

const BROTLI_BUFFER: usize = 4096;

/// Brotli-compress `data` in one shot. The compressor is dropped inside the
/// scope so the stream's terminal block is written before the buffer is used.
pub(crate) fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut w = brotli::CompressorWriter::new(&mut out, BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_LGWIN);
        w.write_all(data)?;
    }
    Ok(out)
}

/// Decompress one block's exact compressed byte span.
pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, BROTLI_BUFFER)
        .read_to_end(&mut out)
        .map_err(|e| Error::DecompressionFailure(e.to_string()))?;
    Ok(out)
}

/// Split a decompressed block into payload bytes and tag, verifying the tag.
pub(crate) fn verify<'a>(plain: &'a [u8], keys: &KeySchedule) -> Result<&'a [u8]> {
    if plain.len() < BLOCK_MAC_LEN {
        return Err(Error::IntegrityFailed("compression block"));
    }
    let (payload, tag) = plain.split_at(plain.len() - BLOCK_MAC_LEN);
    if keys.block_tag(payload) != <[u8; BLOCK_MAC_LEN]>::try_from(tag).unwrap() {
        return Err(Error::IntegrityFailed("compression block"));
    }
    Ok(payload)
}

/// The encoder's open block: raw payloads accumulated until sealing.
pub(crate) struct BlockBuilder {
    buf: Vec<u8>,
    files: usize,
    /// Body cursor at which this block's compressed bytes begin.
    offset: u64,
}

impl BlockBuilder {
    pub(crate) fn new(offset: u64) -> Self {
        Self { buf: Vec::new(), files: 0, offset }
    }

    #[inline]
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub(crate) fn file_count(&self) -> usize {
        self.files
    }

    /// Whether the block must be sealed before another file is added.
    pub(crate) fn is_full(&self) -> bool {
        self.buf.len() as u64 >= BLOCK_TARGET_SIZE || self.files >= BLOCK_MAX_FILES
    }

    /// Append one file's raw bytes, returning how many were read.
    pub(crate) fn absorb<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<u64> {
        let n = io::copy(reader, &mut self.buf)?;
        self.files += 1;
        Ok(n)
    }

    /// Tag the accumulated payloads and compress payloads ‖ tag.
    pub(crate) fn seal(mut self, keys: &KeySchedule) -> io::Result<Vec<u8>> {
        let tag = keys.block_tag(&self.buf);
        self.buf.extend_from_slice(&tag);
        compress(&self.buf)
    }
}
