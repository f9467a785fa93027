//! Archive encoder — one forward pass, sealed by [`Encoder::close`].
//!
//! # On-disk layout produced
//!
//! ```text
//! [salt (16)] [iv (16)]
//! [body: AES-256-CTR ciphertext, multiple of 16 bytes]
//! [body HMAC-SHA-512 (64)]
//! ```
//!
//! The body carries the compression blocks, then the almanac's own
//! compression block, then the 8-byte big-endian almanac offset and PKCS
//! padding to the next cipher-block boundary. Everything in the body flows
//! through [`CipherWriter`], so the trailer HMAC authenticates the exact
//! ciphertext on disk (Encrypt-then-MAC).
//!
//! Dropping an encoder without calling `close` leaves a truncated archive
//! with no valid trailer; it must be discarded.

use rand::rngs::OsRng;
use rand::RngCore;
use std::io::{Read, Write};

use crate::almanac::{Almanac, FileEntry};
use crate::block::{self, BlockBuilder};
use crate::cipher::{CipherWriter, CIPHER_BLOCK_LEN};
use crate::error::{Error, Result};
use crate::keys::{KeySchedule, SALT_LEN};
use crate::names::validate_name;
use crate::padding::pad;

pub struct Encoder<W: Write> {
    stream: CipherWriter<W>,
    keys: KeySchedule,
    open_block: BlockBuilder,
    index: Vec<FileEntry>,
    note: Vec<u8>,
    closed: bool,
}

impl<W: Write> Encoder<W> {
    /// Create an encoder over `sink`: generate salt and IV, write both,
    /// derive the key schedule, and open the cipher stream and first block.
    pub fn new(mut sink: W, passphrase: &[u8]) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; CIPHER_BLOCK_LEN];
        OsRng.fill_bytes(&mut iv);

        sink.write_all(&salt)?;
        sink.write_all(&iv)?;

        let keys = KeySchedule::derive(passphrase, &salt)?;
        let stream = CipherWriter::new(sink, &keys, &iv);

        Ok(Self {
            stream,
            keys,
            open_block: BlockBuilder::new(0),
            index: Vec::new(),
            note: Vec::new(),
            closed: false,
        })
    }

    /// Append a file to the archive, returning the bytes copied from
    /// `reader`. Seals the open compression block first when it is full.
    ///
    /// The name must be a valid relative path; on `InvalidName` the archive
    /// state is untouched.
    pub fn add<R: Read + ?Sized>(&mut self, name: &str, modified: u64, reader: &mut R) -> Result<u64> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        if name.len() > u16::MAX as usize || !validate_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }

        if self.open_block.is_full() {
            self.seal_open_block()?;
        }

        let size = self.open_block.absorb(reader)?;
        self.index.push(FileEntry {
            name: name.to_owned(),
            modified,
            size,
            block_offset: self.open_block.offset(),
        });

        Ok(size)
    }

    /// Set the opaque note carried in the almanac. At most 65535 bytes.
    pub fn set_note(&mut self, note: impl Into<Vec<u8>>) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        let note = note.into();
        if note.len() > u16::MAX as usize {
            return Err(Error::NoteTooLarge);
        }
        self.note = note;
        Ok(())
    }

    /// Files added so far, in insertion order.
    pub fn file_count(&self) -> usize {
        self.index.len()
    }

    /// Seal the final compression block, write the almanac, pad the body and
    /// append the trailer HMAC. Further calls return [`Error::AlreadyClosed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        self.closed = true;

        // The last block is sealed regardless of size, even when empty.
        self.seal_open_block()?;

        let almanac_offset = self.stream.position();
        let almanac = Almanac {
            files: std::mem::take(&mut self.index),
            note: std::mem::take(&mut self.note),
        };
        let compressed = block::compress(&almanac.to_bytes(&self.keys))?;
        self.stream.write_all(&compressed)?;

        self.stream.write_all(&almanac_offset.to_be_bytes())?;

        let padding = pad(self.stream.position(), CIPHER_BLOCK_LEN as u8);
        self.stream.write_all(&padding)?;

        let mac = self.stream.finalize_mac();
        self.stream.sink_mut().write_all(&mac)?;
        self.stream.flush()?;

        log::debug!(
            "sealed archive: {} file(s), body {} B, almanac at {}",
            almanac.files.len(),
            self.stream.position(),
            almanac_offset,
        );

        Ok(())
    }

    fn seal_open_block(&mut self) -> Result<()> {
        let sealed = std::mem::replace(&mut self.open_block, BlockBuilder::new(0));
        log::trace!(
            "sealing compression block at {} ({} file(s))",
            sealed.offset(),
            sealed.file_count(),
        );

        let compressed = sealed.seal(&self.keys)?;
        self.stream.write_all(&compressed)?;

        // The next block begins where the sealed one's compressed bytes end.
        self.open_block = BlockBuilder::new(self.stream.position());
        Ok(())
    }
}
