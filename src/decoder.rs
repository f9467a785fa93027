//! Archive decoder — backward almanac discovery, random-access extraction.
//!
//! The decoder walks backward from the end of the archive: the trailer HMAC
//! is verified over the whole ciphertext body first, then the final two
//! cipher rows are decrypted to recover the PKCS padding and the 8-byte
//! almanac offset, then the almanac's compression block is decrypted,
//! decompressed, and authenticated. Only after all of that does extraction
//! touch any data block — and then only the cipher rows that cover the
//! requested block's compressed span.
//!
//! # State machine
//!
//! `KeysReady → AlmanacLoaded → Extracting → Done | Failed` — linear and
//! irrevocable. (`Fresh → KeysReady` happens inside [`Decoder::new`].) Any
//! integrity failure parks the decoder in `Failed`; no file byte reaches disk
//! unless its compression block's SipHash verified.

use hmac::Mac;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::almanac::{cipher_rows, Almanac};
use crate::block;
use crate::cipher::{keystream_xor_at, BODY_MAC_LEN, CIPHER_BLOCK_LEN};
use crate::error::{Error, Result};
use crate::keys::{KeySchedule, SALT_LEN};
use crate::names::{clean, validate_name};
use crate::padding::unpad;
use crate::source::{read_at_full, ReadAt};

/// Body offset within the archive: everything after salt and IV.
const BODY_START: u64 = (SALT_LEN + CIPHER_BLOCK_LEN) as u64;
/// Chunk size for the streaming body-HMAC verification pass.
const VERIFY_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    KeysReady,
    AlmanacLoaded,
    Extracting,
    Done,
    Failed,
}

pub struct Decoder<R: ReadAt> {
    src: R,
    body_len: u64,
    salt: [u8; SALT_LEN],
    iv: [u8; CIPHER_BLOCK_LEN],
    keys: KeySchedule,
    state: State,
    almanac: Option<Almanac>,
    /// Body offset at which the almanac's compression block begins.
    almanac_offset: u64,
}

impl<R: ReadAt> Decoder<R> {
    /// Open an archive of `len` total bytes backed by a positional source.
    ///
    /// Reads salt and IV and derives the key schedule. Fails with
    /// [`Error::TruncatedArchive`] when the length cannot hold salt, IV,
    /// trailer, and at least two cipher rows, or when the body span is not a
    /// multiple of the cipher block size.
    pub fn new(src: R, passphrase: &[u8], len: u64) -> Result<Self> {
        let body_len = len
            .checked_sub(BODY_START + BODY_MAC_LEN as u64)
            .ok_or(Error::TruncatedArchive)?;
        let row = CIPHER_BLOCK_LEN as u64;
        if body_len % row != 0 || body_len < 2 * row {
            return Err(Error::TruncatedArchive);
        }

        let mut salt = [0u8; SALT_LEN];
        read_at_full(&src, 0, &mut salt)?;
        let mut iv = [0u8; CIPHER_BLOCK_LEN];
        read_at_full(&src, SALT_LEN as u64, &mut iv)?;

        let keys = KeySchedule::derive(passphrase, &salt)?;

        Ok(Self {
            src,
            body_len,
            salt,
            iv,
            keys,
            state: State::KeysReady,
            almanac: None,
            almanac_offset: 0,
        })
    }

    /// KDF salt read from the archive head.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// CTR IV read from the archive head.
    pub fn iv(&self) -> &[u8; CIPHER_BLOCK_LEN] {
        &self.iv
    }

    /// Ciphertext body length in bytes.
    pub fn body_len(&self) -> u64 {
        self.body_len
    }

    /// Verify the body and load the file table without extracting anything.
    ///
    /// Idempotent once loaded; terminal after a failure.
    pub fn read_almanac(&mut self) -> Result<&Almanac> {
        match self.state {
            State::KeysReady => self.load_almanac()?,
            State::AlmanacLoaded | State::Done => {}
            State::Extracting | State::Failed => {
                return Err(Error::InvalidState("decoder previously failed"));
            }
        }
        Ok(self.almanac.as_ref().expect("almanac present after load"))
    }

    /// Extract every file into `output_root`, creating directories as needed.
    ///
    /// All names are validated before anything is materialized. Files are
    /// written block by block; a block's bytes reach disk only after its
    /// SipHash tag verifies.
    pub fn extract<P: AsRef<Path>>(&mut self, output_root: P) -> Result<()> {
        match self.state {
            State::KeysReady => self.load_almanac()?,
            State::AlmanacLoaded => {}
            State::Done => return Err(Error::InvalidState("extraction already completed")),
            State::Extracting | State::Failed => {
                return Err(Error::InvalidState("decoder previously failed"));
            }
        }

        self.state = State::Extracting;
        match self.extract_files(output_root.as_ref()) {
            Ok(()) => {
                self.state = State::Done;
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    // ── Almanac discovery ────────────────────────────────────────────────────

    fn load_almanac(&mut self) -> Result<()> {
        match self.locate_and_parse() {
            Ok((offset, almanac)) => {
                log::debug!(
                    "almanac verified: {} file(s), offset {}, body {} B",
                    almanac.files.len(),
                    offset,
                    self.body_len,
                );
                self.almanac_offset = offset;
                self.almanac = Some(almanac);
                self.state = State::AlmanacLoaded;
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn locate_and_parse(&self) -> Result<(u64, Almanac)> {
        self.verify_body_mac()?;

        let row = CIPHER_BLOCK_LEN as u64;
        let rows = self.body_len / row;

        // The final two cipher rows hold the almanac offset and the padding.
        let mut tail = [0u8; 2 * CIPHER_BLOCK_LEN];
        self.decrypt_rows(rows - 2, rows, &mut tail)?;

        let unpadded = unpad(&tail).ok_or(Error::IntegrityFailed("padding"))?;
        let trailing = (tail.len() - unpadded.len() + 8) as u64;
        if unpadded.len() < 8 {
            return Err(Error::IntegrityFailed("almanac offset"));
        }
        let almanac_offset = u64::from_be_bytes(unpadded[unpadded.len() - 8..].try_into().unwrap());

        // The almanac block must occupy a non-empty span before the trailer.
        let almanac_end = self
            .body_len
            .checked_sub(trailing)
            .ok_or(Error::IntegrityFailed("almanac offset"))?;
        if almanac_offset >= almanac_end {
            return Err(Error::IntegrityFailed("almanac offset"));
        }

        // Decrypt from the row containing the almanac start to the body end,
        // then trim the lead bytes belonging to the previous block and the
        // trailing offset + padding.
        let first_row = almanac_offset / row;
        let mut scratch = vec![0u8; ((rows - first_row) * row) as usize];
        self.decrypt_rows(first_row, rows, &mut scratch)?;

        let lead = (almanac_offset % row) as usize;
        let end = scratch.len() - trailing as usize;
        let plain = block::decompress(&scratch[lead..end])?;

        let almanac = Almanac::from_bytes(&plain, &self.keys)?;
        almanac.check(almanac_offset)?;

        Ok((almanac_offset, almanac))
    }

    /// Stream the whole ciphertext body through HMAC-SHA-512 and compare the
    /// trailer in constant time. Nothing in the archive is trusted before
    /// this passes.
    fn verify_body_mac(&self) -> Result<()> {
        let mut mac = self.keys.body_mac();
        let mut buf = vec![0u8; VERIFY_CHUNK];

        let mut offset = BODY_START;
        let mut remaining = self.body_len;
        while remaining > 0 {
            let n = remaining.min(VERIFY_CHUNK as u64) as usize;
            read_at_full(&self.src, offset, &mut buf[..n])?;
            mac.update(&buf[..n]);
            offset += n as u64;
            remaining -= n as u64;
        }

        let mut trailer = [0u8; BODY_MAC_LEN];
        read_at_full(&self.src, BODY_START + self.body_len, &mut trailer)?;

        mac.verify_slice(&trailer)
            .map_err(|_| Error::IntegrityFailed("body"))
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    fn extract_files(&self, root: &Path) -> Result<()> {
        let almanac = self.almanac.as_ref().expect("almanac present after load");

        // Reject every bad name before a single byte is materialized.
        for file in &almanac.files {
            if !validate_name(&file.name) {
                return Err(Error::InvalidName(file.name.clone()));
            }
        }

        // Files sharing a block are sliced out of one cached decode.
        let mut cached: Option<(u64, Vec<u8>)> = None;

        for (i, file) in almanac.files.iter().enumerate() {
            let path = materialize_path(root, &file.name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            if file.size == 0 {
                File::create(&path)?;
                continue;
            }

            let (start, span) = almanac.block_span(i, self.almanac_offset);
            if cached.as_ref().map(|(offset, _)| *offset) != Some(start) {
                cached = Some((start, self.load_block(start, span)?));
            }
            let payload = &cached.as_ref().expect("block cached above").1;

            let from = almanac.start_within_block(i);
            let to = from
                .checked_add(file.size)
                .filter(|&to| to <= payload.len() as u64)
                .ok_or(Error::IntegrityFailed("almanac"))?;
            File::create(&path)?.write_all(&payload[from as usize..to as usize])?;
            log::trace!("extracted {} ({} B)", file.name, file.size);
        }

        Ok(())
    }

    /// Decrypt, decompress, and authenticate one compression block given its
    /// compressed `(start, span)` within the body. Only the cipher rows
    /// covering the span are touched.
    fn load_block(&self, start: u64, span: u64) -> Result<Vec<u8>> {
        let (lo, hi) = cipher_rows(start, span);
        let mut buf = vec![0u8; ((hi - lo) * CIPHER_BLOCK_LEN as u64) as usize];
        self.decrypt_rows(lo, hi, &mut buf)?;

        let lead = (start - lo * CIPHER_BLOCK_LEN as u64) as usize;
        let plain = block::decompress(&buf[lead..lead + span as usize])?;
        let payload = block::verify(&plain, &self.keys)?;
        Ok(payload.to_vec())
    }

    /// Decrypt cipher rows `[lo, hi)` into `buf`.
    fn decrypt_rows(&self, lo: u64, hi: u64, buf: &mut [u8]) -> Result<()> {
        let row = CIPHER_BLOCK_LEN as u64;
        debug_assert_eq!(buf.len() as u64, (hi - lo) * row);

        read_at_full(&self.src, BODY_START + lo * row, buf)?;
        keystream_xor_at(&self.keys, &self.iv, lo * row, buf);
        Ok(())
    }
}

/// Join a validated entry name onto the output root, component by component.
fn materialize_path(root: &Path, name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in clean(name).split('/') {
        if !component.is_empty() {
            path.push(component);
        }
    }
    path
}
