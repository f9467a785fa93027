//! AES-256-CTR stream with an HMAC tap (Encrypt-then-MAC).
//!
//! [`CipherWriter`] is the encoder's only path to the output sink: every
//! plaintext byte is XORed with the keystream, the resulting ciphertext is
//! fed to a running HMAC-SHA-512, and only then written out. Its byte
//! counter is the *body cursor* — the plaintext offset within the body, which
//! the almanac records as each compression block's `block_offset`.
//!
//! The decoder never decrypts sequentially; it jumps to 16-byte cipher rows
//! with [`keystream_xor_at`], which seeks the CTR keystream to an absolute
//! body offset. `Ctr128BE` treats the full 16-byte IV as one big-endian
//! counter, so seeking replaces the reference's bignum counter arithmetic.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;
use hmac::Mac;
use std::io::{self, Write};

use crate::keys::{HmacSha512, KeySchedule};

pub(crate) type Aes256Ctr = Ctr128BE<Aes256>;

/// Cipher block size: the unit of random-access decryption.
pub const CIPHER_BLOCK_LEN: usize = 16;
/// Byte length of the body HMAC-SHA-512 trailer.
pub const BODY_MAC_LEN: usize = 64;

pub(crate) struct CipherWriter<W: Write> {
    sink: W,
    cipher: Aes256Ctr,
    mac: HmacSha512,
    written: u64,
    scratch: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub(crate) fn new(sink: W, keys: &KeySchedule, iv: &[u8; CIPHER_BLOCK_LEN]) -> Self {
        Self {
            sink,
            cipher: Aes256Ctr::new(keys.cipher_key().into(), iv.into()),
            mac: keys.body_mac(),
            written: 0,
            scratch: Vec::new(),
        }
    }

    /// Plaintext bytes emitted so far — the body cursor.
    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.written
    }

    /// Finalize the body HMAC. Must be called after the last plaintext byte.
    pub(crate) fn finalize_mac(&mut self) -> [u8; BODY_MAC_LEN] {
        let mut tag = [0u8; BODY_MAC_LEN];
        tag.copy_from_slice(&self.mac.finalize_reset().into_bytes());
        tag
    }

    /// The underlying sink, for trailer bytes that bypass the cipher stream.
    pub(crate) fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply_keystream(&mut self.scratch);
        self.mac.update(&self.scratch);
        self.sink.write_all(&self.scratch)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// XOR `buf` with the keystream starting at absolute body offset `offset`.
///
/// Used by the decoder to turn a ciphertext row range back into plaintext
/// without touching any earlier byte of the body.
pub(crate) fn keystream_xor_at(
    keys: &KeySchedule,
    iv: &[u8; CIPHER_BLOCK_LEN],
    offset: u64,
    buf: &mut [u8],
) {
    let mut cipher = Aes256Ctr::new(keys.cipher_key().into(), iv.into());
    cipher.seek(offset);
    cipher.apply_keystream(buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeySchedule, SALT_LEN};

    fn test_keys() -> KeySchedule {
        KeySchedule::derive(b"password123", &[9u8; SALT_LEN]).unwrap()
    }

    #[test]
    fn seek_matches_sequential_encryption() {
        let keys = test_keys();
        let iv = [3u8; CIPHER_BLOCK_LEN];
        let plaintext: Vec<u8> = (0u16..512).map(|i| (i % 251) as u8).collect();

        let mut sink = Vec::new();
        let mut w = CipherWriter::new(&mut sink, &keys, &iv);
        w.write_all(&plaintext).unwrap();
        assert_eq!(w.position(), plaintext.len() as u64);
        drop(w);

        // Decrypting an interior row range recovers the matching plaintext.
        let mut chunk = sink[64..160].to_vec();
        keystream_xor_at(&keys, &iv, 64, &mut chunk);
        assert_eq!(chunk, &plaintext[64..160]);
    }

    #[test]
    fn mac_covers_ciphertext() {
        let keys = test_keys();
        let iv = [3u8; CIPHER_BLOCK_LEN];

        let mut a = CipherWriter::new(Vec::new(), &keys, &iv);
        a.write_all(b"hello world, hello world").unwrap();
        let tag_a = a.finalize_mac();

        let mut b = CipherWriter::new(Vec::new(), &keys, &iv);
        b.write_all(b"hello world, hello worle").unwrap();
        let tag_b = b.finalize_mac();

        assert_ne!(tag_a, tag_b);
    }

    #[test]
    fn split_writes_equal_one_write() {
        let keys = test_keys();
        let iv = [3u8; CIPHER_BLOCK_LEN];

        let mut whole = CipherWriter::new(Vec::new(), &keys, &iv);
        whole.write_all(b"the quick brown fox jumps").unwrap();
        let tag_whole = whole.finalize_mac();
        let out_whole = whole.sink_mut().clone();

        let mut split = CipherWriter::new(Vec::new(), &keys, &iv);
        split.write_all(b"the quick").unwrap();
        split.write_all(b" brown fox jumps").unwrap();
        let tag_split = split.finalize_mac();
        let out_split = split.sink_mut().clone();

        assert_eq!(out_whole, out_split);
        assert_eq!(tag_whole, tag_split);
    }
}
