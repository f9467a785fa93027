//! Declared negotiation header.
//!
//! The format reserves a 7-byte header for algorithm negotiation. It is
//! declared here but **never written**: current archives begin directly with
//! the salt, and every primitive is fixed (Argon2id, HKDF-SHA-512,
//! AES-256-CTR, HMAC-SHA-512, SipHash-2-4, Brotli). Emitting the header is a
//! format bump and would shift every offset by [`HEADER_LEN`].

/// Byte length of the declared header.
pub const HEADER_LEN: usize = 7;

/// Archive magic (first three header bytes).
pub const MAGIC: [u8; 3] = *b"zar";

/// Cipher-suite identifier for AES-256-CTR.
pub const CIPHER_SUITE_AES256_CTR: u8 = 1;
/// MAC identifier for HMAC-SHA-512 + SipHash-2-4.
pub const MAC_HMAC_SHA512: u8 = 1;
/// Compression identifier for Brotli.
pub const COMPRESSION_BROTLI: u8 = 1;

/// The 7-byte header a future archive version will carry before the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 3],
    pub mode: u8,
    pub cipher_suite: u8,
    pub mac: u8,
    pub compression: u8,
}

impl Header {
    /// The suite this implementation would declare.
    pub const CURRENT: Header = Header {
        magic: MAGIC,
        mode: 0,
        cipher_suite: CIPHER_SUITE_AES256_CTR,
        mac: MAC_HMAC_SHA512,
        compression: COMPRESSION_BROTLI,
    };
}
