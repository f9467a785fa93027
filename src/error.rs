//! Crate-wide error type.
//!
//! Every failure is surfaced to the caller; nothing is retried internally.
//! Integrity failures are terminal for a decoder — once one is observed the
//! archive (or at least the affected block) must be treated as hostile.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The body HMAC, a compression-block SipHash, the almanac SipHash, or
    /// the trailer padding did not verify.
    #[error("integrity check failed: {0}")]
    IntegrityFailed(&'static str),

    /// A positional read returned fewer bytes than requested with no error.
    #[error("short read from archive source")]
    ShortRead,

    /// A file name failed validation (absolute, traversing, or containing
    /// reserved characters). Carries the offending name.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// The archive is smaller than salt + iv + trailer, or its body span is
    /// not a multiple of the cipher block size.
    #[error("archive is truncated or misaligned")]
    TruncatedArchive,

    /// An almanac places more files into one compression block than the
    /// format allows.
    #[error("compression block exceeds the file-count cap")]
    TooManyFiles,

    /// Brotli rejected the decrypted bytes.
    #[error("decompression failed: {0}")]
    DecompressionFailure(String),

    /// The almanac note field is length-prefixed with a u16 and cannot carry
    /// more than 65535 bytes.
    #[error("note exceeds 65535 bytes")]
    NoteTooLarge,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Operation on an encoder that has already been sealed by `close`.
    #[error("archive already closed")]
    AlreadyClosed,

    /// The decoder's linear state machine does not permit this call.
    #[error("decoder is not in a usable state: {0}")]
    InvalidState(&'static str),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
