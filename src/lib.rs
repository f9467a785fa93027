//! # zar — authenticated, encrypted, compressed archive format
//!
//! A zar archive packs named, timestamped byte streams into a single file:
//! files are grouped into Brotli compression blocks, the concatenated result
//! is encrypted as one AES-256-CTR stream, and the whole ciphertext body is
//! authenticated with HMAC-SHA-512 (Encrypt-then-MAC). A trailing almanac
//! records the file table so a reader can locate any file without decrypting
//! the archive front to back.
//!
//! Format guarantees (frozen):
//! - Layout is `[salt 16][iv 16][body][HMAC-SHA-512 64]`; the body is a
//!   multiple of the 16-byte cipher block
//! - All multi-byte integers on the wire are big-endian; never negotiated
//! - Primitives are fixed: Argon2id(1, 20 KiB, 1) → HKDF-SHA-512 subkeys,
//!   AES-256-CTR, HMAC-SHA-512 over ciphertext, SipHash-2-4 per block, Brotli
//! - Every compression block carries its own SipHash tag over the plaintext
//!   payloads; the almanac carries one over the serialized table
//! - The almanac is the body's final compression block, located via an
//!   8-byte offset recovered from under the PKCS padding at the body's end
//! - Decoders verify the body HMAC before trusting any byte, and never write
//!   a file whose block tag has not verified
//! - Archives are written in one forward pass and sealed by `close`; there
//!   is no random-access writing or in-place update
//!
//! ```no_run
//! use zar::{Decoder, Encoder};
//!
//! // Write
//! let mut out = Vec::new();
//! let mut enc = Encoder::new(&mut out, b"password123")?;
//! enc.add("readme.txt", 0, &mut &b"Hello, world!"[..])?;
//! enc.close()?;
//! drop(enc);
//!
//! // Read
//! let mut dec = Decoder::new(out.as_slice(), b"password123", out.len() as u64)?;
//! dec.extract("./unpacked")?;
//! # Ok::<(), zar::Error>(())
//! ```

pub mod almanac;
pub mod block;
pub mod cipher;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod header;
pub mod keys;
pub mod names;
pub mod padding;
pub mod source;

// Flat re-exports for the most common types.
pub use almanac::{cipher_rows, Almanac, FileEntry};
pub use block::{BLOCK_MAC_LEN, BLOCK_MAX_FILES, BLOCK_TARGET_SIZE};
pub use cipher::{BODY_MAC_LEN, CIPHER_BLOCK_LEN};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use header::Header;
pub use keys::{KeySchedule, SALT_LEN};
pub use names::validate_name;
pub use source::ReadAt;
