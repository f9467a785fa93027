//! Key schedule: one passphrase, four subkeys.
//!
//! ```text
//! k1 = Argon2id(passphrase, salt, t=1, m=20 KiB, p=1, out=32)
//! k2 ‖ k3 ‖ k4 = HKDF-SHA-512(ikm=k1, salt=∅, info=∅, L=96)
//!
//! k2 → HMAC-SHA-512 over the ciphertext body (Encrypt-then-MAC)
//! k3 → SipHash-2-4 per compression block and per almanac
//! k4 → AES-256 in counter mode
//! ```
//!
//! The Argon2 parameters are format-defining: changing them changes every
//! derived key, so they stay frozen until a versioned header can carry
//! stronger ones. Subkeys are wiped from memory on drop.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use siphasher::sip::SipHasher24;
use std::hash::Hasher;
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Byte length of the KDF salt (also the AES block size).
pub const SALT_LEN: usize = 16;

/// Argon2id time cost. Format-defining.
pub const ARGON2_TIME_COST: u32 = 1;
/// Argon2id memory cost in KiB. Format-defining.
pub const ARGON2_MEMORY_KIB: u32 = 20;
/// Argon2id lane count. Format-defining.
pub const ARGON2_LANES: u32 = 1;

const SUBKEY_LEN: usize = 32;

pub(crate) type HmacSha512 = Hmac<Sha512>;

/// The three subkeys derived from a passphrase and salt.
pub struct KeySchedule {
    /// k2 — keys the body HMAC.
    body_mac_key: [u8; SUBKEY_LEN],
    /// k3 — keys the per-block and almanac SipHash.
    block_mac_key: [u8; SUBKEY_LEN],
    /// k4 — keys the AES-256-CTR stream.
    cipher_key: [u8; SUBKEY_LEN],
}

impl KeySchedule {
    /// Run the passphrase through Argon2id and expand the result into the
    /// body-MAC, block-MAC, and cipher subkeys.
    pub fn derive(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<Self> {
        let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_TIME_COST, ARGON2_LANES, Some(SUBKEY_LEN))
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut master = [0u8; SUBKEY_LEN];
        argon2
            .hash_password_into(passphrase, salt, &mut master)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        // Extract-then-expand with a zero salt and empty info; the 96-byte
        // output stream is split in derivation order.
        let hk = Hkdf::<Sha512>::new(None, &master);
        let mut okm = [0u8; 3 * SUBKEY_LEN];
        hk.expand(&[], &mut okm)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;
        master.zeroize();

        let mut keys = Self {
            body_mac_key: [0u8; SUBKEY_LEN],
            block_mac_key: [0u8; SUBKEY_LEN],
            cipher_key: [0u8; SUBKEY_LEN],
        };
        keys.body_mac_key.copy_from_slice(&okm[..32]);
        keys.block_mac_key.copy_from_slice(&okm[32..64]);
        keys.cipher_key.copy_from_slice(&okm[64..]);
        okm.zeroize();

        Ok(keys)
    }

    /// Fresh HMAC-SHA-512 instance keyed with k2.
    pub(crate) fn body_mac(&self) -> HmacSha512 {
        HmacSha512::new_from_slice(&self.body_mac_key).expect("HMAC accepts any key length")
    }

    /// Fresh SipHash-2-4 instance keyed with the first 128 bits of k3.
    pub(crate) fn block_mac(&self) -> SipHasher24 {
        let k0 = u64::from_le_bytes(self.block_mac_key[..8].try_into().unwrap());
        let k1 = u64::from_le_bytes(self.block_mac_key[8..16].try_into().unwrap());
        SipHasher24::new_with_keys(k0, k1)
    }

    /// 8-byte SipHash tag over `data`, keyed with k3.
    pub(crate) fn block_tag(&self, data: &[u8]) -> [u8; 8] {
        let mut mac = self.block_mac();
        mac.write(data);
        mac.finish().to_le_bytes()
    }

    pub(crate) fn cipher_key(&self) -> &[u8; SUBKEY_LEN] {
        &self.cipher_key
    }
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        self.body_mac_key.zeroize();
        self.block_mac_key.zeroize();
        self.cipher_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = KeySchedule::derive(b"password123", &salt).unwrap();
        let b = KeySchedule::derive(b"password123", &salt).unwrap();

        assert_eq!(a.body_mac_key, b.body_mac_key);
        assert_eq!(a.block_mac_key, b.block_mac_key);
        assert_eq!(a.cipher_key, b.cipher_key);
    }

    #[test]
    fn subkeys_are_distinct() {
        let keys = KeySchedule::derive(b"password123", &[7u8; SALT_LEN]).unwrap();
        assert_ne!(keys.body_mac_key, keys.block_mac_key);
        assert_ne!(keys.block_mac_key, keys.cipher_key);
    }

    #[test]
    fn salt_changes_every_subkey() {
        let a = KeySchedule::derive(b"password123", &[1u8; SALT_LEN]).unwrap();
        let b = KeySchedule::derive(b"password123", &[2u8; SALT_LEN]).unwrap();

        assert_ne!(a.body_mac_key, b.body_mac_key);
        assert_ne!(a.block_mac_key, b.block_mac_key);
        assert_ne!(a.cipher_key, b.cipher_key);
    }

    #[test]
    fn block_tag_is_stable_per_key() {
        let keys = KeySchedule::derive(b"password123", &[7u8; SALT_LEN]).unwrap();
        assert_eq!(keys.block_tag(b"payload"), keys.block_tag(b"payload"));
        assert_ne!(keys.block_tag(b"payload"), keys.block_tag(b"payloae"));
    }
}
