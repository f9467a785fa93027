//! PKCS#5/#7 padding over arbitrary byte counts.
//!
//! The body of an archive must end on a cipher-block boundary, so the encoder
//! appends `n` bytes of value `n` where `n = block_size - (len % block_size)`.
//! `n` is never zero: an already-aligned stream receives a full block of
//! padding. Block sizes are limited to `1..=255` because the pad value must
//! fit in one byte.

/// Padding bytes required to align a stream of `actual` bytes to
/// `block_size`. Always returns between 1 and `block_size` bytes.
pub fn pad(actual: u64, block_size: u8) -> Vec<u8> {
    debug_assert!(block_size >= 1, "block_size must be in 1..=255");
    let n = u64::from(block_size) - (actual % u64::from(block_size));
    vec![n as u8; n as usize]
}

/// Strip PKCS padding from `buf`, returning the unpadded prefix.
///
/// Returns `None` when the padding is malformed: a pad value of zero, a pad
/// value longer than the buffer, or any padding byte not equal to the pad
/// value.
pub fn unpad(buf: &[u8]) -> Option<&[u8]> {
    let n = *buf.last()? as usize;
    if n == 0 || n > buf.len() {
        return None;
    }
    let (head, padding) = buf.split_at(buf.len() - n);
    padding.iter().all(|&b| b as usize == n).then_some(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let plain = b"This is my message";
        let mut padded = plain.to_vec();
        padded.extend_from_slice(&pad(plain.len() as u64, 16));

        assert_eq!(padded.len() % 16, 0);
        assert_eq!(unpad(&padded), Some(&plain[..]));
    }

    #[test]
    fn aligned_input_gets_full_block() {
        let padding = pad(32, 16);
        assert_eq!(padding, vec![16u8; 16]);
    }

    #[test]
    fn rejects_inconsistent_padding() {
        assert_eq!(unpad(&[1, 2, 3, 9, 4, 4, 4, 4][..]), Some(&[1u8, 2, 3, 9][..]));
        // Same claim of 4 padding bytes, but one of them is not 0x04.
        assert_eq!(unpad(&[1, 2, 3, 9, 4, 3, 4, 4][..]), None);
    }

    #[test]
    fn rejects_zero_and_oversized_pad_values() {
        assert_eq!(unpad(&[1, 2, 0][..]), None);
        assert_eq!(unpad(&[5, 5][..]), None);
        assert_eq!(unpad(&[][..]), None);
    }

    proptest! {
        #[test]
        fn pad_then_unpad_is_identity(
            plain in proptest::collection::vec(any::<u8>(), 0..512),
            block_size in 1u8..=255,
        ) {
            let mut padded = plain.clone();
            padded.extend_from_slice(&pad(plain.len() as u64, block_size));

            prop_assert_eq!(padded.len() % block_size as usize, 0);
            prop_assert_eq!(unpad(&padded), Some(&plain[..]));
        }
    }
}
