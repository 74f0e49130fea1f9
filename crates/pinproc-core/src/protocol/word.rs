//! Word <-> byte conversion for the wire.
//!
//! Every word travels most-significant byte first, independent of the host's
//! native byte order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Serialize words into their wire bytes.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = vec![0u8; words.len() * 4];
    BigEndian::write_u32_into(words, &mut bytes);
    bytes
}

/// Reassemble wire bytes into words. Trailing bytes that do not make a whole
/// word are ignored.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    let whole = bytes.len() / 4 * 4;
    let mut words = vec![0u32; whole / 4];
    BigEndian::read_u32_into(&bytes[..whole], &mut words);
    words
}

/// Interpret a host-packed dot buffer as words.
///
/// Dot buffers are produced by image code that writes 32-bit words in
/// little-endian memory order, so they are unpacked that way here rather
/// than with the wire order.
pub fn dots_to_words(dots: &[u8], num_words: usize) -> Vec<u32> {
    let mut words = vec![0u32; num_words];
    LittleEndian::read_u32_into(&dots[..num_words * 4], &mut words);
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first() {
        assert_eq!(words_to_bytes(&[0x11223344]), vec![0x11, 0x22, 0x33, 0x44]);
        assert_eq!(bytes_to_words(&[0xDE, 0xAD, 0xBE, 0xEF]), vec![0xDEADBEEF]);
    }

    #[test]
    fn test_partial_word_ignored() {
        let words = bytes_to_words(&[0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF]);
        assert_eq!(words, vec![1]);
    }

    #[test]
    fn test_dots_little_endian() {
        let dots = [0x01, 0x00, 0x00, 0x80, 0xFF, 0x00, 0x00, 0x00];
        assert_eq!(dots_to_words(&dots, 2), vec![0x80000001, 0x000000FF]);
    }
}
