//! Splitting outbound payloads into transport-sized chunks.
//!
//! # Why chunk at all? (for beginners)
//!
//! A BLE characteristic write carries at most `ATT_MTU - 3` bytes.  The
//! default MTU is 23, which leaves 20 bytes of payload per write.  Some
//! stacks negotiate a larger MTU, but the Typist firmware ingests its UART
//! buffer in 20-byte units regardless, so the client always writes 20-byte
//! chunks.
//!
//! Chunks are plain byte slices.  A multi-byte UTF-8 character may be split
//! across two chunks; the peripheral reassembles the byte stream before
//! decoding, so the split point does not matter.

/// Maximum number of bytes written to the outbound channel in one operation.
pub const CHUNK_SIZE: usize = 20;

/// Splits `payload` into consecutive slices of at most `chunk_size` bytes.
///
/// An empty payload yields no chunks.  A `chunk_size` of zero is treated as
/// [`CHUNK_SIZE`] so the iterator can never loop forever.
///
/// # Examples
///
/// ```rust
/// use typist_core::protocol::chunk::chunk_payload;
///
/// let chunks: Vec<&[u8]> = chunk_payload(b"hello world", 4).collect();
/// assert_eq!(chunks, vec![&b"hell"[..], b"o wo", b"rld"]);
/// ```
pub fn chunk_payload(payload: &[u8], chunk_size: usize) -> std::slice::Chunks<'_, u8> {
    let size = if chunk_size == 0 { CHUNK_SIZE } else { chunk_size };
    payload.chunks(size)
}

/// Returns how many chunks `payload_len` bytes occupy at `chunk_size`.
pub fn chunk_count(payload_len: usize, chunk_size: usize) -> usize {
    let size = if chunk_size == 0 { CHUNK_SIZE } else { chunk_size };
    payload_len.div_ceil(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_concatenate_back_to_payload() {
        // Arrange: every length from empty to several chunks plus a remainder
        for len in 0..=(CHUNK_SIZE * 4 + 7) {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            // Act
            let rebuilt: Vec<u8> = chunk_payload(&payload, CHUNK_SIZE)
                .flat_map(|c| c.iter().copied())
                .collect();

            // Assert
            assert_eq!(rebuilt, payload, "round trip failed for length {len}");
        }
    }

    #[test]
    fn test_no_chunk_exceeds_ceiling() {
        let payload = vec![0xAAu8; 95];
        assert!(chunk_payload(&payload, CHUNK_SIZE).all(|c| c.len() <= CHUNK_SIZE));
    }

    #[test]
    fn test_only_last_chunk_is_short() {
        // Arrange
        let payload = vec![1u8; 45];

        // Act
        let lens: Vec<usize> = chunk_payload(&payload, CHUNK_SIZE).map(<[u8]>::len).collect();

        // Assert
        assert_eq!(lens, vec![20, 20, 5]);
    }

    #[test]
    fn test_empty_payload_yields_no_chunks() {
        assert_eq!(chunk_payload(&[], CHUNK_SIZE).count(), 0);
        assert_eq!(chunk_count(0, CHUNK_SIZE), 0);
    }

    #[test]
    fn test_multibyte_text_survives_split() {
        // "é" is two bytes; 15 of them straddle the 20-byte boundary.
        let text = "é".repeat(15);
        let rebuilt: Vec<u8> = chunk_payload(text.as_bytes(), CHUNK_SIZE)
            .flat_map(|c| c.to_vec())
            .collect();
        assert_eq!(String::from_utf8(rebuilt).unwrap(), text);
    }

    #[test]
    fn test_zero_chunk_size_falls_back_to_default() {
        let payload = vec![0u8; 41];
        assert_eq!(chunk_payload(&payload, 0).count(), 3);
        assert_eq!(chunk_count(41, 0), 3);
    }

    #[test]
    fn test_chunk_count_matches_iterator() {
        for len in [1, 19, 20, 21, 40, 99] {
            let payload = vec![0u8; len];
            assert_eq!(
                chunk_count(len, CHUNK_SIZE),
                chunk_payload(&payload, CHUNK_SIZE).count()
            );
        }
    }
}
