//! SHA-1 helpers and the hash block capability used by decrypted partition reads.

use sha1::{Digest, Sha1};

use crate::{
    io::{header::HASHES_SIZE, HashBytes},
    Error, Result,
};

/// Hashes a byte slice with SHA-1.
#[inline]
pub fn hash_bytes(buf: &[u8]) -> HashBytes {
    let mut hasher = Sha1::new();
    hasher.update(buf);
    hasher.finalize().into()
}

pub(crate) fn verify_hash(buf: &[u8], expected: &HashBytes, what: &'static str) -> Result<()> {
    let out = hash_bytes(buf);
    if out != *expected {
        let mut got_bytes = [0u8; 40];
        // Both buffers fit a 20-byte hash
        let got = base16ct::lower::encode_str(&out, &mut got_bytes).unwrap();
        let mut expected_bytes = [0u8; 40];
        let expected = base16ct::lower::encode_str(expected, &mut expected_bytes).unwrap();
        return Err(Error::HashMismatch {
            what,
            got: got.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Supplies the hash block (the first 0x400 bytes) of Wii partition sectors.
///
/// WIA archives store partition sectors with their hash blocks removed. Decrypted reads rebuild
/// each 64-sector hash group by asking the source for its hash blocks, then overwrite them with
/// the archive's stored hash exceptions.
pub trait HashBlockSource {
    /// Fills `hash_blocks` for consecutive sectors of one hash group.
    ///
    /// `first_sector` is the index of the first sector, relative to the start of the partition's
    /// data. `data` holds 0x7C00 bytes of sector data per sector and `hash_blocks` holds 0x400
    /// bytes per sector. A hash group at the end of a partition may contain fewer than 64 sectors.
    fn fill_hash_blocks(
        &mut self,
        first_sector: u32,
        data: &[u8],
        hash_blocks: &mut [u8],
    ) -> Result<()>;
}

/// A [`HashBlockSource`] producing all-zero hash blocks.
///
/// With this source, decrypted reads contain only the hash bytes stored as exceptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroHashBlocks;

impl HashBlockSource for ZeroHashBlocks {
    #[inline]
    fn fill_hash_blocks(
        &mut self,
        _first_sector: u32,
        _data: &[u8],
        hash_blocks: &mut [u8],
    ) -> Result<()> {
        debug_assert_eq!(hash_blocks.len() % HASHES_SIZE, 0);
        hash_blocks.fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes() {
        assert_eq!(hash_bytes(b"abc"), [
            0xA9, 0x99, 0x3E, 0x36, 0x47, 0x06, 0x81, 0x6A, 0xBA, 0x3E, 0x25, 0x71, 0x78, 0x50,
            0xC2, 0x6C, 0x9C, 0xD0, 0xD8, 0x9D
        ]);
    }

    #[test]
    fn test_verify_hash() {
        let expected = hash_bytes(b"abc");
        assert!(verify_hash(b"abc", &expected, "test").is_ok());
        match verify_hash(b"abd", &expected, "test") {
            Err(Error::HashMismatch { what, expected, .. }) => {
                assert_eq!(what, "test");
                assert_eq!(expected, "a9993e364706816aba3e25717850c26c9cd0d89d");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_hash_blocks() {
        let mut blocks = vec![0xFFu8; HASHES_SIZE * 2];
        ZeroHashBlocks.fill_hash_blocks(0, &[], &mut blocks).unwrap();
        assert!(blocks.iter().all(|&b| b == 0));
    }
}
