// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pluggable entry checksums.
//!
//! The entry codec treats the checksum as an injected capability: any
//! deterministic digest of at most [`MAX_CHECKSUM_LENGTH`] bytes works.
//! The width of the on-flash checksum field equals the digest size, so
//! every store reading a partition must be constructed with the same
//! algorithm that wrote it.

use crc::{Crc, Digest, CRC_16_IBM_3740, CRC_32_ISO_HDLC};

/// Largest digest the entry header can carry.
pub const MAX_CHECKSUM_LENGTH: usize = 16;

/// Streaming digest used to protect entries at rest.
pub trait Checksum {
    /// Digest width in bytes; at most [`MAX_CHECKSUM_LENGTH`]. Must be
    /// constant for the life of the value.
    fn size(&self) -> usize;

    /// Discards any accumulated state.
    fn reset(&mut self);

    /// Feeds `bytes` into the digest.
    fn update(&mut self, bytes: &[u8]);

    /// Writes the digest into `out[..self.size()]` and resets the state.
    fn finish(&mut self, out: &mut [u8]);
}

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Default checksum: CRC-16/IBM-3740 (CCITT-FALSE), stored little-endian.
pub struct Crc16Checksum {
    digest: Digest<'static, u16>,
}

impl Crc16Checksum {
    pub fn new() -> Self {
        Self { digest: CRC16.digest() }
    }
}

impl Default for Crc16Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum for Crc16Checksum {
    fn size(&self) -> usize {
        2
    }

    fn reset(&mut self) {
        self.digest = CRC16.digest();
    }

    fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    fn finish(&mut self, out: &mut [u8]) {
        let digest = core::mem::replace(&mut self.digest, CRC16.digest());
        out[..2].copy_from_slice(&digest.finalize().to_le_bytes());
    }
}

/// CRC-32/ISO-HDLC, for deployments that want a longer check word.
pub struct Crc32Checksum {
    digest: Digest<'static, u32>,
}

impl Crc32Checksum {
    pub fn new() -> Self {
        Self { digest: CRC32.digest() }
    }
}

impl Default for Crc32Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum for Crc32Checksum {
    fn size(&self) -> usize {
        4
    }

    fn reset(&mut self) {
        self.digest = CRC32.digest();
    }

    fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    fn finish(&mut self, out: &mut [u8]) {
        let digest = core::mem::replace(&mut self.digest, CRC32.digest());
        out[..4].copy_from_slice(&digest.finalize().to_le_bytes());
    }
}

/// Zero-width checksum. Entries carry no check word and any plausible
/// header is accepted, which weakens the integrity guarantee to "magic
/// and length fields look sane". Intended for tests.
#[derive(Default)]
pub struct NullChecksum;

impl Checksum for NullChecksum {
    fn size(&self) -> usize {
        0
    }

    fn reset(&mut self) {}

    fn update(&mut self, _bytes: &[u8]) {}

    fn finish(&mut self, _out: &mut [u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_check_value() {
        // CRC-16/IBM-3740 of "123456789" is 0x29B1.
        let mut c = Crc16Checksum::new();
        c.update(b"123456789");
        let mut out = [0u8; MAX_CHECKSUM_LENGTH];
        c.finish(&mut out);
        assert_eq!(&out[..2], &0x29B1u16.to_le_bytes());
    }

    #[test]
    fn crc32_check_value() {
        // CRC-32/ISO-HDLC of "123456789" is 0xCBF43926.
        let mut c = Crc32Checksum::new();
        c.update(b"123456789");
        let mut out = [0u8; MAX_CHECKSUM_LENGTH];
        c.finish(&mut out);
        assert_eq!(&out[..4], &0xCBF43926u32.to_le_bytes());
    }

    #[test]
    fn finish_resets_state() {
        let mut c = Crc16Checksum::new();
        c.update(b"123456789");
        let mut first = [0u8; 2];
        c.finish(&mut first);

        c.update(b"123456789");
        let mut second = [0u8; 2];
        c.finish(&mut second);

        assert_eq!(first, second);
    }

    #[test]
    fn split_updates_match_single_update() {
        let mut whole = Crc16Checksum::new();
        whole.update(b"123456789");
        let mut split = Crc16Checksum::new();
        split.update(b"1234");
        split.update(b"56789");

        let (mut a, mut b) = ([0u8; 2], [0u8; 2]);
        whole.finish(&mut a);
        split.finish(&mut b);
        assert_eq!(a, b);
    }
}
