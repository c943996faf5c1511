//! CRC-64 accumulator for checksummed stream sections

use crc::{Crc, CRC_64_GO_ISO};

/// CRC-64 (GO-ISO polynomial) shared by tile writers and readers
pub const TILE_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Checksum of a complete byte range
pub fn checksum(data: &[u8]) -> u64 {
    TILE_CRC.checksum(data)
}

/// Running checksum fed byte by byte while a writer emits data
#[derive(Clone)]
pub struct SectionCrc {
    digest: crc::Digest<'static, u64>,
    len: u64,
}

impl SectionCrc {
    pub fn new() -> Self {
        Self {
            digest: TILE_CRC.digest(),
            len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes covered so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for SectionCrc {
    fn default() -> Self {
        Self::new()
    }
}
