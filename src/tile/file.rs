//! Tile persistence on disk

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use super::decode::decode_tile;
use super::encode::encode_tile;
use super::microcache::MicroCache;
use crate::config::CodecConfig;
use crate::error::Result;

pub struct TileFile;

impl TileFile {
    /// Encode `cache` and write it to `path`; returns the byte count
    pub fn write<P: AsRef<Path>>(path: P, cache: &MicroCache, config: &CodecConfig) -> Result<u64> {
        let bytes = encode_tile(cache, config)?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(bytes.len() as u64)
    }

    pub fn read<P: AsRef<Path>>(path: P, config: &CodecConfig) -> Result<MicroCache> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        decode_tile(&bytes, config)
    }
}
