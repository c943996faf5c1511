//! Tile codec: one geographic cell of the routing graph
//!
//! A tile is built as a [`MicroCache`], persisted by [`encode_tile`] into a
//! single statistically compressed stream and restored by [`decode_tile`].
//!
//! Persisted layout:
//!
//! ```text
//! u32     magic "BTIL"
//! section major = origin scheme (1 legacy, 2 interleaved), minor 1
//!         origin parameters
//!         density window depth
//!         node positions (sorted-unique local ids)
//!         node tag dictionary, way tag dictionary (Huffman)
//!         external target offset headers (two-pass lon, lat)
//!         net body size in bits
//!         node bodies
//! u64     CRC-64 of the section bytes
//! ```

use std::io::Write;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

pub mod decode;
pub mod encode;
pub(crate) mod estimator;
pub mod file;
pub mod matcher;
pub mod microcache;
pub mod model;
pub mod origin;

pub use decode::{decode_tile, decode_tile_with, DecodeOptions, DecodedTile};
pub use encode::{encode_tile, encode_tile_with_report, EncodeReport};
pub use file::TileFile;
pub use matcher::{ProximityMatcher, Waypoint, WaypointMatch, WaypointMatcher};
pub use microcache::MicroCache;
pub use model::{global_id, split_id, Link, ShapePoint, TagDescription, TileNode, TurnRestriction};
pub use origin::{OriginScheme, TileOrigin};

/// "BTIL" in little-endian byte order
pub const TILE_MAGIC: u32 = 0x4C49_5442;

/// Minor version written into every tile section
pub const TILE_FORMAT_MINOR: u64 = 1;

/// Huffman leaf payload for tag descriptions
pub(crate) fn write_tag_payload<W: Write>(writer: &mut BitWriter<W>, tags: &TagDescription) -> Result<()> {
    writer.encode_exp_golomb(tags.len() as u64)?;
    for &b in tags.as_bytes() {
        writer.write_bits(8, b as u64)?;
    }
    Ok(())
}

pub(crate) fn read_tag_payload(reader: &mut BitReader<'_>) -> Result<TagDescription> {
    let position = reader.bit_position();
    let len = reader.decode_exp_golomb()?;
    if len > reader.remaining_bits() / 8 {
        return Err(CodecError::framing(
            position,
            format!("tag description of {len} bytes exceeds the section"),
        ));
    }
    let bytes = (0..len)
        .map(|_| reader.read_bits(8).map(|b| b as u8))
        .collect::<Result<Vec<u8>>>()?;
    Ok(TagDescription::new(bytes))
}
