//! Mapping between global node ids and tile-local 32-bit ids
//!
//! Two schemes exist, selected by the tile format major:
//!
//! - legacy (major 1): fixed 1/80 degree cells, sixteen per 1/5 degree grid
//!   segment in each direction; local id is `dlon << 16 | dlat`
//! - interleaved (major 2): square cells of a configurable size; local id
//!   interleaves `dlon` (even bits) with `dlat` (odd bits), so nearby nodes get
//!   nearby ids
//!
//! Both are exact inverses inside the cell and refuse ids outside it.

use std::io::Write;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Edge length of a legacy cell in microdegrees (1/80 degree)
pub const LEGACY_CELL: u32 = 12_500;
/// Legacy grid segment (1/5 degree), split into 16x16 cells
pub const LEGACY_SEGMENT: u32 = 200_000;
/// Largest interleaved cell, keeping both deltas within 16 bits
pub const MAX_CELL_SIZE: u32 = 1 << 16;

pub const LEGACY_MAJOR: u64 = 1;
pub const INTERLEAVED_MAJOR: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginScheme {
    Legacy,
    Interleaved { cell_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOrigin {
    lon_base: u32,
    lat_base: u32,
    scheme: OriginScheme,
}

fn spread_bits(value: u32) -> u32 {
    let mut x = value & 0xffff;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    (x | (x << 1)) & 0x5555_5555
}

fn gather_bits(value: u32) -> u32 {
    let mut x = value & 0x5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff;
    (x | (x >> 8)) & 0x0000_ffff
}

impl TileOrigin {
    /// Legacy origin; both bases must lie on the 1/80 degree grid
    pub fn legacy(lon_base: u32, lat_base: u32) -> Result<Self> {
        if lon_base % LEGACY_CELL != 0 || lat_base % LEGACY_CELL != 0 {
            return Err(CodecError::contract(format!(
                "legacy origin ({lon_base}, {lat_base}) is not on the {LEGACY_CELL} grid"
            )));
        }
        if lon_base.checked_add(LEGACY_CELL - 1).is_none() || lat_base.checked_add(LEGACY_CELL - 1).is_none() {
            return Err(CodecError::contract("legacy origin cell exceeds the coordinate range"));
        }
        Ok(Self {
            lon_base,
            lat_base,
            scheme: OriginScheme::Legacy,
        })
    }

    pub fn interleaved(lon_base: u32, lat_base: u32, cell_size: u32) -> Result<Self> {
        if cell_size == 0 || cell_size > MAX_CELL_SIZE {
            return Err(CodecError::contract(format!(
                "cell size {cell_size} outside 1..={MAX_CELL_SIZE}"
            )));
        }
        if lon_base.checked_add(cell_size - 1).is_none() || lat_base.checked_add(cell_size - 1).is_none() {
            return Err(CodecError::contract("interleaved origin cell exceeds the coordinate range"));
        }
        Ok(Self {
            lon_base,
            lat_base,
            scheme: OriginScheme::Interleaved { cell_size },
        })
    }

    /// Legacy cell holding `id`
    pub fn legacy_containing(id: u64) -> Result<Self> {
        let (lon, lat) = ((id >> 32) as u32, id as u32);
        Self::legacy(lon - lon % LEGACY_CELL, lat - lat % LEGACY_CELL)
    }

    /// Interleaved cell of `cell_size` on a grid anchored at zero holding `id`
    pub fn interleaved_containing(id: u64, cell_size: u32) -> Result<Self> {
        if cell_size == 0 {
            return Err(CodecError::contract("cell size must be positive"));
        }
        let (lon, lat) = ((id >> 32) as u32, id as u32);
        Self::interleaved(lon - lon % cell_size, lat - lat % cell_size, cell_size)
    }

    pub fn scheme(&self) -> OriginScheme {
        self.scheme
    }

    pub fn lon_base(&self) -> u32 {
        self.lon_base
    }

    pub fn lat_base(&self) -> u32 {
        self.lat_base
    }

    pub fn cell_size(&self) -> u32 {
        match self.scheme {
            OriginScheme::Legacy => LEGACY_CELL,
            OriginScheme::Interleaved { cell_size } => cell_size,
        }
    }

    /// Tile format major implied by the scheme
    pub fn format_major(&self) -> u64 {
        match self.scheme {
            OriginScheme::Legacy => LEGACY_MAJOR,
            OriginScheme::Interleaved { .. } => INTERLEAVED_MAJOR,
        }
    }

    fn deltas(&self, id: u64) -> Option<(u32, u32)> {
        let dlon = ((id >> 32) as u32).checked_sub(self.lon_base)?;
        let dlat = (id as u32).checked_sub(self.lat_base)?;
        let size = self.cell_size();
        (dlon < size && dlat < size).then_some((dlon, dlat))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.deltas(id).is_some()
    }

    pub fn to_local(&self, id: u64) -> Result<u32> {
        let (dlon, dlat) = self.deltas(id).ok_or(CodecError::OutOfRange { id })?;
        Ok(match self.scheme {
            OriginScheme::Legacy => (dlon << 16) | dlat,
            OriginScheme::Interleaved { .. } => spread_bits(dlon) | (spread_bits(dlat) << 1),
        })
    }

    pub fn to_global(&self, local: u32) -> Result<u64> {
        let (dlon, dlat) = match self.scheme {
            OriginScheme::Legacy => (local >> 16, local & 0xffff),
            OriginScheme::Interleaved { .. } => (gather_bits(local), gather_bits(local >> 1)),
        };
        let size = self.cell_size();
        if dlon >= size || dlat >= size {
            return Err(CodecError::OutOfRange { id: local as u64 });
        }
        Ok((((self.lon_base + dlon) as u64) << 32) | (self.lat_base + dlat) as u64)
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut BitWriter<W>) -> Result<()> {
        match self.scheme {
            OriginScheme::Legacy => {
                writer.encode_exp_golomb((self.lon_base / LEGACY_CELL) as u64)?;
                writer.encode_exp_golomb((self.lat_base / LEGACY_CELL) as u64)
            }
            OriginScheme::Interleaved { cell_size } => {
                writer.encode_exp_golomb(self.lon_base as u64)?;
                writer.encode_exp_golomb(self.lat_base as u64)?;
                writer.encode_exp_golomb((cell_size - 1) as u64)
            }
        }
    }

    pub(crate) fn read(reader: &mut BitReader<'_>, major: u64) -> Result<Self> {
        let position = reader.bit_position();
        let bad = |e: CodecError| CodecError::framing(position, format!("invalid tile origin: {e}"));
        let coordinate = |v: u64| {
            u32::try_from(v).map_err(|_| CodecError::framing(position, "tile origin overflows"))
        };
        match major {
            LEGACY_MAJOR => {
                let lon = reader.decode_exp_golomb()?.saturating_mul(LEGACY_CELL as u64);
                let lat = reader.decode_exp_golomb()?.saturating_mul(LEGACY_CELL as u64);
                Self::legacy(coordinate(lon)?, coordinate(lat)?).map_err(bad)
            }
            INTERLEAVED_MAJOR => {
                let lon = coordinate(reader.decode_exp_golomb()?)?;
                let lat = coordinate(reader.decode_exp_golomb()?)?;
                let cell = reader.decode_exp_golomb()?.saturating_add(1);
                let cell = coordinate(cell)?;
                Self::interleaved(lon, lat, cell).map_err(bad)
            }
            _ => Err(CodecError::framing(
                position,
                format!("no origin scheme for format major {major}"),
            )),
        }
    }
}
