//! Single-pass tile decoder
//!
//! Rebuilds every node of a persisted tile into a [`MicroCache`]. Internal
//! reverse links are not stored; each decoded forward link adds its reverse
//! counterpart to the target node, after the target's own links.

use tracing::debug;

use super::estimator::FieldCoders;
use super::matcher::WaypointMatcher;
use super::microcache::MicroCache;
use super::model::{global_id, split_id, Link, ShapePoint, TagDescription, TileNode, TurnRestriction};
use super::origin::TileOrigin;
use super::{read_tag_payload, TILE_MAGIC};
use crate::bitstream::BitReader;
use crate::codec::{HuffmanDecoder, SectionHeader, TwoPassDecoder};
use crate::config::{CodecConfig, MAX_DENSITY_WINDOW};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Jump over turn restriction records using their declared bit length
    pub skip_restrictions: bool,
}

#[derive(Debug, Clone)]
pub struct DecodedTile {
    pub cache: MicroCache,
    pub header: SectionHeader,
    /// Nodes for which the matcher reported `has_match`
    pub matched_nodes: Vec<u64>,
}

pub fn decode_tile(bytes: &[u8], config: &CodecConfig) -> Result<MicroCache> {
    decode_tile_with(bytes, config, DecodeOptions::default(), None).map(|tile| tile.cache)
}

/// Decode with options and an optional waypoint matcher fed during geometry
/// decoding
pub fn decode_tile_with(
    bytes: &[u8],
    config: &CodecConfig,
    options: DecodeOptions,
    matcher: Option<&mut dyn WaypointMatcher>,
) -> Result<DecodedTile> {
    config.validate()?;
    let mut reader = BitReader::new(bytes);
    let magic = reader.read_u32()?;
    if magic != TILE_MAGIC {
        return Err(CodecError::BadMagic {
            expected: TILE_MAGIC,
            found: magic,
        });
    }
    reader.start_crc()?;
    let (header, payload) = reader.read_section(config.max_format_major)?;
    let computed = reader.finish_crc()?;
    let stored = reader.read_u64()?;
    if config.verify_crc && stored != computed {
        return Err(CodecError::ChecksumMismatch { stored, computed });
    }

    let mut reader = BitReader::new(payload);
    let decoder = TileDecoder::read_header(&mut reader, header.major, config, options)?;
    let (nodes, matched_nodes) = decoder.read_bodies(&mut reader, matcher)?;

    let mut cache = MicroCache::new(decoder.origin);
    for node in &nodes {
        cache.add_node(node)?;
    }
    debug!(
        nodes = cache.size(),
        bytes = bytes.len(),
        major = header.major,
        minor = header.minor,
        "decoded tile"
    );
    Ok(DecodedTile {
        cache,
        header,
        matched_nodes,
    })
}

struct TileDecoder {
    origin: TileOrigin,
    window: u32,
    ids: Vec<u64>,
    node_tags: HuffmanDecoder<TagDescription>,
    way_tags: HuffmanDecoder<TagDescription>,
    external_lon: TwoPassDecoder,
    external_lat: TwoPassDecoder,
    body_bits: u64,
    options: DecodeOptions,
}

fn narrow<T: TryFrom<i64>>(value: i64, position: u64, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| CodecError::framing(position, format!("{what} {value} out of range")))
}

/// `base + delta` narrowed to `T`; overflow is corruption like any other
/// out-of-range value
fn offset<T: TryFrom<i64>>(base: i64, delta: i64, position: u64, what: &str) -> Result<T> {
    let value = base
        .checked_add(delta)
        .ok_or_else(|| CodecError::framing(position, format!("{what} {base} + {delta} overflows")))?;
    narrow(value, position, what)
}

/// Restriction block of `node`: declared bit length, records, stop bit
fn read_restrictions(
    reader: &mut BitReader<'_>,
    node: &mut TileNode,
    coders: &mut FieldCoders,
    skip: bool,
) -> Result<()> {
    let declared = reader.decode_unsigned(coders.restriction_bits.noisy_bits())?;
    coders.restriction_bits.record(declared);
    if skip {
        return reader.skip_bits(declared);
    }

    let start = reader.bit_position();
    let (ilon, ilat) = (node.ilon() as i64, node.ilat() as i64);
    while reader.read_bit()? {
        let position = reader.bit_position();
        let is_positive = reader.read_bit()?;
        let exceptions = if reader.read_bit()? {
            reader.read_bits(8)? as u8
        } else {
            0
        };
        let what = "restriction coordinate";
        let from_lon = offset(ilon, coders.restriction_lon.decode_residual(reader)?, position, what)?;
        let from_lat = offset(ilat, coders.restriction_lat.decode_residual(reader)?, position, what)?;
        let to_lon = offset(ilon, coders.restriction_lon.decode_residual(reader)?, position, what)?;
        let to_lat = offset(ilat, coders.restriction_lat.decode_residual(reader)?, position, what)?;
        node.restrictions.push(TurnRestriction {
            is_positive,
            exceptions,
            from_lon,
            from_lat,
            to_lon,
            to_lat,
        });
        if reader.bit_position() - start > declared {
            break;
        }
    }
    let used = reader.bit_position() - start;
    if used != declared {
        return Err(CodecError::framing(
            reader.bit_position(),
            format!("restriction block took {used} bits, declared {declared}"),
        ));
    }
    Ok(())
}

impl TileDecoder {
    fn read_header(
        reader: &mut BitReader<'_>,
        major: u64,
        config: &CodecConfig,
        options: DecodeOptions,
    ) -> Result<Self> {
        let origin = TileOrigin::read(reader, major)?;
        let window = reader.decode_bounded(MAX_DENSITY_WINDOW as u64 - 1)? as u32 + 1;

        // every node spends at least one body bit
        let position = reader.bit_position();
        let limit = usize::try_from(reader.remaining_bits()).unwrap_or(usize::MAX);
        let locals = reader.decode_sorted_array(limit)?;
        let ids = locals
            .iter()
            .map(|&local| {
                u32::try_from(local)
                    .ok()
                    .and_then(|local| origin.to_global(local).ok())
                    .ok_or_else(|| CodecError::framing(position, format!("local id {local} outside the tile cell")))
            })
            .collect::<Result<Vec<u64>>>()?;

        let node_tags = HuffmanDecoder::read(reader, config.huffman_lookup_bits, read_tag_payload)?;
        let way_tags = HuffmanDecoder::read(reader, config.huffman_lookup_bits, read_tag_payload)?;
        let external_lon = TwoPassDecoder::read_header(reader)?;
        let external_lat = TwoPassDecoder::read_header(reader)?;
        let body_bits = reader.decode_exp_golomb()?;
        Ok(Self {
            origin,
            window,
            ids,
            node_tags,
            way_tags,
            external_lon,
            external_lat,
            body_bits,
            options,
        })
    }

    fn read_bodies(
        &self,
        reader: &mut BitReader<'_>,
        mut matcher: Option<&mut (dyn WaypointMatcher + '_)>,
    ) -> Result<(Vec<TileNode>, Vec<u64>)> {
        let start = reader.bit_position();
        let mut coders = FieldCoders::new(self.window);
        let mut nodes: Vec<TileNode> = self.ids.iter().map(|&id| TileNode::new(id)).collect();
        let mut inferred: Vec<Vec<Link>> = vec![Vec::new(); nodes.len()];
        let mut matched = Vec::new();

        for (i, node) in nodes.iter_mut().enumerate() {
            let position = reader.bit_position();
            let empty = reader.read_bit()?;
            if !empty {
                read_restrictions(reader, node, &mut coders, self.options.skip_restrictions)?;
            }
            let position_elevation = reader.bit_position();
            node.elevation = narrow(coders.elevation.decode(reader)?, position_elevation, "elevation")?;
            if !empty {
                node.tags = self.node_tags.decode(reader)?.clone();
                let count = reader.decode_unsigned(coders.link_counts.noisy_bits())?;
                coders.link_counts.record(count);
                if count > reader.remaining_bits() {
                    return Err(CodecError::framing(position, format!("link count {count} exceeds the body")));
                }
                for _ in 0..count {
                    let link = self.read_link(reader, i, node, &mut coders, &mut inferred, matcher.as_deref_mut())?;
                    node.links.push(link);
                }
            }
            if let Some(m) = matcher.as_deref() {
                if m.has_match(node.ilon(), node.ilat()) {
                    matched.push(node.id);
                }
            }
        }

        let used = reader.bit_position() - start;
        if used != self.body_bits {
            return Err(CodecError::framing(
                reader.bit_position(),
                format!("node bodies took {used} bits, declared {}", self.body_bits),
            ));
        }
        for (node, reverse) in nodes.iter_mut().zip(inferred) {
            node.links.extend(reverse);
        }
        Ok((nodes, matched))
    }

    fn read_link(
        &self,
        reader: &mut BitReader<'_>,
        index: usize,
        node: &TileNode,
        coders: &mut FieldCoders,
        inferred: &mut [Vec<Link>],
        matcher: Option<&mut (dyn WaypointMatcher + '_)>,
    ) -> Result<Link> {
        let position = reader.bit_position();
        let (ilon, ilat) = (node.ilon() as i64, node.ilat() as i64);
        let code = coders.target_delta.decode_residual(reader)?;
        let (target, internal, reverse) = if code == 0 {
            let reverse = reader.read_bit()?;
            let tlon = offset(ilon, self.external_lon.decode(reader)?, position, "target longitude")?;
            let tlat = offset(ilat, self.external_lat.decode(reader)?, position, "target latitude")?;
            let target = global_id(tlon, tlat);
            (target, None, reverse)
        } else {
            let j = (index as i64)
                .checked_add(code)
                .filter(|&j| j >= 0 && (j as usize) < self.ids.len())
                .ok_or_else(|| CodecError::framing(position, format!("link target delta {code} leaves the tile")))?
                as usize;
            (self.ids[j], Some(j), false)
        };
        let tags = self.way_tags.decode(reader)?.clone();
        if reverse {
            return Ok(Link::reverse(target, tags));
        }

        let count = reader.decode_unsigned(coders.point_counts.noisy_bits())?;
        coders.point_counts.record(count);
        if count > reader.remaining_bits() {
            return Err(CodecError::framing(position, format!("point count {count} exceeds the body")));
        }
        let (tlon, tlat) = split_id(target);
        let mut matcher = matcher.and_then(|m| m.start(ilon as i32, ilat as i32, tlon, tlat).then_some(m));
        let (tlon, tlat) = (tlon as i64, tlat as i64);

        let mut geometry = Vec::with_capacity(count as usize);
        let (mut clon, mut clat, mut elevation) = (ilon, ilat, node.elevation as i64);
        for n in 0..count {
            let position = reader.bit_position();
            let segments = (count - n) as i64 + 1;
            let plon = clon + (tlon - clon) / segments;
            let plat = clat + (tlat - clat) / segments;
            let point = ShapePoint {
                ilon: offset(plon, coders.shape_lon.decode_residual(reader)?, position, "shape longitude")?,
                ilat: offset(plat, coders.shape_lat.decode_residual(reader)?, position, "shape latitude")?,
                elevation: offset(elevation, coders.shape_elevation.decode_residual(reader)?, position, "shape elevation")?,
            };
            (clon, clat, elevation) = (point.ilon as i64, point.ilat as i64, point.elevation as i64);
            if let Some(m) = matcher.as_deref_mut() {
                m.transfer_node(point.ilon, point.ilat);
            }
            geometry.push(point);
        }
        if let Some(m) = matcher.as_deref_mut() {
            m.transfer_node(tlon as i32, tlat as i32);
            m.end();
        }

        if let Some(j) = internal {
            inferred[j].push(Link::reverse(node.id, tags.clone()));
        }
        Ok(Link::forward(target, tags, geometry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;
    use crate::tile::encode::encode_tile;

    fn sample_cache() -> MicroCache {
        let origin = TileOrigin::legacy(187_500_000, 137_500_000).unwrap();
        let a = global_id(187_500_100, 137_500_100);
        let b = global_id(187_500_900, 137_500_300);
        let way = TagDescription::new(b"highway=residential".to_vec());

        let mut na = TileNode::new(a);
        na.tags = TagDescription::new(b"traffic_signals".to_vec());
        na.restrictions.push(TurnRestriction {
            is_positive: true,
            exceptions: 0,
            from_lon: 187_499_000,
            from_lat: 137_500_100,
            to_lon: 187_500_900,
            to_lat: 137_500_300,
        });
        na.links.push(Link::forward(
            b,
            way.clone(),
            vec![ShapePoint { ilon: 187_500_500, ilat: 137_500_250, elevation: 12 }],
        ));
        let mut nb = TileNode::new(b);
        nb.elevation = 15;
        nb.links.push(Link::reverse(a, way));

        let mut cache = MicroCache::new(origin);
        cache.add_node(&na).unwrap();
        cache.add_node(&nb).unwrap();
        cache
    }

    #[test]
    fn test_round_trip_legacy_tile() {
        let cache = sample_cache();
        let config = CodecConfig::default();
        let bytes = encode_tile(&cache, &config).unwrap();
        let decoded = decode_tile(&bytes, &config).unwrap();
        assert_eq!(decoded.origin(), cache.origin());
        let expected: Vec<TileNode> = cache.nodes().collect::<Result<_>>().unwrap();
        let actual: Vec<TileNode> = decoded.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_skip_restrictions() {
        let cache = sample_cache();
        let config = CodecConfig::default();
        let bytes = encode_tile(&cache, &config).unwrap();
        let options = DecodeOptions { skip_restrictions: true };
        let decoded = decode_tile_with(&bytes, &config, options, None).unwrap();
        let nodes: Vec<TileNode> = decoded.cache.nodes().collect::<Result<_>>().unwrap();
        assert!(nodes[0].restrictions.is_empty());
        assert_eq!(nodes[0].links.len(), 1);
        assert_eq!(nodes[1].links, cache.node_at(1).unwrap().links);
    }

    #[test]
    fn test_restriction_coordinate_overflow_is_framing_error() {
        let mut node = TileNode::new(global_id(1_000_000, 2_000_000));
        let coders = FieldCoders::new(4);

        // one record whose first residual pushes the coordinate past i64
        let records = |w: &mut BitWriter<Vec<u8>>, coders: &mut FieldCoders| {
            w.write_bit(true).unwrap();
            w.write_bit(false).unwrap();
            w.write_bit(false).unwrap();
            coders.restriction_lon.encode_residual(w, i64::MAX).unwrap();
            for _ in 0..3 {
                coders.restriction_lat.encode_residual(w, 0).unwrap();
            }
            w.write_bit(false).unwrap();
        };
        let mut probe = BitWriter::new(Vec::new());
        records(&mut probe, &mut coders.clone());
        let declared = probe.bit_position();

        let mut w = BitWriter::new(Vec::new());
        w.encode_unsigned(declared, coders.restriction_bits.noisy_bits()).unwrap();
        records(&mut w, &mut coders.clone());
        let bytes = w.finish().unwrap();

        let mut reader = BitReader::new(&bytes);
        let result = read_restrictions(&mut reader, &mut node, &mut coders.clone(), false);
        assert!(matches!(result, Err(CodecError::Framing { .. })), "{result:?}");
        assert!(node.restrictions.is_empty());

        let mut reader = BitReader::new(&bytes);
        read_restrictions(&mut reader, &mut node, &mut coders.clone(), true).unwrap();
    }

    #[test]
    fn test_offset_checks_range() {
        assert_eq!(offset::<i32>(10, -3, 0, "x").unwrap(), 7);
        assert!(matches!(offset::<i32>(i64::MAX, 1, 5, "x"), Err(CodecError::Framing { position: 5, .. })));
        assert!(offset::<i32>(i32::MAX as i64, 1, 0, "x").is_err());
        assert!(offset::<i16>(-32_000, -1_000, 0, "x").is_err());
    }

    #[test]
    fn test_rejects_bad_magic_and_checksum() {
        let config = CodecConfig::default();
        let mut bytes = encode_tile(&sample_cache(), &config).unwrap();
        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xff;
        assert!(matches!(decode_tile(&bad_magic, &config), Err(CodecError::BadMagic { .. })));

        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decode_tile(&bytes, &config),
            Err(CodecError::ChecksumMismatch { .. })
        ));
        let lenient = CodecConfig {
            verify_crc: false,
            ..CodecConfig::default()
        };
        assert!(decode_tile(&bytes, &lenient).is_ok());
    }

    #[test]
    fn test_rejects_newer_major() {
        let config = CodecConfig {
            max_format_major: 0,
            ..CodecConfig::default()
        };
        assert!(config.validate().is_err());
        let bytes = encode_tile(&sample_cache(), &CodecConfig::default()).unwrap();
        let old_reader = CodecConfig::default();
        assert!(decode_tile(&bytes, &old_reader).is_ok());

        let interleaved = TileOrigin::interleaved(0, 0, 16).unwrap();
        let bytes = encode_tile(&MicroCache::new(interleaved), &CodecConfig::default()).unwrap();
        let legacy_only = CodecConfig {
            max_format_major: 1,
            ..CodecConfig::default()
        };
        assert!(matches!(
            decode_tile(&bytes, &legacy_only),
            Err(CodecError::UnsupportedVersion { major: 2, .. })
        ));
    }
}
