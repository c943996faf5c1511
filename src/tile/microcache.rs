//! Working representation of a tile
//!
//! Node bodies live back to back in one byte buffer; `fapos` holds the end
//! offset of every finished body and `faid` the co-indexed local ids, which
//! are strictly ascending. Bodies use the byte-aligned stream operations so a
//! single node can be materialized without touching its neighbours.
//!
//! Nodes are added with a commit/rollback protocol: [`MicroCache::stage_node`]
//! writes a body speculatively, [`MicroCache::finish_node`] commits it and
//! [`MicroCache::discard_node`] rewinds the buffer to the last commit.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::tile::model::{global_id, Link, ShapePoint, TagDescription, TileNode, TurnRestriction};
use crate::tile::origin::TileOrigin;

const LON: usize = 0;
const LAT: usize = 1;
const ELEVATION: usize = 2;

#[derive(Debug, Clone)]
pub struct MicroCache {
    origin: TileOrigin,
    faid: Vec<u32>,
    fapos: Vec<u32>,
    body: Vec<u8>,
    /// Local and global id of the node staged but not yet finished
    staged: Option<(u32, u64)>,
}

impl MicroCache {
    pub fn new(origin: TileOrigin) -> Self {
        Self {
            origin,
            faid: Vec::new(),
            fapos: Vec::new(),
            body: Vec::new(),
            staged: None,
        }
    }

    pub fn origin(&self) -> &TileOrigin {
        &self.origin
    }

    /// Number of finished nodes
    pub fn size(&self) -> usize {
        self.faid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faid.is_empty()
    }

    /// Bytes held by finished node bodies
    pub fn body_len(&self) -> usize {
        self.committed_end()
    }

    /// Local ids of the finished nodes, ascending
    pub fn local_ids(&self) -> &[u32] {
        &self.faid
    }

    fn committed_end(&self) -> usize {
        self.fapos.last().copied().unwrap_or(0) as usize
    }

    /// Write the body of `node` without committing it
    ///
    /// Any earlier staged node that was neither finished nor discarded is
    /// dropped.
    pub fn stage_node(&mut self, node: &TileNode) -> Result<()> {
        self.discard_node();
        let local = self.origin.to_local(node.id)?;
        if let Some(link) = node.links.iter().find(|l| l.reverse && !l.geometry.is_empty()) {
            return Err(CodecError::contract(format!(
                "reverse link to 0x{:016x} carries geometry",
                link.target
            )));
        }
        let mut writer = BitWriter::new(&mut self.body);
        write_body(&mut writer, node)?;
        writer.finish()?;
        if self.body.len() > u32::MAX as usize {
            self.discard_node();
            return Err(CodecError::contract("micro-cache body exceeds 4 GiB"));
        }
        self.staged = Some((local, node.id));
        Ok(())
    }

    /// Commit the staged node; returns its global id
    pub fn finish_node(&mut self) -> Result<u64> {
        let (local, id) = self
            .staged
            .ok_or_else(|| CodecError::contract("finish_node without a staged node"))?;
        if let Some(&last) = self.faid.last() {
            if local <= last {
                self.discard_node();
                return Err(CodecError::contract(format!(
                    "node 0x{id:016x} does not follow local id {last} in ascending order"
                )));
            }
        }
        self.faid.push(local);
        self.fapos.push(self.body.len() as u32);
        self.staged = None;
        Ok(id)
    }

    /// Drop the staged body, if any
    pub fn discard_node(&mut self) {
        let end = self.committed_end();
        self.body.truncate(end);
        self.staged = None;
    }

    pub fn add_node(&mut self, node: &TileNode) -> Result<()> {
        self.stage_node(node)?;
        self.finish_node().map(|_| ())
    }

    /// Whether a finished node has this global id; ids outside the tile fail
    pub fn contains(&self, id: u64) -> Result<bool> {
        let local = self.origin.to_local(id)?;
        Ok(self.faid.binary_search(&local).is_ok())
    }

    pub fn node(&self, id: u64) -> Result<Option<TileNode>> {
        let local = self.origin.to_local(id)?;
        match self.faid.binary_search(&local) {
            Ok(index) => self.node_at(index).map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn global_id(&self, index: usize) -> Result<u64> {
        let local = *self
            .faid
            .get(index)
            .ok_or_else(|| CodecError::contract(format!("node index {index} out of bounds")))?;
        self.origin.to_global(local)
    }

    /// Materialize the finished node at `index`
    pub fn node_at(&self, index: usize) -> Result<TileNode> {
        let id = self.global_id(index)?;
        let start = if index == 0 { 0 } else { self.fapos[index - 1] as usize };
        let end = self.fapos[index] as usize;
        let mut reader = BitReader::new(&self.body[start..end]);
        let node = read_body(&mut reader, id)?;
        if reader.remaining_bits() != 0 {
            return Err(CodecError::framing(
                reader.bit_position(),
                "trailing bytes after node body",
            ));
        }
        Ok(node)
    }

    /// Finished nodes in ascending local id order
    pub fn nodes(&self) -> impl Iterator<Item = Result<TileNode>> + '_ {
        (0..self.size()).map(move |index| self.node_at(index))
    }
}

fn write_tags<W: std::io::Write>(writer: &mut BitWriter<W>, tags: &TagDescription) -> Result<()> {
    writer.write_var_unsigned(tags.len() as u64)?;
    writer.write_bytes(tags.as_bytes())
}

fn read_tags(reader: &mut BitReader<'_>) -> Result<TagDescription> {
    let len = read_len(reader)?;
    Ok(TagDescription::from(reader.read_bytes(len)?))
}

fn read_len(reader: &mut BitReader<'_>) -> Result<usize> {
    let position = reader.bit_position();
    let len = reader.read_var_unsigned()?;
    if len > reader.remaining_bits() / 8 {
        return Err(CodecError::framing(position, format!("length {len} exceeds node body")));
    }
    Ok(len as usize)
}

fn read_coordinate(reader: &mut BitReader<'_>, channel: usize) -> Result<i32> {
    let position = reader.bit_position();
    i32::try_from(reader.read_diffed(channel)?)
        .map_err(|_| CodecError::framing(position, "coordinate out of range"))
}

fn write_body<W: std::io::Write>(writer: &mut BitWriter<W>, node: &TileNode) -> Result<()> {
    let (ilon, ilat) = (node.ilon() as i64, node.ilat() as i64);
    writer.reset_channels();
    writer.write_var_signed(node.elevation as i64)?;
    write_tags(writer, &node.tags)?;

    writer.write_var_unsigned(node.restrictions.len() as u64)?;
    for r in &node.restrictions {
        writer.write_u8(r.is_positive as u8)?;
        writer.write_u8(r.exceptions)?;
        writer.prime_channel(LON, ilon);
        writer.prime_channel(LAT, ilat);
        writer.write_diffed(r.from_lon as i64, LON)?;
        writer.write_diffed(r.from_lat as i64, LAT)?;
        writer.write_diffed(r.to_lon as i64, LON)?;
        writer.write_diffed(r.to_lat as i64, LAT)?;
    }

    writer.write_var_unsigned(node.links.len() as u64)?;
    for link in &node.links {
        writer.write_u8(link.reverse as u8)?;
        write_tags(writer, &link.tags)?;
        writer.write_var_unsigned(link.geometry.len() as u64)?;
        writer.prime_channel(LON, ilon);
        writer.prime_channel(LAT, ilat);
        writer.prime_channel(ELEVATION, node.elevation as i64);
        for p in &link.geometry {
            writer.write_diffed(p.ilon as i64, LON)?;
            writer.write_diffed(p.ilat as i64, LAT)?;
            writer.write_diffed(p.elevation as i64, ELEVATION)?;
        }
        let (target_lon, target_lat) = ((link.target >> 32) as u32, link.target as u32);
        writer.write_diffed(target_lon as i32 as i64, LON)?;
        writer.write_diffed(target_lat as i32 as i64, LAT)?;
    }
    Ok(())
}

fn read_body(reader: &mut BitReader<'_>, id: u64) -> Result<TileNode> {
    let mut node = TileNode::new(id);
    let (ilon, ilat) = (node.ilon() as i64, node.ilat() as i64);
    let position = reader.bit_position();
    node.elevation = i16::try_from(reader.read_var_signed()?)
        .map_err(|_| CodecError::framing(position, "elevation out of range"))?;
    node.tags = read_tags(reader)?;

    let count = read_len(reader)?;
    for _ in 0..count {
        let is_positive = reader.read_u8()? != 0;
        let exceptions = reader.read_u8()?;
        reader.prime_channel(LON, ilon);
        reader.prime_channel(LAT, ilat);
        node.restrictions.push(TurnRestriction {
            is_positive,
            exceptions,
            from_lon: read_coordinate(reader, LON)?,
            from_lat: read_coordinate(reader, LAT)?,
            to_lon: read_coordinate(reader, LON)?,
            to_lat: read_coordinate(reader, LAT)?,
        });
    }

    let count = read_len(reader)?;
    for _ in 0..count {
        let reverse = reader.read_u8()? != 0;
        let tags = read_tags(reader)?;
        let points = read_len(reader)?;
        reader.prime_channel(LON, ilon);
        reader.prime_channel(LAT, ilat);
        reader.prime_channel(ELEVATION, node.elevation as i64);
        let mut geometry = Vec::with_capacity(points);
        for _ in 0..points {
            let ilon = read_coordinate(reader, LON)?;
            let ilat = read_coordinate(reader, LAT)?;
            let position = reader.bit_position();
            let elevation = i16::try_from(reader.read_diffed(ELEVATION)?)
                .map_err(|_| CodecError::framing(position, "elevation out of range"))?;
            geometry.push(ShapePoint { ilon, ilat, elevation });
        }
        let target = global_id(read_coordinate(reader, LON)?, read_coordinate(reader, LAT)?);
        node.links.push(Link {
            target,
            tags,
            reverse,
            geometry,
        });
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> TileOrigin {
        TileOrigin::interleaved(100_000, 200_000, 1_000).unwrap()
    }

    fn sample(dlon: i32, dlat: i32) -> TileNode {
        let mut node = TileNode::new(global_id(100_000 + dlon, 200_000 + dlat));
        node.elevation = -12;
        node.tags = TagDescription::new(b"highway=crossing".to_vec());
        node.restrictions.push(TurnRestriction {
            is_positive: false,
            exceptions: 0b101,
            from_lon: 100_000 + dlon - 5,
            from_lat: 200_000 + dlat,
            to_lon: 100_000 + dlon,
            to_lat: 200_000 + dlat + 7,
        });
        node.links.push(Link::forward(
            global_id(99_000, 200_500),
            TagDescription::new(b"highway=primary".to_vec()),
            vec![
                ShapePoint { ilon: 99_900, ilat: 200_100, elevation: 3 },
                ShapePoint { ilon: 99_500, ilat: 200_300, elevation: -40 },
            ],
        ));
        node.links.push(Link::reverse(
            global_id(100_010, 200_010),
            TagDescription::empty(),
        ));
        node
    }

    #[test]
    fn test_add_and_lookup() {
        let mut cache = MicroCache::new(origin());
        let a = sample(1, 1);
        let b = sample(2, 0);
        cache.add_node(&a).unwrap();
        cache.add_node(&b).unwrap();
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.node(a.id).unwrap(), Some(a.clone()));
        assert_eq!(cache.node(b.id).unwrap(), Some(b.clone()));
        assert_eq!(cache.node(global_id(100_003, 200_000)).unwrap(), None);
        let all: Vec<TileNode> = cache.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 2);
        assert!(cache.contains(a.id).unwrap());
    }

    #[test]
    fn test_discard_rewinds_body() {
        let mut cache = MicroCache::new(origin());
        cache.add_node(&sample(0, 1)).unwrap();
        let committed = cache.body_len();

        cache.stage_node(&sample(5, 5)).unwrap();
        cache.discard_node();
        assert_eq!(cache.body_len(), committed);
        assert_eq!(cache.size(), 1);
        assert!(!cache.contains(sample(5, 5).id).unwrap());

        // staging again replaces an abandoned body
        cache.stage_node(&sample(6, 6)).unwrap();
        cache.stage_node(&sample(7, 7)).unwrap();
        cache.finish_node().unwrap();
        assert_eq!(cache.size(), 2);
        assert!(!cache.contains(sample(6, 6).id).unwrap());
        assert_eq!(cache.node(sample(7, 7).id).unwrap(), Some(sample(7, 7)));
    }

    #[test]
    fn test_out_of_range_and_order() {
        let mut cache = MicroCache::new(origin());
        let outside = TileNode::new(global_id(0, 0));
        assert!(matches!(cache.stage_node(&outside), Err(CodecError::OutOfRange { .. })));
        assert!(matches!(cache.node(outside.id), Err(CodecError::OutOfRange { .. })));

        cache.add_node(&sample(3, 3)).unwrap();
        assert!(matches!(cache.add_node(&sample(1, 0)), Err(CodecError::Contract(_))));
        assert!(matches!(cache.finish_node(), Err(CodecError::Contract(_))));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.node_at(0).unwrap(), sample(3, 3));
    }

    #[test]
    fn test_reverse_link_geometry_rejected() {
        let mut cache = MicroCache::new(origin());
        let mut node = sample(0, 0);
        node.links[1].geometry.push(ShapePoint { ilon: 1, ilat: 1, elevation: 0 });
        assert!(matches!(cache.stage_node(&node), Err(CodecError::Contract(_))));
        assert_eq!(cache.body_len(), 0);
    }
}
