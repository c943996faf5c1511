//! Graph records stored in a tile
//!
//! Coordinates are integer microdegrees shifted to be non-negative
//! (`ilon = (lon + 180) * 1e6`, `ilat = (lat + 90) * 1e6`); a global node id
//! packs them as `ilon << 32 | ilat`.

use std::fmt;

/// Pack a position into a global node id
pub fn global_id(ilon: i32, ilat: i32) -> u64 {
    ((ilon as u32 as u64) << 32) | ilat as u32 as u64
}

/// Split a global node id into `(ilon, ilat)`
pub fn split_id(id: u64) -> (i32, i32) {
    ((id >> 32) as u32 as i32, id as u32 as i32)
}

/// Opaque tag description bytes as produced by the profile interpreter
///
/// Only equality and hashing are needed; an empty description means no tags.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagDescription(Vec<u8>);

impl TagDescription {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for TagDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagDescription(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl From<&[u8]> for TagDescription {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for TagDescription {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Turn restriction at a node, from one neighbour position to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRestriction {
    /// `only_*` restriction when set, `no_*` otherwise
    pub is_positive: bool,
    /// Vehicle classes exempt from the restriction (bitmask)
    pub exceptions: u8,
    pub from_lon: i32,
    pub from_lat: i32,
    pub to_lon: i32,
    pub to_lat: i32,
}

/// Intermediate geometry point of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapePoint {
    pub ilon: i32,
    pub ilat: i32,
    /// Elevation in decimetres
    pub elevation: i16,
}

/// Directed edge to another node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Global id of the far end
    pub target: u64,
    pub tags: TagDescription,
    /// Reverse links carry no geometry; the forward link owns it
    pub reverse: bool,
    /// Shape points strictly between the two nodes, in travel order
    pub geometry: Vec<ShapePoint>,
}

impl Link {
    pub fn forward(target: u64, tags: TagDescription, geometry: Vec<ShapePoint>) -> Self {
        Self {
            target,
            tags,
            reverse: false,
            geometry,
        }
    }

    pub fn reverse(target: u64, tags: TagDescription) -> Self {
        Self {
            target,
            tags,
            reverse: true,
            geometry: Vec::new(),
        }
    }
}

/// One graph node with everything attached to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileNode {
    /// Global id
    pub id: u64,
    /// Elevation in decimetres
    pub elevation: i16,
    pub tags: TagDescription,
    pub restrictions: Vec<TurnRestriction>,
    pub links: Vec<Link>,
}

impl TileNode {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            elevation: 0,
            tags: TagDescription::empty(),
            restrictions: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn ilon(&self) -> i32 {
        split_id(self.id).0
    }

    pub fn ilat(&self) -> i32 {
        split_id(self.id).1
    }
}
