use num_derive::FromPrimitive;

/// Record tags of the packed render-tree stream. Every record starts with an
/// 8-byte header: `tag: i32, total_size: i32`, the size including the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum RecordTag {
    End = 0,
    VertexPool = 1,
    FlatPoly = 2,
    TexturedPoly = 3,
    Split = 4,
    BoundBox = 5,
}

pub const RECORD_HEADER_SIZE: u32 = 8;
pub const END_RECORD_SIZE: u32 = 8;
pub const BBOX_RECORD_SIZE: u32 = 32;
/// The split record proper. The reference implementation reported 72 written
/// bytes against this declared size; the declared size is authoritative.
pub const SPLIT_RECORD_SIZE: u32 = 80;
/// Split record plus the three empty-subtree end markers the unused
/// pre/on-plane/post child offsets point at.
pub const SPLIT_NODE_OVERHEAD: u32 = SPLIT_RECORD_SIZE + 3 * END_RECORD_SIZE;
/// Fixed bytes of either polygon record variant, header included.
pub const POLY_RECORD_FIXED: u32 = 44;
pub const FLAT_POLY_VERT_SIZE: u32 = 4;
pub const TEXTURED_POLY_VERT_SIZE: u32 = 12;

/// Recursion ceiling for the compiler; exceeding it is a fatal compile error
/// for that submodel.
pub const MAX_TREE_DEPTH: u32 = 500;
/// Padding applied to the whole submodel's bounding box before recursion.
pub const GLOBAL_BBOX_PAD: f32 = 0.1;
/// A centroid spread below `10 * epsilon * max(|hi|, |lo|)` cannot be
/// usefully split; the set becomes one leaf.
pub const SPREAD_EPSILON_FACTOR: f32 = 10.0;

/// Collision (shield) tree node tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ShieldTag {
    Split = 0,
    Leaf = 1,
}

pub const SHIELD_SPLIT_SIZE: u32 = RECORD_HEADER_SIZE + 24 + 8;
pub const SHIELD_LEAF_FIXED: u32 = RECORD_HEADER_SIZE + 24 + 4;
