//! Collision tree over the shield mesh. A simpler cousin of the render tree:
//! binary centroid-median splits down to one triangle per leaf, packed with
//! the same size-before-pack discipline.

use flagset::FlagSet;
use glam::Vec3;
use num_traits::FromPrimitive;

use crate::binary::{flip_bbox, Reader, SliceWriter};
use crate::error::{PackFault, PofError, Result};
use crate::math::BBox;
use crate::model::ShieldFace;

use super::consts::*;
use super::PackState;

#[derive(Debug, Clone)]
pub struct ShieldNode {
    pub kind: ShieldNodeKind,
    state: PackState,
}

#[derive(Debug, Clone)]
pub enum ShieldNodeKind {
    Leaf { bbox: BBox, faces: Vec<u32> },
    Split { bbox: BBox, front: Box<ShieldNode>, back: Box<ShieldNode> },
}

impl ShieldNode {
    fn leaf(bbox: BBox, faces: Vec<u32>) -> Self {
        ShieldNode { kind: ShieldNodeKind::Leaf { bbox, faces }, state: PackState::default() }
    }

    fn split(bbox: BBox, front: ShieldNode, back: ShieldNode) -> Self {
        ShieldNode {
            kind: ShieldNodeKind::Split { bbox, front: Box::new(front), back: Box::new(back) },
            state: PackState::default(),
        }
    }

    pub fn bbox(&self) -> BBox {
        match &self.kind {
            ShieldNodeKind::Leaf { bbox, .. } | ShieldNodeKind::Split { bbox, .. } => *bbox,
        }
    }

    /// Face indices of the whole subtree, front first.
    pub fn faces(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<u32>) {
        match &self.kind {
            ShieldNodeKind::Leaf { faces, .. } => out.extend_from_slice(faces),
            ShieldNodeKind::Split { front, back, .. } => {
                front.collect(out);
                back.collect(out);
            }
        }
    }
}

struct FaceInfo {
    index: u32,
    center: Vec3,
    bbox: BBox,
}

/// Builds the collision tree over the shield triangles. `verts` is the shield
/// mesh vertex table the faces index into.
pub fn build_shield_tree(faces: &[ShieldFace], verts: &[Vec3]) -> Result<ShieldNode> {
    if faces.is_empty() {
        return Err(PofError::Malformed { what: "cannot build a collision tree over an empty shield", at: 0 });
    }
    let mut info = Vec::with_capacity(faces.len());
    for (i, face) in faces.iter().enumerate() {
        let mut corners = [Vec3::ZERO; 3];
        for (slot, &vi) in corners.iter_mut().zip(&face.verts) {
            *slot = *verts.get(vi as usize).ok_or(PofError::Malformed {
                what: "shield face references a vertex out of range",
                at: i,
            })?;
        }
        info.push(FaceInfo {
            index: i as u32,
            center: (corners[0] + corners[1] + corners[2]) / 3.0,
            bbox: BBox::from_points(corners.into_iter()),
        });
    }
    recurse(&mut info, 1)
}

fn recurse(faces: &mut [FaceInfo], depth: u32) -> Result<ShieldNode> {
    if depth > MAX_TREE_DEPTH {
        return Err(PofError::CompileDepth { depth });
    }
    let bbox = BBox::from_boxes(faces.iter().map(|f| &f.bbox));
    if faces.len() == 1 {
        return Ok(ShieldNode::leaf(bbox, vec![faces[0].index]));
    }

    let centroid_box = BBox::from_points(faces.iter().map(|f| f.center));
    let axis = centroid_box.greatest_axis();
    let spread = centroid_box.size(axis);
    let tolerance = SPREAD_EPSILON_FACTOR
        * f32::EPSILON
        * f32::max(axis.of(centroid_box.max).abs(), axis.of(centroid_box.min).abs());
    if spread <= tolerance {
        return Ok(ShieldNode::leaf(bbox, faces.iter().map(|f| f.index).collect()));
    }

    faces.sort_by(|a, b| axis.of(a.center).total_cmp(&axis.of(b.center)));
    let median = faces.len() / 2;
    let (back_set, front_set) = faces.split_at_mut(median);
    let back = recurse(back_set, depth + 1)?;
    let front = recurse(front_set, depth + 1)?;
    Ok(ShieldNode::split(bbox, front, back))
}

fn size_node(node: &mut ShieldNode) -> u32 {
    let size = match &mut node.kind {
        ShieldNodeKind::Leaf { faces, .. } => SHIELD_LEAF_FIXED + 4 * faces.len() as u32,
        ShieldNodeKind::Split { front, back, .. } => {
            SHIELD_SPLIT_SIZE + size_node(front) + size_node(back)
        }
    };
    node.state.size = Some(size);
    node.state.packed = false;
    size
}

fn pack_node(
    node: &mut ShieldNode,
    buf: &mut [u8],
    offset: usize,
    faults: &mut FlagSet<PackFault>,
) -> Result<()> {
    let fail = |faults: &mut FlagSet<PackFault>, fault: PackFault| {
        *faults |= fault;
        PofError::Pack(*faults)
    };

    let size = match node.state.size {
        Some(size) => size as usize,
        None => return Err(fail(faults, PackFault::Unsized)),
    };
    if node.state.packed {
        return Err(fail(faults, PackFault::DoubleUse));
    }
    if offset + size > buf.len() {
        return Err(fail(faults, PackFault::PreWriteOverflow));
    }
    node.state.packed = true;

    match &mut node.kind {
        ShieldNodeKind::Leaf { bbox, faces } => {
            let mut w = SliceWriter::at(buf, offset);
            w.write_i32(ShieldTag::Leaf as i32)?;
            w.write_i32(size as i32)?;
            w.write_bbox(flip_bbox(*bbox))?;
            w.write_u32(faces.len() as u32)?;
            for &face in faces.iter() {
                w.write_u32(face)?;
            }
            if w.pos() != offset + size {
                return Err(fail(faults, PackFault::LeafOverflow));
            }
        }
        ShieldNodeKind::Split { bbox, front, back } => {
            let front_size = match front.state.size {
                Some(size) => size,
                None => return Err(fail(faults, PackFault::Unsized)),
            };
            let front_off = SHIELD_SPLIT_SIZE;
            let back_off = SHIELD_SPLIT_SIZE + front_size;

            let mut w = SliceWriter::at(buf, offset);
            w.write_i32(ShieldTag::Split as i32)?;
            w.write_i32(size as i32)?;
            w.write_bbox(flip_bbox(*bbox))?;
            w.write_i32(front_off as i32)?;
            w.write_i32(back_off as i32)?;
            if w.pos() != offset + SHIELD_SPLIT_SIZE as usize {
                return Err(fail(faults, PackFault::SplitOverflow));
            }

            pack_node(front, buf, offset + front_off as usize, faults)?;
            pack_node(back, buf, offset + back_off as usize, faults)?;
        }
    }
    Ok(())
}

/// Serializes the collision tree into an exactly-sized buffer in the target
/// convention (child offsets relative to each node's own start).
pub fn pack_shield_tree(tree: &mut ShieldNode) -> Result<Vec<u8>> {
    let total = size_node(tree);
    let mut buf = vec![0u8; total as usize];
    let mut faults = FlagSet::default();
    pack_node(tree, &mut buf, 0, &mut faults)?;
    Ok(buf)
}

pub fn unpack_shield_tree(bytes: &[u8]) -> Result<ShieldNode> {
    parse_node(bytes, 0, 0)
}

fn parse_node(bytes: &[u8], offset: usize, depth: u32) -> Result<ShieldNode> {
    if depth > MAX_TREE_DEPTH {
        return Err(PofError::Malformed { what: "collision tree recursion too deep", at: offset });
    }
    let mut r = Reader::new(bytes);
    r.seek(offset)?;
    let tag = r.read_i32()?;
    r.read_i32()?; // node size
    let bbox = flip_bbox(r.read_bbox()?);

    match ShieldTag::from_i32(tag) {
        Some(ShieldTag::Leaf) => {
            let count = r.read_u32()? as usize;
            if count > r.remaining() / 4 {
                return Err(PofError::Malformed { what: "leaf face count exceeds the buffer", at: offset });
            }
            let mut faces = Vec::with_capacity(count);
            for _ in 0..count {
                faces.push(r.read_u32()?);
            }
            Ok(ShieldNode::leaf(bbox, faces))
        }
        Some(ShieldTag::Split) => {
            let front_off = r.read_i32()?;
            let back_off = r.read_i32()?;
            if front_off <= 0 || back_off <= 0 {
                return Err(PofError::Malformed { what: "collision split with bad child offsets", at: offset });
            }
            let front = parse_node(bytes, offset + front_off as usize, depth + 1)?;
            let back = parse_node(bytes, offset + back_off as usize, depth + 1)?;
            Ok(ShieldNode::split(bbox, front, back))
        }
        None => Err(PofError::Malformed { what: "unknown collision tree tag", at: offset }),
    }
}

#[cfg(test)]
mod shield_tests {
    use super::*;
    use glam::vec3;

    /// Octahedron shield: 6 verts, 8 triangles.
    fn octahedron() -> (Vec<ShieldFace>, Vec<Vec3>) {
        let verts = vec![
            vec3(1.0, 0.0, 0.0),
            vec3(-1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(0.0, -1.0, 0.0),
            vec3(0.0, 0.0, 1.0),
            vec3(0.0, 0.0, -1.0),
        ];
        let tris: [[u32; 3]; 8] = [
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        let faces = tris
            .iter()
            .map(|&t| {
                let normal = {
                    let [a, b, c] = t.map(|i| verts[i as usize]);
                    (b - a).cross(c - a).normalize()
                };
                ShieldFace { normal, verts: t, neighbors: [-1, -1, -1] }
            })
            .collect();
        (faces, verts)
    }

    #[test]
    fn build_reaches_one_triangle_per_leaf() {
        let (faces, verts) = octahedron();
        let tree = build_shield_tree(&faces, &verts).unwrap();

        let mut ids = tree.faces();
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());

        fn leaves(node: &ShieldNode) -> usize {
            match &node.kind {
                ShieldNodeKind::Leaf { faces, .. } => {
                    assert_eq!(faces.len(), 1);
                    1
                }
                ShieldNodeKind::Split { front, back, .. } => leaves(front) + leaves(back),
            }
        }
        assert_eq!(leaves(&tree), 8);
    }

    #[test]
    fn pack_then_unpack_preserves_structure() {
        let (faces, verts) = octahedron();
        let mut tree = build_shield_tree(&faces, &verts).unwrap();
        let before = tree.faces();
        let root_bbox = tree.bbox();

        let bytes = pack_shield_tree(&mut tree).unwrap();
        let out = unpack_shield_tree(&bytes).unwrap();
        assert_eq!(out.faces(), before);
        assert_eq!(out.bbox().min, root_bbox.min);
        assert_eq!(out.bbox().max, root_bbox.max);
    }

    #[test]
    fn packed_size_is_exact() {
        let (faces, verts) = octahedron();
        let mut tree = build_shield_tree(&faces, &verts).unwrap();
        let total = size_node(&mut tree);
        let bytes = pack_shield_tree(&mut tree).unwrap();
        assert_eq!(bytes.len() as u32, total);
    }

    #[test]
    fn double_pack_is_a_fault() {
        let (faces, verts) = octahedron();
        let mut tree = build_shield_tree(&faces, &verts).unwrap();
        let total = size_node(&mut tree) as usize;
        let mut buf = vec![0u8; total * 2];
        let mut faults = FlagSet::default();
        pack_node(&mut tree, &mut buf, 0, &mut faults).unwrap();
        match pack_node(&mut tree, &mut buf, total, &mut faults) {
            Err(PofError::Pack(faults)) => assert!(faults.contains(PackFault::DoubleUse)),
            other => panic!("expected double-use fault, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_face() {
        let (mut faces, verts) = octahedron();
        faces[0].verts = [0, 1, 99];
        assert!(build_shield_tree(&faces, &verts).is_err());
    }

    #[test]
    fn unpack_rejects_oversized_leaf_count() {
        // A leaf claiming more faces than the buffer can hold must error out
        // instead of allocating for the bogus count.
        let mut w = crate::binary::Writer::new();
        w.write_i32(ShieldTag::Leaf as i32);
        w.write_i32(SHIELD_LEAF_FIXED as i32);
        w.write_bbox(BBox::default());
        w.write_u32(u32::MAX);
        assert!(matches!(
            unpack_shield_tree(&w.into_bytes()),
            Err(PofError::Malformed { .. })
        ));
    }
}
