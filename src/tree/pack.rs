//! Render-tree packer and unpacker. The packer serializes a compiled tree
//! and its polygons into one exactly-sized, pointer-free record stream in
//! target-engine convention; the unpacker is the inverse decompiler back to
//! a flat polygon list.
//!
//! Discipline: every node must be sized before it is packed and may be
//! packed only once. Violations and overflows are detected before any byte
//! is written and reported as an accumulated fault set.

use ahash::AHashMap;
use flagset::FlagSet;
use glam::{vec2, Vec3};
use num_traits::FromPrimitive;

use crate::binary::{flip_bbox, flip_x, Reader, SliceWriter};
use crate::error::{PackFault, PofError, Result};
use crate::model::{PolyVertex, Polygon, UNTEXTURED};

use super::consts::*;
use super::{RenderNode, RenderNodeKind};

/// Deduplicated per-submodel vertex table: unique positions, each with its
/// distinct observed normal directions. Polygon records reference both by
/// index. Dedup keys are the exact f32 bit patterns.
pub struct VertexPool {
    verts: Vec<Vec3>,
    norms_per_vert: Vec<Vec<Vec3>>,
    vert_ids: AHashMap<[u32; 3], u16>,
    norm_ids: AHashMap<(u16, [u32; 3]), u16>,
    total_norms: u32,
}

fn key(v: Vec3) -> [u32; 3] {
    [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]
}

impl VertexPool {
    pub fn build(polys: &[Polygon]) -> Result<VertexPool> {
        let mut verts: Vec<Vec3> = Vec::new();
        let mut norms_per_vert: Vec<Vec<Vec3>> = Vec::new();
        let mut vert_ids = AHashMap::new();

        for poly in polys {
            for vert in &poly.verts {
                let vid = *vert_ids.entry(key(vert.position)).or_insert_with(|| {
                    verts.push(vert.position);
                    norms_per_vert.push(Vec::new());
                    (verts.len() - 1) as u16
                });
                let norms = &mut norms_per_vert[vid as usize];
                if !norms.iter().any(|&n| key(n) == key(vert.normal)) {
                    norms.push(vert.normal);
                }
            }
        }

        if verts.len() > u16::MAX as usize {
            return Err(PofError::Malformed { what: "vertex pool exceeds 65535 positions", at: 0 });
        }
        if norms_per_vert.iter().any(|n| n.len() > u8::MAX as usize) {
            return Err(PofError::Malformed { what: "more than 255 normals on one position", at: 0 });
        }

        // Normal ids are global, assigned in vertex order to match the
        // on-disk grouping.
        let mut norm_ids = AHashMap::new();
        let mut next = 0u32;
        for (vid, norms) in norms_per_vert.iter().enumerate() {
            for norm in norms {
                norm_ids.insert((vid as u16, key(*norm)), next as u16);
                next += 1;
            }
        }
        if next > u16::MAX as u32 + 1 {
            return Err(PofError::Malformed { what: "vertex pool exceeds 65536 normals", at: 0 });
        }

        Ok(VertexPool { verts, norms_per_vert, vert_ids, norm_ids, total_norms: next })
    }

    pub fn vert_count(&self) -> usize {
        self.verts.len()
    }

    fn ids_for(&self, vert: &PolyVertex) -> (u16, u16) {
        // Lookup cannot miss: the pool was built from the same polygon set.
        let vid = self.vert_ids[&key(vert.position)];
        let nid = self.norm_ids[&(vid, key(vert.normal))];
        (vid, nid)
    }

    pub fn size(&self) -> u32 {
        let data: u32 = self
            .norms_per_vert
            .iter()
            .map(|norms| 12 + 12 * norms.len() as u32)
            .sum();
        self.data_offset() + data
    }

    fn data_offset(&self) -> u32 {
        RECORD_HEADER_SIZE + 12 + self.verts.len() as u32
    }

    fn pack(&self, buf: &mut [u8]) -> Result<()> {
        let mut w = SliceWriter::new(buf);
        w.write_i32(RecordTag::VertexPool as i32)?;
        w.write_i32(self.size() as i32)?;
        w.write_i32(self.verts.len() as i32)?;
        w.write_i32(self.total_norms as i32)?;
        w.write_i32(self.data_offset() as i32)?;
        for norms in &self.norms_per_vert {
            w.write_u8(norms.len() as u8)?;
        }
        for (vert, norms) in self.verts.iter().zip(&self.norms_per_vert) {
            w.write_vec3(flip_x(*vert))?;
            for norm in norms {
                w.write_vec3(flip_x(*norm))?;
            }
        }
        debug_assert_eq!(w.pos() as u32, self.size());
        Ok(())
    }
}

/// Pool contents decoded back into flat position/normal tables.
struct DecodedPool {
    verts: Vec<Vec3>,
    norms: Vec<Vec3>,
}

fn parse_pool(bytes: &[u8]) -> Result<(DecodedPool, usize)> {
    let mut r = Reader::new(bytes);
    let tag = r.read_i32()?;
    let size = r.read_i32()?;
    if tag != RecordTag::VertexPool as i32 {
        return Err(PofError::Malformed { what: "packed tree does not start with a vertex pool", at: 0 });
    }
    let vert_count = r.read_i32()?;
    let norm_count = r.read_i32()?;
    let data_offset = r.read_i32()?;
    if vert_count < 0 || norm_count < 0 || data_offset < 0 {
        return Err(PofError::Malformed { what: "negative vertex pool field", at: r.pos() });
    }
    let (vert_count, norm_count) = (vert_count as usize, norm_count as usize);
    // Each position needs a count byte plus 12 data bytes, each normal 12;
    // anything the buffer cannot possibly hold is rejected before allocating.
    if vert_count > bytes.len() || norm_count > bytes.len() / 12 {
        return Err(PofError::Malformed { what: "vertex pool counts exceed the buffer", at: r.pos() });
    }
    let counts = r.read_bytes(vert_count)?.to_vec();

    r.seek(data_offset as usize)?;
    let mut verts = Vec::with_capacity(vert_count);
    let mut norms = Vec::with_capacity(norm_count);
    for &count in &counts {
        verts.push(flip_x(r.read_vec3()?));
        for _ in 0..count {
            norms.push(flip_x(r.read_vec3()?));
        }
    }
    if norms.len() != norm_count {
        return Err(PofError::Malformed { what: "vertex pool normal count mismatch", at: r.pos() });
    }
    Ok((DecodedPool { verts, norms }, size as usize))
}

fn poly_record_size(poly: &Polygon) -> u32 {
    let per_vert = if poly.texture == UNTEXTURED { FLAT_POLY_VERT_SIZE } else { TEXTURED_POLY_VERT_SIZE };
    POLY_RECORD_FIXED + per_vert * poly.verts.len() as u32
}

/// Computes and records the packed size of every node in the tree. Must run
/// before `pack`; re-running is allowed and refreshes the stored sizes.
pub fn size_tree(node: &mut RenderNode, polys: &[Polygon]) -> u32 {
    let size = match &mut node.kind {
        RenderNodeKind::Empty => END_RECORD_SIZE,
        RenderNodeKind::Leaf { polys: indices, .. } => {
            BBOX_RECORD_SIZE
                + indices.iter().map(|&i| poly_record_size(&polys[i])).sum::<u32>()
                + END_RECORD_SIZE
        }
        RenderNodeKind::Split { front, back, .. } => {
            SPLIT_NODE_OVERHEAD + size_tree(front, polys) + size_tree(back, polys)
        }
    };
    node.state.size = Some(size);
    node.state.packed = false;
    size
}

struct Packer<'a> {
    polys: &'a [Polygon],
    pool: &'a VertexPool,
    faults: FlagSet<PackFault>,
}

impl<'a> Packer<'a> {
    fn fail(&mut self, fault: PackFault) -> PofError {
        self.faults |= fault;
        PofError::Pack(self.faults)
    }

    /// Packs `node` at `offset`. All checks happen before the first byte is
    /// written; a fault leaves the buffer untouched at and past `offset`.
    fn pack_node(&mut self, node: &mut RenderNode, buf: &mut [u8], offset: usize) -> Result<()> {
        let size = match node.state.size {
            Some(size) => size as usize,
            None => return Err(self.fail(PackFault::Unsized)),
        };
        if node.state.packed {
            return Err(self.fail(PackFault::DoubleUse));
        }
        if offset + size > buf.len() {
            return Err(self.fail(PackFault::PreWriteOverflow));
        }
        node.state.packed = true;

        match &mut node.kind {
            RenderNodeKind::Empty => {
                let mut w = SliceWriter::at(buf, offset);
                write_end_marker(&mut w)?;
            }
            RenderNodeKind::Leaf { bbox, polys: indices } => {
                let bbox = *bbox;
                let indices = indices.clone();
                let mut w = SliceWriter::at(buf, offset);
                w.write_i32(RecordTag::BoundBox as i32)?;
                w.write_i32(BBOX_RECORD_SIZE as i32)?;
                w.write_bbox(flip_bbox(bbox))?;
                for i in indices {
                    self.write_poly(&mut w, &self.polys[i])?;
                }
                write_end_marker(&mut w)?;
                if w.pos() != offset + size {
                    return Err(self.fail(PackFault::LeafOverflow));
                }
            }
            RenderNodeKind::Split { plane_point, plane_normal, bbox, front, back } => {
                let front_size = match front.state.size {
                    Some(size) => size,
                    None => return Err(self.fail(PackFault::Unsized)),
                };
                let front_off = SPLIT_NODE_OVERHEAD;
                let back_off = SPLIT_NODE_OVERHEAD + front_size;

                let mut w = SliceWriter::at(buf, offset);
                w.write_i32(RecordTag::Split as i32)?;
                w.write_i32(SPLIT_RECORD_SIZE as i32)?;
                w.write_vec3(flip_x(*plane_normal))?;
                w.write_vec3(flip_x(*plane_point))?;
                w.write_i32(0)?; // reserved
                w.write_i32(front_off as i32)?;
                w.write_i32(back_off as i32)?;
                // The pre/on-plane/post slots are unused by this compiler and
                // always point at the three empty subtrees written below.
                w.write_i32(SPLIT_RECORD_SIZE as i32)?;
                w.write_i32((SPLIT_RECORD_SIZE + END_RECORD_SIZE) as i32)?;
                w.write_i32((SPLIT_RECORD_SIZE + 2 * END_RECORD_SIZE) as i32)?;
                w.write_bbox(flip_bbox(*bbox))?;
                if w.pos() != offset + SPLIT_RECORD_SIZE as usize {
                    return Err(self.fail(PackFault::SplitOverflow));
                }
                for _ in 0..3 {
                    write_end_marker(&mut w)?;
                }

                self.pack_node(front, buf, offset + front_off as usize)?;
                self.pack_node(back, buf, offset + back_off as usize)?;
            }
        }
        Ok(())
    }

    fn write_poly(&self, w: &mut SliceWriter<'_>, poly: &Polygon) -> Result<()> {
        let textured = poly.texture != UNTEXTURED;
        let tag = if textured { RecordTag::TexturedPoly } else { RecordTag::FlatPoly };
        w.write_i32(tag as i32)?;
        w.write_i32(poly_record_size(poly) as i32)?;
        w.write_vec3(flip_x(poly.normal))?;
        w.write_vec3(flip_x(poly.center))?;
        w.write_f32(poly.radius)?;
        w.write_i32(poly.verts.len() as i32)?;
        if textured {
            w.write_i32(poly.texture)?;
        } else {
            w.write_bytes(&[poly.color[0], poly.color[1], poly.color[2], 0])?;
        }
        for vert in &poly.verts {
            let (vid, nid) = self.pool.ids_for(vert);
            w.write_u16(vid)?;
            w.write_u16(nid)?;
            if textured {
                w.write_f32(vert.uv.x)?;
                w.write_f32(vert.uv.y)?;
            }
        }
        Ok(())
    }
}

fn write_end_marker(w: &mut SliceWriter<'_>) -> Result<()> {
    w.write_i32(RecordTag::End as i32)?;
    w.write_i32(END_RECORD_SIZE as i32)
}

/// Packs the deduplicated vertex pool and the sized tree into one
/// exactly-sized buffer: the bytes embedded verbatim in the model chunk.
pub fn pack_submodel(polys: &[Polygon], tree: &mut RenderNode) -> Result<Vec<u8>> {
    let pool = VertexPool::build(polys)?;
    let tree_size = size_tree(tree, polys);
    let pool_size = pool.size();

    let mut buf = vec![0u8; (pool_size + tree_size) as usize];
    pool.pack(&mut buf)?;

    let mut packer = Packer { polys, pool: &pool, faults: FlagSet::default() };
    packer.pack_node(tree, &mut buf, pool_size as usize)?;
    Ok(buf)
}

/// Decompiles packed render-tree bytes back into a flat polygon list, in
/// front-to-back traversal order.
pub fn unpack_submodel(bytes: &[u8]) -> Result<Vec<Polygon>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let (pool, pool_size) = parse_pool(bytes)?;
    let mut polys = Vec::new();
    parse_node(bytes, pool_size, &pool, &mut polys, 0)?;
    Ok(polys)
}

fn parse_node(bytes: &[u8], offset: usize, pool: &DecodedPool, out: &mut Vec<Polygon>, depth: u32) -> Result<()> {
    if depth > MAX_TREE_DEPTH {
        return Err(PofError::Malformed { what: "packed tree recursion too deep", at: offset });
    }
    let mut r = Reader::new(bytes);
    r.seek(offset)?;
    let tag = r.read_i32()?;
    r.read_i32()?; // record size

    match RecordTag::from_i32(tag) {
        Some(RecordTag::End) => Ok(()),
        Some(RecordTag::Split) => {
            r.read_vec3()?; // plane normal
            r.read_vec3()?; // plane point
            r.read_i32()?; // reserved
            let front = r.read_i32()?;
            let back = r.read_i32()?;
            // pre/on/post offsets always reference empty subtrees; skip them.
            for child in [front, back] {
                if child != 0 {
                    parse_node(bytes, offset + child as usize, pool, out, depth + 1)?;
                }
            }
            Ok(())
        }
        Some(RecordTag::BoundBox) => {
            r.read_bbox()?;
            // A leaf: polygon records follow until the end marker.
            loop {
                let at = r.pos();
                let tag = r.read_i32()?;
                let size = r.read_i32()?;
                match RecordTag::from_i32(tag) {
                    Some(RecordTag::End) => return Ok(()),
                    Some(RecordTag::FlatPoly) => out.push(parse_poly(&mut r, pool, false)?),
                    Some(RecordTag::TexturedPoly) => out.push(parse_poly(&mut r, pool, true)?),
                    _ => return Err(PofError::Malformed { what: "unexpected record inside leaf", at }),
                }
                if size <= 0 {
                    return Err(PofError::Malformed { what: "non-positive record size", at });
                }
                r.seek(at + size as usize)?;
            }
        }
        _ => Err(PofError::Malformed { what: "unexpected record tag in packed tree", at: offset }),
    }
}

fn parse_poly(r: &mut Reader<'_>, pool: &DecodedPool, textured: bool) -> Result<Polygon> {
    let normal = flip_x(r.read_vec3()?);
    let center = flip_x(r.read_vec3()?);
    let radius = r.read_f32()?;
    let vert_count = r.read_i32()?;
    if !(3..=i32::from(u16::MAX)).contains(&vert_count) {
        return Err(PofError::Malformed { what: "bad polygon vertex count", at: r.pos() });
    }
    let (texture, color) = if textured {
        (r.read_i32()?, [128, 128, 128])
    } else {
        let rgba = r.read_array::<4>()?;
        (UNTEXTURED, [rgba[0], rgba[1], rgba[2]])
    };

    let mut verts = Vec::with_capacity(vert_count as usize);
    for _ in 0..vert_count {
        let vid = r.read_u16()? as usize;
        let nid = r.read_u16()? as usize;
        let uv = if textured { vec2(r.read_f32()?, r.read_f32()?) } else { vec2(0.0, 0.0) };
        let position = *pool.verts.get(vid).ok_or(PofError::Malformed {
            what: "polygon vertex index out of pool range",
            at: r.pos(),
        })?;
        let normal = *pool.norms.get(nid).ok_or(PofError::Malformed {
            what: "polygon normal index out of pool range",
            at: r.pos(),
        })?;
        verts.push(PolyVertex { position, normal, uv });
    }

    Ok(Polygon { verts, normal, center, radius, texture, color })
}

#[cfg(test)]
mod pack_tests {
    use super::*;
    use crate::tree::compile;
    use glam::vec3;

    fn quad(at: Vec3, texture: i32) -> Polygon {
        let corners = [
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 0.0, 1.0),
            vec3(0.0, 0.0, 1.0),
        ];
        Polygon::new(
            corners
                .iter()
                .enumerate()
                .map(|(i, &c)| PolyVertex {
                    position: c + at,
                    normal: Vec3::Y,
                    uv: vec2(i as f32 * 0.25, 0.5),
                })
                .collect(),
            texture,
        )
    }

    fn sample_polys() -> Vec<Polygon> {
        (0..9)
            .map(|i| quad(vec3(i as f32 * 2.0, (i % 3) as f32, (i % 2) as f32 * 3.0), if i % 3 == 0 { UNTEXTURED } else { i }))
            .collect()
    }

    #[test]
    fn size_matches_packed_length() {
        let polys = sample_polys();
        let (mut tree, _) = compile(&polys).unwrap();

        let pool = VertexPool::build(&polys).unwrap();
        let tree_size = size_tree(&mut tree, &polys);
        let bytes = pack_submodel(&polys, &mut tree).unwrap();
        assert_eq!(bytes.len() as u32, pool.size() + tree_size);
    }

    #[test]
    fn size_matches_for_single_leaf() {
        let polys = vec![quad(Vec3::ZERO, 2)];
        let (mut tree, _) = compile(&polys).unwrap();
        let mut sized = tree.clone();
        let tree_size = size_tree(&mut sized, &polys);
        // Leaf: bbox record + one textured quad + end marker.
        assert_eq!(tree_size, 32 + (44 + 12 * 4) + 8);

        let bytes = pack_submodel(&polys, &mut tree).unwrap();
        let pool = VertexPool::build(&polys).unwrap();
        assert_eq!(bytes.len() as u32, pool.size() + tree_size);
    }

    #[test]
    fn pool_dedups_shared_corners() {
        // Two quads sharing an edge: 8 corners, 6 unique positions.
        let polys = vec![quad(Vec3::ZERO, 0), quad(vec3(1.0, 0.0, 0.0), 0)];
        let pool = VertexPool::build(&polys).unwrap();
        assert_eq!(pool.vert_count(), 6);
        // One normal direction shared by everything.
        assert_eq!(pool.total_norms as usize, 6);
    }

    #[test]
    fn unpack_inverts_pack() {
        let polys = sample_polys();
        let (mut tree, _) = compile(&polys).unwrap();
        let order = tree.flatten();
        let bytes = pack_submodel(&polys, &mut tree).unwrap();

        let out = unpack_submodel(&bytes).unwrap();
        assert_eq!(out.len(), polys.len());
        for (unpacked, &orig_idx) in out.iter().zip(&order) {
            let orig = &polys[orig_idx];
            assert_eq!(unpacked.texture, orig.texture);
            assert_eq!(unpacked.verts.len(), orig.verts.len());
            for (a, b) in unpacked.verts.iter().zip(&orig.verts) {
                assert_eq!(a.position, b.position);
                assert_eq!(a.normal, b.normal);
                if orig.texture != UNTEXTURED {
                    assert_eq!(a.uv, b.uv);
                }
            }
            assert_eq!(unpacked.normal, orig.normal);
            assert_eq!(unpacked.center, orig.center);
        }
    }

    #[test]
    fn packing_unsized_node_is_a_fault() {
        let polys = vec![quad(Vec3::ZERO, 0)];
        let (mut tree, _) = compile(&polys).unwrap();
        let pool = VertexPool::build(&polys).unwrap();
        let mut buf = vec![0u8; 4096];
        let mut packer = Packer { polys: &polys, pool: &pool, faults: FlagSet::default() };
        match packer.pack_node(&mut tree, &mut buf, 0) {
            Err(PofError::Pack(faults)) => assert!(faults.contains(PackFault::Unsized)),
            other => panic!("expected unsized fault, got {other:?}"),
        }
    }

    #[test]
    fn packing_twice_is_a_fault() {
        let polys = vec![quad(Vec3::ZERO, 0)];
        let (mut tree, _) = compile(&polys).unwrap();
        let pool = VertexPool::build(&polys).unwrap();
        size_tree(&mut tree, &polys);

        let mut buf = vec![0u8; 4096];
        let mut packer = Packer { polys: &polys, pool: &pool, faults: FlagSet::default() };
        packer.pack_node(&mut tree, &mut buf, 0).unwrap();
        match packer.pack_node(&mut tree, &mut buf, 1024) {
            Err(PofError::Pack(faults)) => assert!(faults.contains(PackFault::DoubleUse)),
            other => panic!("expected double-use fault, got {other:?}"),
        }
    }

    #[test]
    fn overflow_detected_before_write() {
        let polys = sample_polys();
        let (mut tree, _) = compile(&polys).unwrap();
        let pool = VertexPool::build(&polys).unwrap();
        size_tree(&mut tree, &polys);

        let mut buf = vec![0xAAu8; 16];
        let mut packer = Packer { polys: &polys, pool: &pool, faults: FlagSet::default() };
        match packer.pack_node(&mut tree, &mut buf, 0) {
            Err(PofError::Pack(faults)) => assert!(faults.contains(PackFault::PreWriteOverflow)),
            other => panic!("expected pre-write overflow, got {other:?}"),
        }
        // Nothing was written.
        assert!(buf.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert!(unpack_submodel(&[9, 0, 0, 0, 8, 0, 0, 0]).is_err());
    }

    #[test]
    fn unpack_rejects_hostile_pool_counts() {
        // A pool header whose normal count is negative must come back as a
        // malformed-payload error, never an allocation panic.
        let mut w = crate::binary::Writer::new();
        w.write_i32(RecordTag::VertexPool as i32);
        w.write_i32(20);
        w.write_i32(0); // vert count
        w.write_i32(-1); // norm count
        w.write_i32(20); // data offset
        assert!(matches!(
            unpack_submodel(&w.into_bytes()),
            Err(PofError::Malformed { .. })
        ));

        // Counts the buffer cannot possibly hold are rejected up front too.
        let mut w = crate::binary::Writer::new();
        w.write_i32(RecordTag::VertexPool as i32);
        w.write_i32(20);
        w.write_i32(0);
        w.write_i32(i32::MAX);
        w.write_i32(20);
        assert!(matches!(
            unpack_submodel(&w.into_bytes()),
            Err(PofError::Malformed { .. })
        ));
    }

    #[test]
    fn empty_tree_packs_to_minimal_stream() {
        // Empty pool plus the end marker, the blob a failed compile ships.
        let mut tree = RenderNode::empty();
        let bytes = pack_submodel(&[], &mut tree).unwrap();
        assert_eq!(bytes.len(), 28);
        assert!(unpack_submodel(&bytes).unwrap().is_empty());
    }
}
