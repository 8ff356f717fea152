//! Binary spatial-partition trees: the render tree built over one submodel's
//! polygon set and the simpler collision tree over the shield mesh, plus the
//! packers that serialize both into pointer-free record streams.

pub mod compile;
pub mod consts;
pub mod pack;
pub mod shield;

use glam::Vec3;

use crate::math::BBox;
pub use compile::{compile, CompileStats};
pub use consts::{RecordTag, ShieldTag};
pub use pack::{pack_submodel, unpack_submodel};
pub use shield::{build_shield_tree, pack_shield_tree, unpack_shield_tree, ShieldNode};

/// Size/use bookkeeping the packer keeps per node. A node must be sized
/// before it is packed and may be packed only once; breaking either rule is
/// a caller logic fault the packer reports instead of writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackState {
    pub(crate) size: Option<u32>,
    pub(crate) packed: bool,
}

/// One node of a compiled render tree. Polygons are referenced by index into
/// the submodel's polygon list; `Empty` is a valid, distinct subtree.
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub kind: RenderNodeKind,
    pub(crate) state: PackState,
}

#[derive(Debug, Clone)]
pub enum RenderNodeKind {
    Empty,
    Leaf {
        bbox: BBox,
        polys: Vec<usize>,
    },
    Split {
        plane_point: Vec3,
        plane_normal: Vec3,
        bbox: BBox,
        front: Box<RenderNode>,
        back: Box<RenderNode>,
    },
}

impl RenderNode {
    pub fn empty() -> Self {
        RenderNode { kind: RenderNodeKind::Empty, state: PackState::default() }
    }

    pub fn leaf(bbox: BBox, polys: Vec<usize>) -> Self {
        RenderNode { kind: RenderNodeKind::Leaf { bbox, polys }, state: PackState::default() }
    }

    pub fn split(plane_point: Vec3, plane_normal: Vec3, bbox: BBox, front: RenderNode, back: RenderNode) -> Self {
        RenderNode {
            kind: RenderNodeKind::Split {
                plane_point,
                plane_normal,
                bbox,
                front: Box::new(front),
                back: Box::new(back),
            },
            state: PackState::default(),
        }
    }

    pub fn bbox(&self) -> BBox {
        match &self.kind {
            RenderNodeKind::Empty => BBox::default(),
            RenderNodeKind::Leaf { bbox, .. } | RenderNodeKind::Split { bbox, .. } => *bbox,
        }
    }

    /// Polygon indices in front-to-back traversal order.
    pub fn flatten(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<usize>) {
        match &self.kind {
            RenderNodeKind::Empty => {}
            RenderNodeKind::Leaf { polys, .. } => out.extend_from_slice(polys),
            RenderNodeKind::Split { front, back, .. } => {
                front.collect(out);
                back.collect(out);
            }
        }
    }

    pub fn depth(&self) -> u32 {
        match &self.kind {
            RenderNodeKind::Empty | RenderNodeKind::Leaf { .. } => 1,
            RenderNodeKind::Split { front, back, .. } => 1 + front.depth().max(back.depth()),
        }
    }

    pub fn leaf_count(&self) -> u32 {
        match &self.kind {
            RenderNodeKind::Empty => 0,
            RenderNodeKind::Leaf { .. } => 1,
            RenderNodeKind::Split { front, back, .. } => front.leaf_count() + back.leaf_count(),
        }
    }
}
