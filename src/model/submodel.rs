use glam::{Vec2, Vec3};
use num_derive::FromPrimitive;

use crate::math::BBox;

/// Texture table index meaning "no texture, flat colored".
pub const UNTEXTURED: i32 = -1;

/// Submodel index meaning "no submodel".
pub const NO_PARENT: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolyVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// One face of a submodel: at least three vertices, a face normal, and the
/// precomputed centroid/radius the packed records carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub verts: Vec<PolyVertex>,
    pub normal: Vec3,
    pub center: Vec3,
    pub radius: f32,
    pub texture: i32,
    /// Flat color for the untextured record variant.
    pub color: [u8; 3],
}

impl Polygon {
    pub fn new(verts: Vec<PolyVertex>, texture: i32) -> Self {
        let mut poly = Polygon {
            verts,
            normal: Vec3::ZERO,
            center: Vec3::ZERO,
            radius: 0.0,
            texture,
            color: [128, 128, 128],
        };
        poly.normal = poly.newell_normal();
        poly.recalc_center_radius();
        poly
    }

    /// Aggregate face normal by Newell's method: sum of cross products of
    /// adjacent edges around the ring, normalized. Stable for non-planar and
    /// concave rings where a single edge-pair cross product is not.
    pub fn newell_normal(&self) -> Vec3 {
        let n = self.verts.len();
        let mut sum = Vec3::ZERO;
        for i in 0..n {
            let a = self.verts[i].position;
            let b = self.verts[(i + 1) % n].position;
            let c = self.verts[(i + 2) % n].position;
            sum += (b - a).cross(c - b);
        }
        sum.normalize_or_zero()
    }

    pub fn recalc_center_radius(&mut self) {
        if self.verts.is_empty() {
            self.center = Vec3::ZERO;
            self.radius = 0.0;
            return;
        }
        let mut center = Vec3::ZERO;
        for v in &self.verts {
            center += v.position;
        }
        center /= self.verts.len() as f32;
        self.center = center;
        self.radius = self
            .verts
            .iter()
            .map(|v| v.position.distance(center))
            .fold(0.0, f32::max);
    }

    pub fn bbox(&self) -> BBox {
        BBox::from_points(self.verts.iter().map(|v| v.position))
    }

    /// Reverses the vertex ring. Winding determines facing, so this flips
    /// the face; the stored normals are left to the caller.
    pub fn reverse_winding(&mut self) {
        self.verts.reverse();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum MovementType {
    #[default]
    None = -1,
    Positional = 0,
    Rotational = 1,
    RotationalSpecial = 2,
    Triggered = 3,
    IntrinsicRotate = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum MovementAxis {
    #[default]
    None = -1,
    X = 0,
    Z = 1,
    Y = 2,
    Other = 3,
}

/// One rigid piece of the model. `parent == NO_PARENT` marks a root; roots
/// correspond to detail levels and debris pieces.
#[derive(Debug, Clone, Default)]
pub struct SubModel {
    pub parent: i32,
    /// Pivot position relative to the parent submodel.
    pub offset: Vec3,
    pub geo_center: Vec3,
    pub radius: f32,
    pub radius_override: Option<f32>,
    pub bbox: BBox,
    pub bbox_override: Option<BBox>,
    pub name: String,
    pub properties: String,
    pub movement_type: MovementType,
    pub movement_axis: MovementAxis,
    pub polygons: Vec<Polygon>,
}

impl SubModel {
    pub fn with_name(name: &str) -> Self {
        SubModel {
            parent: NO_PARENT,
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent == NO_PARENT
    }

    /// Effective radius: the author override wins over the computed value.
    pub fn effective_radius(&self) -> f32 {
        self.radius_override.unwrap_or(self.radius)
    }

    pub fn effective_bbox(&self) -> BBox {
        self.bbox_override.unwrap_or(self.bbox)
    }

    /// Recomputes geometric center, bounding box and radius from the polygon
    /// vertices. Overrides are not touched.
    pub fn recalc_bounds(&mut self) {
        let points = || self.polygons.iter().flat_map(|p| p.verts.iter().map(|v| v.position));
        self.bbox = BBox::from_points(points());

        let mut center = Vec3::ZERO;
        let mut n = 0u32;
        for p in points() {
            center += p;
            n += 1;
        }
        if n > 0 {
            center /= n as f32;
        }
        self.geo_center = center;

        self.radius = points().map(Vec3::length).fold(0.0, f32::max);
    }
}
