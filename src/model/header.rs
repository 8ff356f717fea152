use glam::{Mat3, Vec3};

use crate::math::BBox;

/// One entry of the cross-section table: hull radius sampled at a depth
/// along the length axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrossSection {
    pub depth: f32,
    pub radius: f32,
}

/// Global model metadata. Radius and bounding box each carry an independent
/// author override; the computed value is kept alongside so clearing the
/// override restores it.
#[derive(Debug, Clone)]
pub struct ModelHeader {
    pub mass: f32,
    pub mass_center: Vec3,
    pub moi: Mat3,
    pub radius: f32,
    pub radius_override: Option<f32>,
    pub bbox: BBox,
    pub bbox_override: Option<BBox>,
    /// Submodel indices of the distance-ordered detail-level roots.
    pub detail_levels: Vec<i32>,
    /// Submodel indices of post-destruction debris roots.
    pub debris: Vec<i32>,
    pub cross_sections: Vec<CrossSection>,
    /// On-disk object flag word, carried through unmodified.
    pub flags: u32,
}

impl Default for ModelHeader {
    fn default() -> Self {
        ModelHeader {
            mass: 0.0,
            mass_center: Vec3::ZERO,
            moi: Mat3::IDENTITY,
            radius: 0.0,
            radius_override: None,
            bbox: BBox::default(),
            bbox_override: None,
            detail_levels: Vec::new(),
            debris: Vec::new(),
            cross_sections: Vec::new(),
            flags: 0,
        }
    }
}

impl ModelHeader {
    pub fn effective_radius(&self) -> f32 {
        self.radius_override.unwrap_or(self.radius)
    }

    pub fn effective_bbox(&self) -> BBox {
        self.bbox_override.unwrap_or(self.bbox)
    }
}
