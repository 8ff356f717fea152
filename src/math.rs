use glam::Vec3;

/// Principal axis selector, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn basis(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }

    pub fn of(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// Axis-aligned bounding box. `min` must be componentwise <= `max` for any
/// box produced by the constructors here; `default()` is the degenerate box
/// at the origin.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        BBox { min, max }
    }

    pub fn from_points(mut iter: impl Iterator<Item = Vec3>) -> Self {
        match iter.next() {
            Some(first) => iter.fold(BBox { min: first, max: first }, |mut bbox, v| {
                bbox.expand_point(v);
                bbox
            }),
            None => BBox::default(),
        }
    }

    pub fn from_boxes<'a>(mut iter: impl Iterator<Item = &'a BBox>) -> Self {
        match iter.next() {
            Some(first) => iter.fold(*first, |mut acc, bbox| {
                acc.expand_box(bbox);
                acc
            }),
            None => BBox::default(),
        }
    }

    pub fn expand_point(&mut self, v: Vec3) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    pub fn expand_box(&mut self, other: &BBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn pad(mut self, pad: f32) -> BBox {
        self.min -= Vec3::splat(pad);
        self.max += Vec3::splat(pad);
        self
    }

    pub fn size(&self, axis: Axis) -> f32 {
        axis.of(self.max) - axis.of(self.min)
    }

    pub fn volume(&self) -> f32 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y) * (self.max.z - self.min.z)
    }

    /// Axis with the greatest extent; ties resolve X, then Y, then Z.
    pub fn greatest_axis(&self) -> Axis {
        let mut best = Axis::X;
        for axis in [Axis::Y, Axis::Z] {
            if self.size(axis) > self.size(best) {
                best = axis;
            }
        }
        best
    }

    pub fn contains(&self, v: Vec3) -> bool {
        v.cmpge(self.min).all() && v.cmple(self.max).all()
    }
}

#[cfg(test)]
mod math_tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn from_points_and_expand() {
        let bbox = BBox::from_points([vec3(1.0, -2.0, 0.5), vec3(-1.0, 3.0, 0.0)].into_iter());
        assert_eq!(bbox.min, vec3(-1.0, -2.0, 0.0));
        assert_eq!(bbox.max, vec3(1.0, 3.0, 0.5));
        assert!(bbox.contains(vec3(0.0, 0.0, 0.25)));
    }

    #[test]
    fn greatest_axis_tie_breaks_in_order() {
        let cube = BBox::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(cube.greatest_axis(), Axis::X);

        let tall = BBox::new(Vec3::ZERO, vec3(1.0, 5.0, 1.0));
        assert_eq!(tall.greatest_axis(), Axis::Y);
    }

    #[test]
    fn pad_grows_every_side() {
        let bbox = BBox::new(Vec3::ZERO, Vec3::ONE).pad(0.1);
        assert_eq!(bbox.min, Vec3::splat(-0.1));
        assert_eq!(bbox.max, Vec3::splat(1.1));
    }
}
