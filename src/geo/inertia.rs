//! Numerical inertia-tensor estimate for the solid bounded by a submodel's
//! outward-facing mesh. A regular grid over the XZ extent casts vertical
//! lines through the geometry and accumulates closed-form cuboid slabs
//! between entry/exit pairs. A sampling approximation, not an exact solid
//! integral; `resolution` trades accuracy for cost.

use glam::{vec3, Mat3, Vec3};

use crate::math::{Axis, BBox};
use crate::model::SubModel;

pub const DEFAULT_MOI_RESOLUTION: usize = 50;

/// Estimates the header inertia tensor from `sub`'s mesh, normalized to
/// `mass` and inverted (the stored form is the inverse tensor). Falls back
/// to identity when the mesh encloses no volume at the sampled resolution.
pub fn estimate_moi(sub: &SubModel, mass: f32, resolution: usize) -> Mat3 {
    let resolution = resolution.max(1);
    let bbox = BBox::from_points(
        sub.polygons.iter().flat_map(|p| p.verts.iter().map(|v| v.position)),
    );
    let dx = bbox.size(Axis::X) / resolution as f32;
    let dz = bbox.size(Axis::Z) / resolution as f32;
    if dx <= 0.0 || dz <= 0.0 {
        log::warn!("inertia estimate on flat geometry; returning identity");
        return Mat3::IDENTITY;
    }

    // Accumulated tensor terms and total pseudo-mass (cell volume).
    let mut accum = [[0.0f32; 3]; 3];
    let mut total = 0.0f32;
    let mut hits = Vec::new();

    for i in 0..resolution {
        let x = bbox.min.x + (i as f32 + 0.5) * dx;
        for k in 0..resolution {
            let z = bbox.min.z + (k as f32 + 0.5) * dz;

            hits.clear();
            for poly in &sub.polygons {
                if let Some(y) = vertical_hit(poly, x, z) {
                    hits.push(y);
                }
            }
            hits.sort_by(f32::total_cmp);

            // Entry/exit pairs bound the solid slabs along the line.
            for pair in hits.chunks_exact(2) {
                let (y0, y1) = (pair[0], pair[1]);
                let h = y1 - y0;
                if h <= 0.0 {
                    continue;
                }
                let dm = dx * h * dz;
                let c = vec3(x, (y0 + y1) * 0.5, z);
                accumulate_cuboid(&mut accum, dm, c, dx, h, dz);
                total += dm;
            }
        }
    }

    if total <= 0.0 {
        log::warn!("inertia estimate found no enclosed volume; returning identity");
        return Mat3::IDENTITY;
    }

    let scale = mass / total;
    let tensor = Mat3::from_cols(
        vec3(accum[0][0], accum[1][0], accum[2][0]),
        vec3(accum[0][1], accum[1][1], accum[2][1]),
        vec3(accum[0][2], accum[1][2], accum[2][2]),
    ) * scale;
    tensor.inverse()
}

/// Height where the vertical line at (x, z) pierces `poly`'s plane, if the
/// hit falls inside the polygon's XZ footprint. Near-vertical faces are
/// skipped.
fn vertical_hit(poly: &crate::model::Polygon, x: f32, z: f32) -> Option<f32> {
    let n = poly.normal;
    if n.y.abs() < 1e-6 {
        return None;
    }
    if !point_in_footprint(poly, x, z) {
        return None;
    }
    let p0 = poly.verts.first()?.position;
    Some((n.dot(p0) - n.x * x - n.z * z) / n.y)
}

/// Even-odd crossing test against the polygon's XZ projection.
fn point_in_footprint(poly: &crate::model::Polygon, x: f32, z: f32) -> bool {
    let mut inside = false;
    let n = poly.verts.len();
    let mut j = n - 1;
    for i in 0..n {
        let a = poly.verts[i].position;
        let b = poly.verts[j].position;
        if (a.z > z) != (b.z > z) && x < (b.x - a.x) * (z - a.z) / (b.z - a.z) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Adds one cuboid slab's inertia about the model origin: the closed-form
/// center term plus the parallel-axis shift.
fn accumulate_cuboid(accum: &mut [[f32; 3]; 3], dm: f32, c: Vec3, w: f32, h: f32, d: f32) {
    let twelfth = dm / 12.0;
    accum[0][0] += twelfth * (h * h + d * d) + dm * (c.y * c.y + c.z * c.z);
    accum[1][1] += twelfth * (w * w + d * d) + dm * (c.x * c.x + c.z * c.z);
    accum[2][2] += twelfth * (w * w + h * h) + dm * (c.x * c.x + c.y * c.y);

    accum[0][1] -= dm * c.x * c.y;
    accum[1][0] -= dm * c.x * c.y;
    accum[0][2] -= dm * c.x * c.z;
    accum[2][0] -= dm * c.x * c.z;
    accum[1][2] -= dm * c.y * c.z;
    accum[2][1] -= dm * c.y * c.z;
}

#[cfg(test)]
mod inertia_tests {
    use super::*;
    use crate::model::{PolyVertex, Polygon};
    use glam::vec2;

    /// Axis-aligned cube of the given half-extent, outward-facing quads.
    fn cube(half: f32) -> SubModel {
        let mut sub = SubModel::with_name("cube");
        let h = half;
        let faces: [([Vec3; 4], Vec3); 6] = [
            (
                [vec3(-h, -h, h), vec3(h, -h, h), vec3(h, h, h), vec3(-h, h, h)],
                Vec3::Z,
            ),
            (
                [vec3(h, -h, -h), vec3(-h, -h, -h), vec3(-h, h, -h), vec3(h, h, -h)],
                Vec3::NEG_Z,
            ),
            (
                [vec3(h, -h, h), vec3(h, -h, -h), vec3(h, h, -h), vec3(h, h, h)],
                Vec3::X,
            ),
            (
                [vec3(-h, -h, -h), vec3(-h, -h, h), vec3(-h, h, h), vec3(-h, h, -h)],
                Vec3::NEG_X,
            ),
            (
                [vec3(-h, h, h), vec3(h, h, h), vec3(h, h, -h), vec3(-h, h, -h)],
                Vec3::Y,
            ),
            (
                [vec3(-h, -h, -h), vec3(h, -h, -h), vec3(h, -h, h), vec3(-h, -h, h)],
                Vec3::NEG_Y,
            ),
        ];
        for (corners, normal) in faces {
            let verts = corners
                .iter()
                .map(|&p| PolyVertex { position: p, normal, uv: vec2(0.0, 0.0) })
                .collect();
            sub.polygons.push(Polygon::new(verts, 0));
        }
        sub.recalc_bounds();
        sub
    }

    #[test]
    fn cube_matches_analytic_tensor() {
        // Cube of side 2, mass 3: I = m/12 * (s^2 + s^2) = 2 on each axis,
        // so the stored inverse is 0.5.
        let sub = cube(1.0);
        let moi = estimate_moi(&sub, 3.0, 20);

        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 0.5 } else { 0.0 };
                assert!(
                    (moi.col(j)[i] - expected).abs() < 0.02,
                    "element ({i},{j}) = {}",
                    moi.col(j)[i]
                );
            }
        }
    }

    #[test]
    fn flat_geometry_falls_back_to_identity() {
        let mut sub = SubModel::with_name("plate");
        let verts = [
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 1.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        ]
        .map(|p| PolyVertex { position: p, normal: Vec3::Z, uv: vec2(0.0, 0.0) });
        sub.polygons.push(Polygon::new(verts.to_vec(), 0));
        assert_eq!(estimate_moi(&sub, 1.0, 10), Mat3::IDENTITY);
    }

    #[test]
    fn fine_grid_tracks_the_analytic_tensor() {
        // Sampling noise rules out comparing grid resolutions against each
        // other; a fine grid must simply land near the closed-form value.
        let sub = cube(1.0);
        let fine = estimate_moi(&sub, 3.0, 40);
        for i in 0..3 {
            assert!((fine.col(i)[i] - 0.5).abs() < 1e-3, "diagonal {i} = {}", fine.col(i)[i]);
        }
    }
}
