//! Affine transform propagation over a submodel subtree and every attached
//! metadata kind. Two phases: global-space metadata (AI path vertices,
//! running-light points) is captured relative to its anchor submodel before
//! any coordinate changes, then re-anchored after the geometry has moved.

use glam::{Mat3, Mat4, Vec3};

use crate::model::ModelDocument;

struct Ctx {
    linear: Mat3,
    /// Inverse-transpose of the linear part: preserves rotations, inverts
    /// scales, which is the proper transformation for normals.
    normal: Mat3,
    /// Negative determinant (mirroring) reverses winding to keep faces
    /// outward.
    reverse: bool,
}

impl Ctx {
    fn new(matrix: Mat4) -> Ctx {
        let linear = Mat3::from_mat4(matrix);
        let det = linear.determinant();
        if det == 0.0 {
            log::warn!("transform matrix is singular; normals will collapse");
        }
        Ctx {
            linear,
            normal: linear.inverse().transpose(),
            reverse: det < 0.0,
        }
    }

    fn point(&self, p: Vec3) -> Vec3 {
        self.linear * p
    }

    fn direction(&self, n: Vec3) -> Vec3 {
        (self.normal * n).normalize_or_zero()
    }
}

/// Anchored global-space metadata captured in phase 1: offsets of each point
/// relative to its anchor submodel's absolute pivot.
struct Anchored {
    glow_banks: Vec<(usize, usize, Vec<Vec3>)>,
    paths: Vec<(usize, usize, Vec<Vec3>)>,
}

fn capture_anchored(doc: &ModelDocument, members: &[usize]) -> Anchored {
    let mut glow_banks = Vec::new();
    for (i, bank) in doc.glow_banks.iter().enumerate() {
        let anchor = bank.parent as usize;
        if bank.parent >= 0 && members.contains(&anchor) {
            let base = doc.abs_offset(anchor);
            glow_banks.push((i, anchor, bank.points.iter().map(|p| p.position - base).collect()));
        }
    }

    let mut paths = Vec::new();
    for (i, path) in doc.paths.iter().enumerate() {
        if let Some(anchor) = doc.submodel_by_name(&path.parent) {
            if members.contains(&anchor) {
                let base = doc.abs_offset(anchor);
                paths.push((i, anchor, path.points.iter().map(|p| p.position - base).collect()));
            }
        }
    }

    Anchored { glow_banks, paths }
}

fn reanchor(doc: &mut ModelDocument, captured: Anchored, ctx: &Ctx) {
    for (bank, anchor, rels) in captured.glow_banks {
        let base = doc.abs_offset(anchor);
        let points = &mut doc.glow_banks[bank].points;
        for (point, rel) in points.iter_mut().zip(rels) {
            point.position = base + ctx.point(rel);
            point.normal = ctx.direction(point.normal);
        }
    }
    for (path, anchor, rels) in captured.paths {
        let base = doc.abs_offset(anchor);
        for (point, rel) in doc.paths[path].points.iter_mut().zip(rels) {
            point.position = base + ctx.point(rel);
        }
    }
}

/// Transforms the vertex geometry of the listed submodels, parent before
/// child. The first member is the subtree root; its pivot moves only when
/// `transform_root_pivot` is set.
fn transform_geometry(doc: &mut ModelDocument, members: &[usize], transform_root_pivot: bool, ctx: &Ctx) {
    for (k, &idx) in members.iter().enumerate() {
        let sub = &mut doc.submodels[idx];
        if k > 0 || transform_root_pivot {
            sub.offset = ctx.point(sub.offset);
        }
        for poly in &mut sub.polygons {
            for vert in &mut poly.verts {
                vert.position = ctx.point(vert.position);
                vert.normal = ctx.direction(vert.normal);
            }
            poly.normal = ctx.direction(poly.normal);
            if ctx.reverse {
                poly.reverse_winding();
            }
            poly.recalc_center_radius();
        }
        sub.recalc_bounds();
        doc.mark_geometry_changed(idx);
    }
}

/// Submodel-keyed local-space metadata: turret normals and firing points,
/// eye points. Each entry transforms exactly once, with the subtree that
/// owns its submodel.
fn transform_keyed(doc: &mut ModelDocument, members: &[usize], ctx: &Ctx) {
    for turret in &mut doc.turrets {
        if turret.physical_parent >= 0 && members.contains(&(turret.physical_parent as usize)) {
            turret.normal = ctx.direction(turret.normal);
            for point in &mut turret.fire_points {
                *point = ctx.point(*point);
            }
        }
    }
    for eye in &mut doc.eyes {
        if eye.submodel >= 0 && members.contains(&(eye.submodel as usize)) {
            eye.offset = ctx.point(eye.offset);
            eye.normal = ctx.direction(eye.normal);
        }
    }
}

/// Applies `matrix`'s linear part to the subtree rooted at `root`: the
/// root's own geometry around its unchanged pivot, descendants' pivots and
/// geometry, and every metadata kind keyed into the subtree.
pub fn transform_subtree(doc: &mut ModelDocument, root: usize, matrix: Mat4) {
    let ctx = Ctx::new(matrix);
    let members = doc.subtree(root);

    let captured = capture_anchored(doc, &members);
    transform_geometry(doc, &members, false, &ctx);
    transform_keyed(doc, &members, &ctx);
    reanchor(doc, captured, &ctx);
}

/// Applies `matrix`'s linear part to the whole document: every submodel
/// (root pivots included), every metadata kind, mass scaled by the absolute
/// determinant, and the header bounds recomputed.
pub fn transform_document(doc: &mut ModelDocument, matrix: Mat4) {
    let ctx = Ctx::new(matrix);
    let members: Vec<usize> = {
        let roots: Vec<usize> = doc.roots().collect();
        roots.iter().flat_map(|&r| doc.subtree(r)).collect()
    };

    let captured = capture_anchored(doc, &members);
    transform_geometry(doc, &members, true, &ctx);
    transform_keyed(doc, &members, &ctx);
    reanchor(doc, captured, &ctx);

    // Paths whose parent name resolves to no submodel are still model-space
    // geometry and move with everything else.
    let unanchored: Vec<usize> = doc
        .paths
        .iter()
        .enumerate()
        .filter(|(_, p)| doc.submodel_by_name(&p.parent).is_none())
        .map(|(i, _)| i)
        .collect();
    for i in unanchored {
        for point in &mut doc.paths[i].points {
            point.position = ctx.point(point.position);
        }
    }

    for special in &mut doc.specials {
        special.position = ctx.point(special.position);
    }
    for dock in &mut doc.docks {
        for point in &mut dock.points {
            point.position = ctx.point(point.position);
            point.normal = ctx.direction(point.normal);
        }
    }
    for bank in &mut doc.thrusters {
        for glow in &mut bank.glows {
            glow.position = ctx.point(glow.position);
            glow.normal = ctx.direction(glow.normal);
        }
    }
    for vert in &mut doc.shield.verts {
        *vert = ctx.point(*vert);
    }
    for face in &mut doc.shield.faces {
        face.normal = ctx.direction(face.normal);
        if ctx.reverse {
            face.verts.swap(1, 2);
            face.neighbors.swap(1, 2);
        }
    }
    for insignia in &mut doc.insignias {
        insignia.offset = ctx.point(insignia.offset);
        for vert in &mut insignia.verts {
            *vert = ctx.point(*vert);
        }
    }
    doc.auto_center = ctx.point(doc.auto_center);
    doc.header.mass_center = ctx.point(doc.header.mass_center);

    doc.header.mass *= ctx.linear.determinant().abs();
    doc.recalc_bounds();
}

#[cfg(test)]
mod transform_tests {
    use super::*;
    use crate::model::{
        AiPath, GlowBank, GlowPoint, PathPoint, PolyVertex, Polygon, SubModel, Turret, TurretKind,
    };
    use glam::{vec2, vec3};

    fn quad(at: Vec3) -> Polygon {
        let verts = [
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 1.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        ]
        .map(|p| PolyVertex { position: p + at, normal: Vec3::Z, uv: vec2(0.0, 0.0) });
        Polygon::new(verts.to_vec(), 0)
    }

    fn sample_doc() -> ModelDocument {
        let mut doc = ModelDocument::new();
        let mut hull = SubModel::with_name("hull");
        hull.polygons.push(quad(Vec3::ZERO));
        doc.push_submodel(hull);

        let mut fin = SubModel::with_name("fin");
        fin.parent = 0;
        fin.offset = vec3(1.0, 0.0, 0.0);
        fin.polygons.push(quad(vec3(0.0, 0.5, 0.0)));
        doc.push_submodel(fin);

        doc.header.mass = 3.0;
        doc.turrets.push(Turret {
            kind: TurretKind::Gun,
            parent: 1,
            physical_parent: 1,
            normal: Vec3::Y,
            fire_points: vec![vec3(0.5, 0.5, 0.0)],
        });
        doc.glow_banks.push(GlowBank {
            parent: 1,
            points: vec![GlowPoint { position: vec3(1.5, 0.0, 0.0), ..Default::default() }],
            ..Default::default()
        });
        doc.paths.push(AiPath {
            name: "$path01".into(),
            parent: "fin".into(),
            points: vec![PathPoint { position: vec3(1.0, 2.0, 0.0), radius: 1.0, turrets: vec![] }],
        });
        doc.recalc_bounds();
        doc
    }

    fn positions(doc: &ModelDocument) -> Vec<Vec3> {
        doc.submodels
            .iter()
            .flat_map(|s| s.polygons.iter().flat_map(|p| p.verts.iter().map(|v| v.position)))
            .collect()
    }

    #[test]
    fn identity_is_a_noop() {
        let mut doc = sample_doc();
        let before = doc.clone();
        transform_document(&mut doc, Mat4::IDENTITY);

        assert_eq!(positions(&doc), positions(&before));
        assert_eq!(doc.header.mass, before.header.mass);
        assert_eq!(doc.header.bbox, before.header.bbox);
        assert_eq!(doc.submodels[1].offset, before.submodels[1].offset);
        assert_eq!(doc.turrets[0].fire_points, before.turrets[0].fire_points);
        assert_eq!(doc.glow_banks[0].points[0].position, before.glow_banks[0].points[0].position);
        assert_eq!(doc.paths[0].points[0].position, before.paths[0].points[0].position);
    }

    #[test]
    fn inverse_undoes_transform() {
        let mut doc = sample_doc();
        let before = positions(&doc);
        let mass = doc.header.mass;

        let m = Mat4::from_scale(vec3(2.0, 0.5, 1.5))
            * Mat4::from_rotation_y(0.7)
            * Mat4::from_rotation_x(-0.3);
        transform_document(&mut doc, m);
        transform_document(&mut doc, m.inverse());

        for (a, b) in positions(&doc).iter().zip(&before) {
            assert!(a.distance(*b) < 1e-4, "{a} vs {b}");
        }
        assert!((doc.header.mass - mass).abs() < 1e-4);
    }

    #[test]
    fn mirror_reverses_winding_and_keeps_faces_outward() {
        let mut doc = sample_doc();
        let mirror = Mat4::from_scale(vec3(1.0, 1.0, -1.0));
        transform_document(&mut doc, mirror);

        for sub in &doc.submodels {
            for poly in &sub.polygons {
                // The stored normal flips to -Z and the reversed ring's own
                // winding agrees with it.
                assert!(poly.normal.distance(Vec3::NEG_Z) < 1e-5);
                assert!(poly.newell_normal().distance(poly.normal) < 1e-5);
            }
        }
        // |det| = 1: mass unchanged.
        assert!((doc.header.mass - 3.0).abs() < 1e-6);
    }

    #[test]
    fn mass_scales_with_determinant() {
        let mut doc = sample_doc();
        transform_document(&mut doc, Mat4::from_scale(Vec3::splat(2.0)));
        assert!((doc.header.mass - 24.0).abs() < 1e-4);
    }

    #[test]
    fn anchored_points_follow_their_submodel() {
        let mut doc = sample_doc();
        // Glow point sits 0.5 ahead of the fin pivot (abs x = 1.0).
        transform_document(&mut doc, Mat4::from_scale(Vec3::splat(2.0)));

        // Fin pivot scaled to x=2; the relative half-unit scaled to one.
        assert!(doc.glow_banks[0].points[0].position.distance(vec3(3.0, 0.0, 0.0)) < 1e-5);
        // Path point: rel (0, 2, 0) from the fin doubles.
        assert!(doc.paths[0].points[0].position.distance(vec3(2.0, 4.0, 0.0)) < 1e-5);
    }

    #[test]
    fn subtree_transform_leaves_the_rest_alone() {
        let mut doc = sample_doc();
        let hull_before = doc.submodels[0].polygons[0].clone();
        transform_subtree(&mut doc, 1, Mat4::from_scale(Vec3::splat(3.0)));

        assert_eq!(doc.submodels[0].polygons[0], hull_before);
        // Root pivot of the transformed subtree is carried through unchanged.
        assert_eq!(doc.submodels[1].offset, vec3(1.0, 0.0, 0.0));
        assert!(doc.submodels[1].polygons[0].verts[2].position.distance(vec3(3.0, 4.5, 0.0)) < 1e-5);
        assert!(doc.render_cache[1].changed);
    }
}
