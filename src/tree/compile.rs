//! Render-tree compiler: recursive centroid-median bisection of a submodel's
//! polygon set. All diagnostics live in a per-compile context threaded
//! through the recursion, so concurrent compiles never share state.

use glam::Vec3;

use crate::error::{PofError, Result};
use crate::math::BBox;
use crate::model::Polygon;

use super::consts::{GLOBAL_BBOX_PAD, MAX_TREE_DEPTH, SPREAD_EPSILON_FACTOR};
use super::{RenderNode, RenderNodeKind};

/// Diagnostics of one compile run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileStats {
    pub max_depth: u32,
    pub node_count: u32,
    pub leaf_count: u32,
}

struct Compiler<'a> {
    polys: &'a [Polygon],
    stats: CompileStats,
}

/// Builds the spatial partition over `polys`. The returned root node carries
/// the submodel's global bounding box padded by 0.1 on every axis.
pub fn compile(polys: &[Polygon]) -> Result<(RenderNode, CompileStats)> {
    if polys.is_empty() {
        return Ok((RenderNode::empty(), CompileStats::default()));
    }

    let global = BBox::from_points(
        polys.iter().flat_map(|p| p.verts.iter().map(|v| v.position)),
    )
    .pad(GLOBAL_BBOX_PAD);

    let mut compiler = Compiler { polys, stats: CompileStats::default() };
    let mut indices: Vec<usize> = (0..polys.len()).collect();
    let mut root = compiler.recurse(&mut indices, 1)?;

    // The renderer culls against the root box; hand it the padded global
    // bounds rather than the tight union.
    match &mut root.kind {
        RenderNodeKind::Leaf { bbox, .. } | RenderNodeKind::Split { bbox, .. } => *bbox = global,
        RenderNodeKind::Empty => {}
    }

    log::debug!(
        "compiled render tree: {} polys, {} nodes, depth {}",
        polys.len(),
        compiler.stats.node_count,
        compiler.stats.max_depth
    );
    Ok((root, compiler.stats))
}

impl<'a> Compiler<'a> {
    fn recurse(&mut self, indices: &mut [usize], depth: u32) -> Result<RenderNode> {
        if depth > MAX_TREE_DEPTH {
            return Err(PofError::CompileDepth { depth });
        }
        self.stats.max_depth = self.stats.max_depth.max(depth);
        self.stats.node_count += 1;

        if indices.len() == 1 {
            self.stats.leaf_count += 1;
            return Ok(RenderNode::leaf(self.poly_bounds(indices), indices.to_vec()));
        }

        let centroid_box = BBox::from_points(indices.iter().map(|&i| self.polys[i].center));
        let axis = centroid_box.greatest_axis();
        let spread = centroid_box.size(axis);
        let tolerance = SPREAD_EPSILON_FACTOR
            * f32::EPSILON
            * f32::max(axis.of(centroid_box.max).abs(), axis.of(centroid_box.min).abs());

        // Coplanar or coincident clusters cannot be usefully split; one leaf
        // takes the entire remaining set.
        if spread <= tolerance {
            self.stats.leaf_count += 1;
            return Ok(RenderNode::leaf(self.poly_bounds(indices), indices.to_vec()));
        }

        indices.sort_by(|&a, &b| {
            axis.of(self.polys[a].center).total_cmp(&axis.of(self.polys[b].center))
        });

        let median = indices.len() / 2;
        let lo = self.polys[indices[median - 1]].center;
        let hi = self.polys[indices[median]].center;
        let plane_point = (lo + hi) * 0.5;
        let plane_normal = axis.basis();

        let bbox = self.poly_bounds(indices);
        let (back_set, front_set) = indices.split_at_mut(median);
        let back = self.recurse(back_set, depth + 1)?;
        let front = self.recurse(front_set, depth + 1)?;

        Ok(RenderNode::split(plane_point, plane_normal, bbox, front, back))
    }

    fn poly_bounds(&self, indices: &[usize]) -> BBox {
        BBox::from_points(
            indices
                .iter()
                .flat_map(|&i| self.polys[i].verts.iter().map(|v| v.position)),
        )
    }
}

/// Split-plane sidedness: front children hold centroids at or past the
/// plane point on the split axis.
pub fn is_front_of(plane_point: Vec3, plane_normal: Vec3, centroid: Vec3) -> bool {
    (centroid - plane_point).dot(plane_normal) >= 0.0
}

#[cfg(test)]
mod compile_tests {
    use super::*;
    use crate::model::{PolyVertex, Polygon};
    use glam::{vec2, vec3};

    fn tri_at(center: Vec3) -> Polygon {
        let offsets = [vec3(-0.1, -0.1, 0.0), vec3(0.1, -0.1, 0.0), vec3(0.0, 0.1, 0.0)];
        Polygon::new(
            offsets
                .iter()
                .map(|&o| PolyVertex { position: center + o, normal: Vec3::Z, uv: vec2(0.0, 0.0) })
                .collect(),
            0,
        )
    }

    fn check_sidedness(node: &RenderNode, polys: &[Polygon]) {
        if let RenderNodeKind::Split { plane_point, plane_normal, front, back, .. } = &node.kind {
            for &i in &front.flatten() {
                assert!(is_front_of(*plane_point, *plane_normal, polys[i].center));
            }
            for &i in &back.flatten() {
                assert!(!is_front_of(*plane_point, *plane_normal, polys[i].center));
            }
            check_sidedness(front, polys);
            check_sidedness(back, polys);
        }
    }

    #[test]
    fn single_polygon_compiles_to_leaf() {
        let polys = vec![tri_at(Vec3::ZERO)];
        let (root, stats) = compile(&polys).unwrap();
        assert!(matches!(root.kind, RenderNodeKind::Leaf { .. }));
        assert_eq!(stats.leaf_count, 1);
        // Root carries the padded global box.
        assert!(root.bbox().min.x <= -0.1 - 0.09);
    }

    #[test]
    fn flatten_is_a_permutation() {
        let polys: Vec<Polygon> = (0..37)
            .map(|i| tri_at(vec3(i as f32 * 1.5, (i % 5) as f32, (i % 3) as f32 * 2.0)))
            .collect();
        let (root, _) = compile(&polys).unwrap();

        let mut flat = root.flatten();
        flat.sort_unstable();
        assert_eq!(flat, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn split_planes_separate_centroids() {
        let polys: Vec<Polygon> = (0..24)
            .map(|i| {
                tri_at(vec3(
                    (i * 7 % 13) as f32 + i as f32 * 0.001,
                    (i * 5 % 11) as f32 + i as f32 * 0.002,
                    i as f32,
                ))
            })
            .collect();
        let (root, _) = compile(&polys).unwrap();
        check_sidedness(&root, &polys);
    }

    #[test]
    fn near_planar_disc_falls_back_to_single_leaf() {
        // A large flat disc fan: recursion must bottom out long before the
        // depth cap, and a cluster with coincident centroids must collapse
        // into a single leaf via the spread tolerance.
        let n = 400;
        let mut polys = Vec::new();
        for i in 0..n {
            let a = i as f32 / n as f32 * std::f32::consts::TAU;
            let b = (i + 1) as f32 / n as f32 * std::f32::consts::TAU;
            polys.push(Polygon::new(
                vec![
                    PolyVertex { position: Vec3::ZERO, normal: Vec3::Y, uv: vec2(0.0, 0.0) },
                    PolyVertex { position: vec3(a.cos(), 0.0, a.sin()), normal: Vec3::Y, uv: vec2(0.0, 0.0) },
                    PolyVertex { position: vec3(b.cos(), 0.0, b.sin()), normal: Vec3::Y, uv: vec2(0.0, 0.0) },
                ],
                0,
            ));
        }
        let (root, stats) = compile(&polys).unwrap();
        assert!(stats.max_depth <= 30);
        assert_eq!(root.flatten().len(), n);

        // A truly coincident cluster is one leaf.
        let stacked: Vec<Polygon> = (0..16).map(|_| tri_at(Vec3::ZERO)).collect();
        let (root, stats) = compile(&stacked).unwrap();
        assert!(matches!(root.kind, RenderNodeKind::Leaf { ref polys, .. } if polys.len() == 16));
        assert_eq!(stats.max_depth, 1);
    }
}
