//! Polygon cleanup ahead of render-tree compilation: duplicate vertices are
//! dropped, concave and non-planar rings are split along interior diagonals,
//! and oversized rings are bisected to bound downstream record sizes.

use glam::Vec3;

use crate::error::{PofError, Result};
use crate::model::Polygon;

/// A vertex whose normalized local normal falls below this cosine against
/// the aggregate normal is treated as non-planar.
const PLANAR_COS_TOLERANCE: f32 = 0.999;

/// Rings longer than this are bisected regardless of convexity.
const MAX_POLY_VERTS: usize = 20;

/// Runs [`repair_polygon`] over a whole polygon list.
pub fn repair_polygons(polys: &[Polygon]) -> Result<Vec<Polygon>> {
    let mut out = Vec::with_capacity(polys.len());
    for poly in polys {
        repair_polygon(poly, &mut out)?;
    }
    Ok(out)
}

/// Appends the repaired equivalent of `poly` to `out`: one unchanged polygon
/// if it is already planar and convex, otherwise the convex planar pieces it
/// splits into. Degenerate rings (fewer than three distinct vertices) are
/// dropped. Fails with [`PofError::UnsplittableGeometry`] when a flagged ring
/// admits no acceptable diagonal.
pub fn repair_polygon(poly: &Polygon, out: &mut Vec<Polygon>) -> Result<()> {
    let mut poly = poly.clone();
    drop_duplicate_verts(&mut poly);
    if poly.verts.len() < 3 {
        log::debug!("dropping degenerate polygon with {} distinct verts", poly.verts.len());
        return Ok(());
    }
    repair_inner(poly, out)
}

fn repair_inner(poly: Polygon, out: &mut Vec<Polygon>) -> Result<()> {
    let n = poly.verts.len();

    if n > MAX_POLY_VERTS {
        let (a, b) = split(&poly, 0, n / 2);
        repair_inner(a, out)?;
        return repair_inner(b, out);
    }
    if n == 3 {
        out.push(poly);
        return Ok(());
    }

    let aggregate = poly.newell_normal();
    let flagged = flagged_verts(&poly, aggregate);
    if flagged.is_empty() {
        out.push(poly);
        return Ok(());
    }

    let (i, j) = if flagged.len() == 1 {
        // A lone flagged vertex splits straight to its antipode.
        let i = flagged[0];
        let j = (i + n / 2) % n;
        (i.min(j), i.max(j))
    } else {
        find_diagonal(&poly, aggregate, &flagged)?
    };

    let (a, b) = split(&poly, i, j);
    repair_inner(a, out)?;
    repair_inner(b, out)
}

fn drop_duplicate_verts(poly: &mut Polygon) {
    poly.verts.dedup_by(|b, a| a.position == b.position);
    while poly.verts.len() > 1
        && poly.verts.first().map(|v| v.position) == poly.verts.last().map(|v| v.position)
    {
        poly.verts.pop();
    }
}

/// Indices whose local edge-cross normal marks them concave (non-positive
/// dot with the aggregate) or non-planar (below the cosine tolerance).
fn flagged_verts(poly: &Polygon, aggregate: Vec3) -> Vec<usize> {
    let n = poly.verts.len();
    (0..n)
        .filter(|&i| {
            let prev = poly.verts[(i + n - 1) % n].position;
            let cur = poly.verts[i].position;
            let next = poly.verts[(i + 1) % n].position;
            let local = (cur - prev).cross(next - cur);
            local.dot(aggregate) <= 0.0
                || local.normalize_or_zero().dot(aggregate) < PLANAR_COS_TOLERANCE
        })
        .collect()
}

/// Searches for an acceptable interior diagonal: flagged-to-flagged pairs
/// first, then flagged-to-any. A candidate must be non-adjacent, must not
/// cross any existing edge, and must not worsen the interior angle at either
/// endpoint.
fn find_diagonal(poly: &Polygon, aggregate: Vec3, flagged: &[usize]) -> Result<(usize, usize)> {
    let n = poly.verts.len();
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for (k, &a) in flagged.iter().enumerate() {
        for &b in &flagged[k + 1..] {
            candidates.push((a, b));
        }
    }
    for &a in flagged {
        for b in 0..n {
            if !flagged.contains(&b) {
                candidates.push((a.min(b), a.max(b)));
            }
        }
    }

    for (a, b) in candidates {
        let gap = (b + n - a) % n;
        if gap < 2 || gap > n - 2 {
            continue; // adjacent
        }
        if crosses_any_edge(poly, aggregate, a, b) {
            continue;
        }
        if angle_acceptable(poly, a, b) && angle_acceptable(poly, b, a) {
            return Ok((a, b));
        }
    }
    Err(PofError::UnsplittableGeometry)
}

/// Tests the candidate diagonal against every edge not sharing an endpoint,
/// in the 2D projection perpendicular to the aggregate normal.
fn crosses_any_edge(poly: &Polygon, aggregate: Vec3, a: usize, b: usize) -> bool {
    let n = poly.verts.len();
    let (u, v) = plane_basis(aggregate);
    let project = |p: Vec3| (p.dot(u), p.dot(v));

    let pa = project(poly.verts[a].position);
    let pb = project(poly.verts[b].position);

    for e in 0..n {
        let f = (e + 1) % n;
        if e == a || e == b || f == a || f == b {
            continue;
        }
        let pe = project(poly.verts[e].position);
        let pf = project(poly.verts[f].position);
        if segments_cross(pa, pb, pe, pf) {
            return true;
        }
    }
    false
}

fn plane_basis(normal: Vec3) -> (Vec3, Vec3) {
    let helper = if normal.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    let u = normal.cross(helper).normalize_or_zero();
    let v = normal.cross(u);
    (u, v)
}

fn segments_cross(a: (f32, f32), b: (f32, f32), c: (f32, f32), d: (f32, f32)) -> bool {
    fn orient(p: (f32, f32), q: (f32, f32), r: (f32, f32)) -> f32 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }
    let d1 = orient(a, b, c);
    let d2 = orient(a, b, d);
    let d3 = orient(c, d, a);
    let d4 = orient(c, d, b);
    (d1 * d2 < 0.0) && (d3 * d4 < 0.0)
}

/// True when splitting at `at` towards `to` leaves both replacement interior
/// angles no larger than the original.
fn angle_acceptable(poly: &Polygon, at: usize, to: usize) -> bool {
    let n = poly.verts.len();
    let prev = poly.verts[(at + n - 1) % n].position;
    let cur = poly.verts[at].position;
    let next = poly.verts[(at + 1) % n].position;
    let diag = poly.verts[to].position;

    let angle = |a: Vec3, b: Vec3| {
        a.normalize_or_zero().dot(b.normalize_or_zero()).clamp(-1.0, 1.0).acos()
    };
    let original = angle(prev - cur, next - cur);
    angle(prev - cur, diag - cur) <= original + 1e-5 && angle(diag - cur, next - cur) <= original + 1e-5
}

/// Splits the ring along the diagonal `i..j` (i < j). Both halves keep the
/// original texture and color; normals and centroids are recomputed.
fn split(poly: &Polygon, i: usize, j: usize) -> (Polygon, Polygon) {
    let first = poly.verts[i..=j].to_vec();
    let mut second = poly.verts[j..].to_vec();
    second.extend_from_slice(&poly.verts[..=i]);

    let remake = |verts| {
        let mut p = Polygon::new(verts, poly.texture);
        p.color = poly.color;
        p
    };
    (remake(first), remake(second))
}

#[cfg(test)]
mod repair_tests {
    use super::*;
    use crate::model::PolyVertex;
    use glam::{vec2, vec3};

    fn ring(points: &[Vec3]) -> Polygon {
        Polygon::new(
            points
                .iter()
                .map(|&p| PolyVertex { position: p, normal: Vec3::Z, uv: vec2(0.0, 0.0) })
                .collect(),
            0,
        )
    }

    /// Sum of per-polygon areas via the Newell vector magnitude.
    fn area(polys: &[Polygon]) -> f32 {
        polys
            .iter()
            .map(|p| {
                let n = p.verts.len();
                let mut sum = Vec3::ZERO;
                for i in 0..n {
                    let a = p.verts[i].position;
                    let b = p.verts[(i + 1) % n].position;
                    sum += a.cross(b);
                }
                sum.length() * 0.5
            })
            .sum()
    }

    #[test]
    fn convex_planar_quad_is_unchanged() {
        let quad = ring(&[
            vec3(0.0, 0.0, 0.0),
            vec3(2.0, 0.0, 0.0),
            vec3(2.0, 2.0, 0.0),
            vec3(0.0, 2.0, 0.0),
        ]);
        let mut out = Vec::new();
        repair_polygon(&quad, &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], quad);
    }

    #[test]
    fn triangle_is_never_split() {
        let tri = ring(&[Vec3::ZERO, vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)]);
        let mut out = Vec::new();
        repair_polygon(&tri, &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], tri);
    }

    #[test]
    fn reflex_quad_splits_into_two_of_equal_area() {
        // Concave at (0.5, 0.5).
        let quad = ring(&[
            vec3(0.0, 0.0, 0.0),
            vec3(2.0, 0.0, 0.0),
            vec3(0.5, 0.5, 0.0),
            vec3(0.0, 2.0, 0.0),
        ]);
        let before = area(std::slice::from_ref(&quad));

        let mut out = Vec::new();
        repair_polygon(&quad, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.verts.len() == 3));
        assert!((area(&out) - before).abs() < 1e-5);
    }

    #[test]
    fn non_planar_quad_splits() {
        let quad = ring(&[
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 1.0, 0.5),
            vec3(0.0, 1.0, 0.0),
        ]);
        let mut out = Vec::new();
        repair_polygon(&quad, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.verts.len() == 3));
    }

    #[test]
    fn oversized_ring_is_bisected() {
        let n = 24;
        let points: Vec<Vec3> = (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                vec3(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let mut out = Vec::new();
        repair_polygon(&ring(&points), &mut out).unwrap();
        assert!(out.len() >= 2);
        assert!(out.iter().all(|p| p.verts.len() <= MAX_POLY_VERTS));
        // The circle's area survives the cuts.
        let before = area(std::slice::from_ref(&ring(&points)));
        assert!((area(&out) - before).abs() < 1e-4);
    }

    #[test]
    fn duplicate_vertices_are_dropped() {
        let quad = ring(&[
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 1.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        ]);
        let mut out = Vec::new();
        repair_polygon(&quad, &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].verts.len(), 4);
    }

    #[test]
    fn fully_degenerate_ring_is_dropped() {
        let sliver = ring(&[Vec3::ZERO, Vec3::ZERO, vec3(1.0, 0.0, 0.0)]);
        let mut out = Vec::new();
        repair_polygon(&sliver, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
