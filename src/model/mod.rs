pub mod header;
pub mod meta;
pub mod submodel;

use glam::Vec3;

use crate::math::BBox;
pub use header::{CrossSection, ModelHeader};
pub use meta::*;
pub use submodel::{MovementAxis, MovementType, PolyVertex, Polygon, SubModel, NO_PARENT, UNTEXTURED};

/// Per-submodel compiled render-tree cache entry. `data` holds the packed
/// bytes in target-engine convention, exactly as embedded on disk. `changed`
/// is set by any geometry mutation and cleared only after a successful
/// recompile.
#[derive(Debug, Clone, Default)]
pub struct RenderCache {
    pub data: Vec<u8>,
    pub changed: bool,
}

/// The in-memory scene graph: header metadata, texture table, submodel
/// forest and every auxiliary collection. The render cache list always
/// mirrors the submodel list 1:1.
#[derive(Debug, Clone, Default)]
pub struct ModelDocument {
    pub header: ModelHeader,
    pub textures: Vec<String>,
    pub submodels: Vec<SubModel>,
    pub render_cache: Vec<RenderCache>,

    pub eyes: Vec<EyePoint>,
    pub specials: Vec<SpecialPoint>,
    pub primary_banks: Vec<WeaponBank>,
    pub secondary_banks: Vec<WeaponBank>,
    pub turrets: Vec<Turret>,
    pub docks: Vec<Dock>,
    pub thrusters: Vec<ThrusterBank>,
    pub shield: ShieldMesh,
    pub insignias: Vec<Insignia>,
    pub paths: Vec<AiPath>,
    pub glow_banks: Vec<GlowBank>,
    pub auto_center: Vec3,
    /// Build-info strings round-tripped through the PINF chunk.
    pub pof_info: Vec<String>,
}

impl ModelDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a submodel and its (dirty) cache slot; returns the new index.
    pub fn push_submodel(&mut self, mut sub: SubModel) -> i32 {
        sub.recalc_bounds();
        for poly in &mut sub.polygons {
            poly.recalc_center_radius();
        }
        self.submodels.push(sub);
        self.render_cache.push(RenderCache { data: Vec::new(), changed: true });
        self.submodels.len() as i32 - 1
    }

    /// Adds `name` to the texture table, deduplicating case-insensitively.
    /// Returns the index the name lives at.
    pub fn add_texture(&mut self, name: &str) -> i32 {
        if let Some(i) = self.textures.iter().position(|t| t.eq_ignore_ascii_case(name)) {
            return i as i32;
        }
        self.textures.push(name.to_string());
        self.textures.len() as i32 - 1
    }

    /// Marks a submodel's cached render tree stale. Every geometry mutation
    /// must pass through here.
    pub fn mark_geometry_changed(&mut self, idx: usize) {
        self.render_cache[idx].changed = true;
    }

    pub fn children(&self, idx: i32) -> impl Iterator<Item = usize> + '_ {
        self.submodels
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.parent == idx)
            .map(|(i, _)| i)
    }

    /// Submodel indices of the subtree rooted at `root`, parent before child.
    pub fn subtree(&self, root: usize) -> Vec<usize> {
        let mut out = vec![root];
        let mut cursor = 0;
        while cursor < out.len() {
            let parent = out[cursor] as i32;
            out.extend(self.children(parent));
            cursor += 1;
        }
        out
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.submodels
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_root())
            .map(|(i, _)| i)
    }

    /// Pivot position of `idx` in model space: the sum of offsets up the
    /// parent chain.
    pub fn abs_offset(&self, mut idx: usize) -> Vec3 {
        let mut out = Vec3::ZERO;
        loop {
            let sub = &self.submodels[idx];
            out += sub.offset;
            if sub.is_root() {
                return out;
            }
            idx = sub.parent as usize;
        }
    }

    /// Case-insensitive name lookup, tolerating one leading alias character
    /// on either side ("$engine" matches "engine").
    pub fn submodel_by_name(&self, name: &str) -> Option<usize> {
        fn matches(a: &str, b: &str) -> bool {
            a.eq_ignore_ascii_case(b)
                || a.get(1..).is_some_and(|t| t.eq_ignore_ascii_case(b))
                || b.get(1..).is_some_and(|t| a.eq_ignore_ascii_case(t))
        }
        self.submodels.iter().position(|s| matches(&s.name, name))
    }

    /// Deletes submodel `idx`: children reparent to its former parent (their
    /// pivots absorb the deleted pivot so nothing moves), the cache slot is
    /// dropped in lockstep, and every submodel cross-reference is renumbered.
    pub fn delete_submodel(&mut self, idx: usize) {
        let deleted = idx as i32;
        let former_parent = self.submodels[idx].parent;
        let former_offset = self.submodels[idx].offset;

        for sub in &mut self.submodels {
            if sub.parent == deleted {
                sub.parent = former_parent;
                sub.offset += former_offset;
            }
        }

        self.submodels.remove(idx);
        self.render_cache.remove(idx);

        // Shift every index above the hole down by one; direct references to
        // the deleted submodel become the sentinel (or vanish from lists).
        let fix = |r: &mut i32| {
            if *r == deleted {
                *r = NO_PARENT;
            } else if *r > deleted {
                *r -= 1;
            }
        };
        let fix_list = |list: &mut Vec<i32>| {
            list.retain(|&r| r != deleted);
            for r in list.iter_mut() {
                if *r > deleted {
                    *r -= 1;
                }
            }
        };

        for sub in &mut self.submodels {
            fix(&mut sub.parent);
        }
        fix_list(&mut self.header.detail_levels);
        fix_list(&mut self.header.debris);
        for turret in &mut self.turrets {
            fix(&mut turret.parent);
            fix(&mut turret.physical_parent);
        }
        for eye in &mut self.eyes {
            fix(&mut eye.submodel);
        }
        for bank in &mut self.glow_banks {
            fix(&mut bank.parent);
        }
        for path in &mut self.paths {
            for point in &mut path.points {
                fix_list(&mut point.turrets);
            }
        }
    }

    /// Recomputes the header bounding box and radius as the union over every
    /// submodel's geometry placed at its absolute pivot. Author overrides are
    /// left in place and win through `effective_*`.
    pub fn recalc_bounds(&mut self) {
        let mut bbox: Option<BBox> = None;
        let mut radius = 0.0f32;
        for idx in 0..self.submodels.len() {
            let at = self.abs_offset(idx);
            for poly in &self.submodels[idx].polygons {
                for vert in &poly.verts {
                    let p = vert.position + at;
                    match &mut bbox {
                        Some(b) => b.expand_point(p),
                        None => bbox = Some(BBox::new(p, p)),
                    }
                    radius = radius.max(p.length());
                }
            }
        }
        self.header.bbox = bbox.unwrap_or_default();
        self.header.radius = radius;
    }
}

#[cfg(test)]
mod document_tests {
    use super::*;
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

    fn doc_with_chain(n: usize) -> ModelDocument {
        let mut doc = ModelDocument::new();
        for i in 0..n {
            let mut sub = SubModel::with_name(&format!("piece{i}"));
            sub.parent = i as i32 - 1;
            sub.offset = vec3(1.0, 0.0, 0.0);
            sub.polygons.push(quad(Vec3::ZERO));
            doc.push_submodel(sub);
        }
        doc
    }

    #[test]
    fn texture_table_dedups_case_insensitively() {
        let mut doc = ModelDocument::new();
        assert_eq!(doc.add_texture("hull"), 0);
        assert_eq!(doc.add_texture("glass"), 1);
        assert_eq!(doc.add_texture("HULL"), 0);
        assert_eq!(doc.textures.len(), 2);
    }

    #[test]
    fn cache_list_mirrors_submodels() {
        let mut doc = doc_with_chain(3);
        assert_eq!(doc.render_cache.len(), 3);
        assert!(doc.render_cache.iter().all(|c| c.changed));
        doc.delete_submodel(1);
        assert_eq!(doc.render_cache.len(), 2);
    }

    #[test]
    fn delete_renumbers_references_and_reparents() {
        // Five submodels; 0 is the root, 1..4 chained below it in pairs.
        let mut doc = ModelDocument::new();
        for (i, parent) in [(-1), 0, 0, 2, 2].iter().enumerate() {
            let mut sub = SubModel::with_name(&format!("piece{i}"));
            sub.parent = *parent;
            doc.push_submodel(sub);
        }
        doc.header.detail_levels = vec![0];
        doc.header.debris = vec![3, 4];
        doc.turrets.push(Turret {
            kind: TurretKind::Gun,
            parent: 3,
            physical_parent: 4,
            normal: Vec3::Y,
            fire_points: vec![Vec3::ZERO],
        });
        doc.eyes.push(EyePoint { submodel: 2, ..Default::default() });
        doc.glow_banks.push(GlowBank { parent: 4, ..Default::default() });
        doc.paths.push(AiPath {
            name: "$path01".into(),
            parent: "piece0".into(),
            points: vec![PathPoint { turrets: vec![2, 3], ..Default::default() }],
        });

        doc.delete_submodel(2);

        // References to 3 and 4 move down to 2 and 3; 2's children hang off
        // 2's former parent.
        assert_eq!(doc.submodels.len(), 4);
        assert_eq!(doc.header.debris, vec![2, 3]);
        assert_eq!(doc.turrets[0].parent, 2);
        assert_eq!(doc.turrets[0].physical_parent, 3);
        assert_eq!(doc.eyes[0].submodel, NO_PARENT);
        assert_eq!(doc.glow_banks[0].parent, 3);
        assert_eq!(doc.paths[0].points[0].turrets, vec![2]);
        assert_eq!(doc.submodels[2].parent, 0);
        assert_eq!(doc.submodels[3].parent, 0);
    }

    #[test]
    fn subtree_is_parent_before_child() {
        let doc = doc_with_chain(4);
        assert_eq!(doc.subtree(0), vec![0, 1, 2, 3]);
        assert_eq!(doc.subtree(2), vec![2, 3]);
    }

    #[test]
    fn abs_offset_sums_pivots() {
        let doc = doc_with_chain(3);
        assert_eq!(doc.abs_offset(2), vec3(3.0, 0.0, 0.0));
    }

    #[test]
    fn name_lookup_tolerates_leading_alias() {
        let mut doc = ModelDocument::new();
        doc.push_submodel(SubModel::with_name("turret01"));
        assert_eq!(doc.submodel_by_name("Turret01"), Some(0));
        assert_eq!(doc.submodel_by_name("$turret01"), Some(0));
        assert_eq!(doc.submodel_by_name("gunmount"), None);
    }

    #[test]
    fn recalc_bounds_unions_submodels() {
        let mut doc = doc_with_chain(2);
        doc.recalc_bounds();
        // Chain pivots at x=1 and x=2, each with a unit quad at its origin.
        assert_eq!(doc.header.bbox.min, vec3(1.0, 0.0, 0.0));
        assert_eq!(doc.header.bbox.max, vec3(3.0, 1.0, 0.0));
        assert!(doc.header.radius >= vec3(3.0, 1.0, 0.0).length() - 1e-5);
    }
}
