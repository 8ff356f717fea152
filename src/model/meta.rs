//! Auxiliary gameplay metadata attached to the model document. Everything
//! that points at a submodel does so by index, with -1 as the "none"
//! sentinel (see [`crate::model::submodel::NO_PARENT`]).

use glam::Vec3;

/// Pilot viewpoint attached to a submodel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePoint {
    pub submodel: i32,
    pub offset: Vec3,
    pub normal: Vec3,
}

impl Default for EyePoint {
    fn default() -> Self {
        EyePoint { submodel: -1, offset: Vec3::ZERO, normal: Vec3::Z }
    }
}

/// Named radius marker ("special point"): subsystems, shield generators, etc.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialPoint {
    pub name: String,
    pub properties: String,
    pub position: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponPoint {
    pub position: Vec3,
    pub normal: Vec3,
}

impl Default for WeaponPoint {
    fn default() -> Self {
        WeaponPoint { position: Vec3::ZERO, normal: Vec3::Z }
    }
}

/// One firing bank; the document keeps separate lists for primary and
/// secondary banks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeaponBank {
    pub points: Vec<WeaponPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurretKind {
    Gun,
    Missile,
}

/// A turret bank: `parent` is the base submodel, `physical_parent` the
/// submodel the firing points are expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Turret {
    pub kind: TurretKind,
    pub parent: i32,
    pub physical_parent: i32,
    pub normal: Vec3,
    pub fire_points: Vec<Vec3>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DockPoint {
    pub position: Vec3,
    pub normal: Vec3,
}

/// Docking bay: dock points plus the AI path indices a docking approach may
/// follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dock {
    pub properties: String,
    pub paths: Vec<i32>,
    pub points: Vec<DockPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrusterGlow {
    pub position: Vec3,
    pub normal: Vec3,
    pub radius: f32,
}

impl Default for ThrusterGlow {
    fn default() -> Self {
        ThrusterGlow { position: Vec3::ZERO, normal: Vec3::NEG_Z, radius: 1.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThrusterBank {
    pub properties: String,
    pub glows: Vec<ThrusterGlow>,
}

/// Shield-mesh triangle: three indices into the shield vertex list and up to
/// three neighbor face indices (-1 where the mesh is open).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShieldFace {
    pub normal: Vec3,
    pub verts: [u32; 3],
    pub neighbors: [i32; 3],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShieldMesh {
    pub verts: Vec<Vec3>,
    pub faces: Vec<ShieldFace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InsigniaVert {
    pub vert: u32,
    pub u: f32,
    pub v: f32,
}

/// Squad-insignia decal: a small textured mesh glued onto a detail level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insignia {
    pub detail_level: i32,
    pub offset: Vec3,
    pub verts: Vec<Vec3>,
    pub faces: Vec<[InsigniaVert; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathPoint {
    pub position: Vec3,
    pub radius: f32,
    /// Turret submodels that cover this point.
    pub turrets: Vec<i32>,
}

/// Named AI path. `parent` names the submodel the path belongs to (by name,
/// not index; matching tolerates one leading alias character).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiPath {
    pub name: String,
    pub parent: String,
    pub points: Vec<PathPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowPoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub radius: f32,
}

impl Default for GlowPoint {
    fn default() -> Self {
        GlowPoint { position: Vec3::ZERO, normal: Vec3::ZERO, radius: 1.0 }
    }
}

/// Running-light array keyed by parent submodel; points are in global space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlowBank {
    pub disp_time: i32,
    pub on_time: u32,
    pub off_time: u32,
    pub parent: i32,
    pub lod: u32,
    pub kind: u32,
    pub properties: String,
    pub points: Vec<GlowPoint>,
}
