//! Signatures, version gates and chunk identifiers for both on-disk forms.

/// Target-engine container signature.
pub const POF_SIGNATURE: [u8; 4] = *b"PSPO";

/// Native intermediate format signature.
pub const PMF_SIGNATURE: [u8; 4] = *b"PMF1";

/// Oldest target-engine version the reader accepts.
pub const POF_MIN_VERSION: i32 = 2116;
/// Newest known target-engine version; the writer always emits this.
pub const POF_LATEST_VERSION: i32 = 2117;

/// Thruster banks carry a properties string from this version on.
pub const POF_FUEL_PROPERTIES_VERSION: i32 = 2117;

/// Native format versions. 101 adds the auto-center offset and the info
/// string list; 102 adds the per-submodel render-tree cache sections.
pub const PMF_MIN_VERSION: i32 = 100;
pub const PMF_LATEST_VERSION: i32 = 102;
pub const PMF_AUTO_CENTER_VERSION: i32 = 101;
pub const PMF_CACHE_VERSION: i32 = 102;

/// Build-info marker that declares embedded render-tree caches compatible
/// with this packer. Absent or different: caches load dirty.
pub const CACHE_MARKER: &str = "bsp-cache-v1";

pub const CHUNK_TEXTURES: [u8; 4] = *b"TXTR";
pub const CHUNK_HEADER: [u8; 4] = *b"HDR2";
pub const CHUNK_SUBMODEL: [u8; 4] = *b"OBJ2";
pub const CHUNK_SPECIALS: [u8; 4] = *b"SPCL";
pub const CHUNK_PRIMARY_POINTS: [u8; 4] = *b"GPNT";
pub const CHUNK_SECONDARY_POINTS: [u8; 4] = *b"MPNT";
pub const CHUNK_GUN_TURRETS: [u8; 4] = *b"TGUN";
pub const CHUNK_MISSILE_TURRETS: [u8; 4] = *b"TMIS";
pub const CHUNK_DOCKS: [u8; 4] = *b"DOCK";
pub const CHUNK_THRUSTERS: [u8; 4] = *b"FUEL";
pub const CHUNK_SHIELD: [u8; 4] = *b"SHLD";
pub const CHUNK_EYES: [u8; 4] = *b"EYE ";
pub const CHUNK_AUTO_CENTER: [u8; 4] = *b"ACEN";
pub const CHUNK_INSIGNIA: [u8; 4] = *b"INSG";
pub const CHUNK_PATHS: [u8; 4] = *b"PATH";
pub const CHUNK_GLOWS: [u8; 4] = *b"GLOW";
pub const CHUNK_SHIELD_TREE: [u8; 4] = *b"SLDC";
pub const CHUNK_INFO: [u8; 4] = *b"PINF";
