//! Geometry passes that run on the document independently of load/save:
//! polygon cleanup ahead of compilation, subtree transforms, and the
//! inertia-tensor estimate.

pub mod inertia;
pub mod repair;
pub mod transform;

pub use inertia::{estimate_moi, DEFAULT_MOI_RESOLUTION};
pub use repair::{repair_polygon, repair_polygons};
pub use transform::{transform_document, transform_subtree};
