//! Model-document engine for POF ship models: an in-memory scene graph of
//! rigid submodels and gameplay metadata, spatial-partition compilers and
//! packers for the render and shield collision trees, and codecs for the
//! target-engine chunked container and the native intermediate format.

pub mod binary;
pub mod codec;
pub mod error;
pub mod geo;
pub mod math;
pub mod model;
pub mod tree;

pub use codec::{load, save_native, save_pof, SavePhase, SaveReport};
pub use error::{PackFault, PofError, Result};
pub use model::{ModelDocument, Polygon, SubModel};
