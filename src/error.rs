use flagset::{flags, FlagSet};
use thiserror::Error;

flags! {
    /// Invariant violations the tree packers can detect. Accumulated so a
    /// caller can tell which discipline was broken; all of them are caught
    /// before any corrupt bytes hit the buffer.
    pub enum PackFault: u8 {
        /// `offset + size` would pass the end of the buffer.
        PreWriteOverflow,
        /// The node was already packed once.
        DoubleUse,
        /// `size()` was never run over this node.
        Unsized,
        /// A leaf wrote past its own sized extent.
        LeafOverflow,
        /// A split wrote past its own sized extent.
        SplitOverflow,
    }
}

#[derive(Debug, Error)]
pub enum PofError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad file signature {found:?}")]
    Signature { found: [u8; 4] },

    #[error("unsupported format version {0}")]
    UnsupportedVersion(i32),

    #[error("malformed payload: {what} at byte {at}")]
    Malformed { what: &'static str, at: usize },

    #[error("polygon cannot be split: no valid diagonal")]
    UnsplittableGeometry,

    #[error("render tree exceeded maximum depth ({depth})")]
    CompileDepth { depth: u32 },

    #[error("tree packer fault: {0:?}")]
    Pack(FlagSet<PackFault>),
}

pub type Result<T> = std::result::Result<T, PofError>;
