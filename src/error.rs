use crate::OctantKey;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no node at {0}")]
    NodeNotFound(OctantKey),

    #[error("depth {depth} exceeds the tree's maximum depth of {max_depth}")]
    DepthExceeded { depth: u8, max_depth: u8 },

    #[error("child index {0} is out of range (0-7)")]
    InvalidChildIndex(usize),

    #[error("unknown tree type: {0}")]
    UnknownTreeType(String),
}

pub type Result<T> = std::result::Result<T, Error>;
