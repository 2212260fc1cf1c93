//! Centralized error handling for blockwise
//!
//! Every structural error is detected while a graph or a reduction plan is
//! being constructed, never while it executes. The variants carry the
//! offending shape, axis or blocksize so callers can report them directly.

use thiserror::Error;

/// Main error type for blockwise operations
#[derive(Debug, Error)]
pub enum BlockwiseError {
    /// A blocksize of zero was supplied to the partitioner
    #[error("invalid blocksize {blocksize}: blocksize must be at least 1")]
    InvalidBlockSize { blocksize: usize },

    /// An explicit block-size plan does not describe the shape it is paired with
    #[error("invalid chunks {chunks:?} for shape {shape:?}: {message}")]
    InvalidChunks {
        shape: Vec<usize>,
        chunks: Vec<Vec<usize>>,
        message: String,
    },

    /// A reduction axis outside `[-ndim, ndim)`
    #[error("axis {axis} is out of bounds for array with {ndim} dimensions")]
    AxisOutOfBounds { axis: isize, ndim: usize },

    /// A block coordinate outside the block grid of an array
    #[error("block {coord:?} is outside a grid of {numblocks:?} blocks")]
    BlockOutOfBounds {
        coord: Vec<usize>,
        numblocks: Vec<usize>,
    },

    /// The same axis was named twice in one reduction
    #[error("axis {axis} appears more than once in the reduction axes")]
    DuplicateAxis { axis: usize },

    /// The element-producing function was given no resolvable shape
    #[error("element function '{function}' was called without a shape argument")]
    MissingShapeArgument { function: String },

    /// Multi-axis argument reduction without a linearization order
    #[error("argument reduction over axes {axes:?} needs an index order to linearize positions")]
    AmbiguousArgIndex { axes: Vec<usize> },

    /// Central moments are defined from order 2 upward
    #[error("moment order {order} is invalid: order must be at least 2")]
    InvalidMomentOrder { order: u32 },

    /// A reduction with no identity over an axis holding no blocks
    #[error("{reduction} over axes {axes:?} has no blocks to reduce and no identity")]
    EmptyReduction { reduction: String, axes: Vec<usize> },

    /// A task referenced a key that is not part of the graph
    #[error("key {key} is not present in the graph")]
    MissingKey { key: String },

    /// Error raised by an element function or kernel while executing
    #[error("kernel error: {0}")]
    Kernel(String),

    /// Thread pool configuration error
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Array shape or dimension error
    #[error("array error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Result type alias for blockwise operations
pub type Result<T> = std::result::Result<T, BlockwiseError>;
