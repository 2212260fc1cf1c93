//! blockwise: chunked array construction and cross-block reductions
//!
//! A Rust library for describing computations over arrays that are too large
//! to handle as one piece. An array is split into a grid of blocks; blockwise
//! builds a deferred-computation graph with one entry per block, and plans
//! reductions (sum, mean, variance, argmin, ...) as per-block partial results
//! combined across blocks. Nothing is computed until a scheduler resolves
//! the graph.
//!
//! ## Key Features
//!
//! - **Block Partitioning**: Ragged block-size plans along every dimension
//! - **Deferred Graphs**: Immutable graphs keyed by `(array name, block coordinate)`
//! - **Reductions**: Plain and NaN-aware folds, moments and argument reductions
//! - **Tree Combination**: Bounded fan-in through `split_every`
//! - **Local Execution**: A Rayon-backed reference scheduler
//!
//! ## Module Organization
//!
//! - [`partition`]: Block partitioner and block-size plans
//! - [`wrap`]: Deferred graph builder and array constructors
//! - [`graph`]: Keys, task descriptors and the graph itself
//! - [`reductions`]: Reduction variants, kernels and plan construction
//! - [`scheduler`]: Local reference executor
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust
//! use blockwise::prelude::*;
//!
//! let builder = GraphBuilder::new(SequentialTokens::shared());
//! let x = builder.ones(&[10, 6], ChunkSpec::Uniform(4), None).unwrap();
//! let total = x.sum(&ReduceOptions::new().axis(Axes::One(0))).unwrap();
//!
//! let scheduler = LocalScheduler::new(&ParallelConfig::with_threads(2)).unwrap();
//! let result = scheduler.compute(&total).unwrap();
//! assert_eq!(result.shape(), &[6]);
//! ```

// Core modules
pub mod array;
pub mod block;
pub mod errors;
pub mod graph;
pub mod parallel;
pub mod partition;
pub mod reductions;
pub mod scheduler;
pub mod tokens;
pub mod wrap;

// Direct re-exports for the public API
pub use array::ChunkedArray;
pub use block::{Block, DType, Element};
pub use errors::{BlockwiseError, Result};
pub use graph::{ElementFn, ElementFunction, Graph, Key, Param, Params, Task};
pub use parallel::ParallelConfig;
pub use partition::{partition, ChunkSpec, Chunks};
pub use reductions::{
    arg_aggregate, arg_reduce, reduce, ArgReduceOptions, ArgReduction, Axes, IndexOrder,
    ReduceOptions, Reduction,
};
pub use scheduler::LocalScheduler;
pub use tokens::{SequentialTokens, TokenSource};
pub use wrap::{BuildRequest, GraphBuilder};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::array::ChunkedArray;
    pub use crate::block::{Block, DType};
    pub use crate::errors::{BlockwiseError, Result};
    pub use crate::graph::{ElementFunction, Graph, Key, Param};
    pub use crate::parallel::ParallelConfig;
    pub use crate::partition::ChunkSpec;
    pub use crate::reductions::{ArgReduceOptions, ArgReduction, Axes, IndexOrder, ReduceOptions, Reduction};
    pub use crate::scheduler::LocalScheduler;
    pub use crate::tokens::{SequentialTokens, TokenSource};
    pub use crate::wrap::{BuildRequest, GraphBuilder};
}
