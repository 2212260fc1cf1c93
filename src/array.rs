//! Lazy chunked arrays
//!
//! A [`ChunkedArray`] is the array construction result: the graph, the
//! array name, the block-size plans and the dtype. It never holds element
//! data itself; blocks are produced when a scheduler resolves its keys.

use crate::block::DType;
use crate::graph::{Graph, Key};
use crate::partition::Chunks;
use crate::tokens::TokenSource;
use std::sync::Arc;

/// A lazily evaluated array split into a grid of blocks
#[derive(Debug, Clone)]
pub struct ChunkedArray {
    graph: Arc<Graph>,
    name: String,
    chunks: Chunks,
    dtype: DType,
    tokens: Arc<dyn TokenSource>,
}

impl ChunkedArray {
    pub(crate) fn new(
        graph: Graph,
        name: String,
        chunks: Chunks,
        dtype: DType,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            name,
            chunks,
            dtype,
            tokens,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn chunks(&self) -> &Chunks {
        &self.chunks
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.chunks.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.chunks.ndim()
    }

    #[must_use]
    pub fn numblocks(&self) -> Vec<usize> {
        self.chunks.numblocks()
    }

    /// Source that names arrays derived from this one
    #[must_use]
    pub fn tokens(&self) -> &Arc<dyn TokenSource> {
        &self.tokens
    }

    /// Keys of every block of this array, last dimension varying fastest
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.chunks
            .block_coords()
            .into_iter()
            .map(|coord| Key::new(self.name.as_str(), coord))
            .collect()
    }

    /// Split into `(graph, name, block-size plans, dtype)`
    #[must_use]
    pub fn into_parts(self) -> (Arc<Graph>, String, Chunks, DType) {
        (self.graph, self.name, self.chunks, self.dtype)
    }
}
