//! Deferred graph builder
//!
//! Wraps an element-producing function into a chunked array: one
//! [`Task::Create`] per block coordinate, each calling the function with
//! that block's concrete shape. The only eager call is the dtype probe,
//! made when the caller does not name a dtype.

use crate::array::ChunkedArray;
use crate::block::{Block, DType, Element};
use crate::errors::{BlockwiseError, Result};
use crate::graph::{ElementFunction, Graph, Key, Param, Params, Task};
use crate::partition::{ChunkSpec, Chunks};
use crate::tokens::{SequentialTokens, TokenSource};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Everything needed to wrap one element function into a chunked array
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub function: ElementFunction,
    /// Full array shape; when absent it is taken from a `shape` keyword or
    /// the first positional argument
    pub shape: Option<Vec<usize>>,
    pub chunks: ChunkSpec,
    pub args: Vec<Param>,
    pub kwargs: Params,
    pub dtype: Option<DType>,
    pub name: Option<String>,
}

impl BuildRequest {
    #[must_use]
    pub fn new(function: ElementFunction, chunks: impl Into<ChunkSpec>) -> Self {
        Self {
            function,
            shape: None,
            chunks: chunks.into(),
            args: Vec::new(),
            kwargs: Params::new(),
            dtype: None,
            name: None,
        }
    }

    #[must_use]
    pub fn shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: Param) -> Self {
        self.args.push(arg);
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: &str, value: Param) -> Self {
        self.kwargs.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Builds chunked arrays whose names come from one token source
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    tokens: Arc<dyn TokenSource>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(SequentialTokens::global())
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self { tokens }
    }

    /// Wrap an element function into a chunked array
    ///
    /// # Errors
    ///
    /// - [`BlockwiseError::MissingShapeArgument`] if no shape can be resolved
    /// - [`BlockwiseError::InvalidBlockSize`] or [`BlockwiseError::InvalidChunks`]
    ///   if the chunking does not fit the shape
    /// - whatever the element function returns from the dtype probe
    pub fn build(&self, request: BuildRequest) -> Result<ChunkedArray> {
        let BuildRequest {
            function,
            shape,
            chunks,
            mut args,
            mut kwargs,
            dtype,
            name,
        } = request;

        let shape = match shape {
            Some(shape) => shape,
            None => resolve_shape(function, &mut args, &mut kwargs)?,
        };
        let chunks = Chunks::normalize(&chunks, &shape)?;

        let dtype = match dtype {
            Some(dtype) => dtype,
            None => {
                debug!(function = function.name(), ?shape, "probing element function for dtype");
                function.call(&shape, &args, None, &kwargs)?.dtype()
            }
        };
        let name = name.unwrap_or_else(|| self.tokens.next_token(function.name()));

        let tasks: BTreeMap<Key, Task> = chunks
            .block_coords()
            .into_iter()
            .map(|coord| {
                let task = Task::Create {
                    function,
                    shape: chunks.block_shape(&coord)?,
                    args: args.clone(),
                    dtype,
                    kwargs: kwargs.clone(),
                };
                Ok((Key::new(name.as_str(), coord), task))
            })
            .collect::<Result<_>>()?;

        debug!(
            name = name.as_str(),
            blocks = tasks.len(),
            dtype = dtype.as_str(),
            "built chunked array"
        );
        Ok(ChunkedArray::new(
            Graph::from_tasks(tasks),
            name,
            chunks,
            dtype,
            Arc::clone(&self.tokens),
        ))
    }

    /// Split an in-memory array into literal blocks
    ///
    /// # Errors
    ///
    /// Returns an error if the chunking does not fit the array's shape.
    pub fn from_array<T: Element>(
        &self,
        data: &ArrayD<T>,
        chunks: impl Into<ChunkSpec>,
    ) -> Result<ChunkedArray> {
        let chunks = Chunks::normalize(&chunks.into(), data.shape())?;
        let name = self.tokens.next_token("array");
        let whole = T::into_block(data.clone());

        let tasks: BTreeMap<Key, Task> = chunks
            .block_coords()
            .into_iter()
            .map(|coord| {
                let block = whole.slice(&chunks.block_ranges(&coord)?);
                Ok((Key::new(name.as_str(), coord), Task::Literal(block)))
            })
            .collect::<Result<_>>()?;

        debug!(name = name.as_str(), blocks = tasks.len(), "split array into literal blocks");
        Ok(ChunkedArray::new(
            Graph::from_tasks(tasks),
            name,
            chunks,
            T::DTYPE,
            Arc::clone(&self.tokens),
        ))
    }

    /// Chunked array of ones, `Float64` unless `dtype` says otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the chunking does not fit `shape`.
    pub fn ones(
        &self,
        shape: &[usize],
        chunks: impl Into<ChunkSpec>,
        dtype: Option<DType>,
    ) -> Result<ChunkedArray> {
        self.build(
            BuildRequest::new(ONES, chunks)
                .shape(shape)
                .dtype(dtype.unwrap_or(DType::Float64)),
        )
    }

    /// Chunked array of zeros, `Float64` unless `dtype` says otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the chunking does not fit `shape`.
    pub fn zeros(
        &self,
        shape: &[usize],
        chunks: impl Into<ChunkSpec>,
        dtype: Option<DType>,
    ) -> Result<ChunkedArray> {
        self.build(
            BuildRequest::new(ZEROS, chunks)
                .shape(shape)
                .dtype(dtype.unwrap_or(DType::Float64)),
        )
    }

    /// Chunked array filled with `fill_value`; the dtype is probed from the
    /// fill value when not given
    ///
    /// # Errors
    ///
    /// Returns an error if the chunking does not fit `shape`.
    pub fn full(
        &self,
        shape: &[usize],
        fill_value: Param,
        chunks: impl Into<ChunkSpec>,
        dtype: Option<DType>,
    ) -> Result<ChunkedArray> {
        let mut request = BuildRequest::new(FULL, chunks)
            .shape(shape)
            .kwarg("fill_value", fill_value);
        request.dtype = dtype;
        self.build(request)
    }
}

fn resolve_shape(
    function: ElementFunction,
    args: &mut Vec<Param>,
    kwargs: &mut Params,
) -> Result<Vec<usize>> {
    let missing = || BlockwiseError::MissingShapeArgument {
        function: function.name().to_string(),
    };
    let param = match kwargs.remove("shape") {
        Some(param) => param,
        None if !args.is_empty() => args.remove(0),
        None => return Err(missing()),
    };
    match param {
        Param::Shape(shape) => Ok(shape),
        Param::Int(len) => usize::try_from(len).map(|len| vec![len]).map_err(|_| missing()),
        _ => Err(missing()),
    }
}

fn fill_with(shape: &[usize], value: f64, dtype: Option<DType>) -> Block {
    Block::filled(shape, value, dtype.unwrap_or(DType::Float64))
}

fn ones_block(shape: &[usize], _args: &[Param], dtype: Option<DType>, _kwargs: &Params) -> Result<Block> {
    Ok(fill_with(shape, 1.0, dtype))
}

fn zeros_block(shape: &[usize], _args: &[Param], dtype: Option<DType>, _kwargs: &Params) -> Result<Block> {
    Ok(fill_with(shape, 0.0, dtype))
}

#[allow(clippy::cast_precision_loss)]
fn full_block(shape: &[usize], args: &[Param], dtype: Option<DType>, kwargs: &Params) -> Result<Block> {
    let fill = kwargs
        .get("fill_value")
        .or_else(|| args.first())
        .ok_or_else(|| BlockwiseError::Kernel("full needs a fill_value".to_string()))?;
    let (value, natural) = match fill {
        Param::Bool(b) => (f64::from(u8::from(*b)), DType::Bool),
        Param::Int(i) => (*i as f64, DType::Int64),
        Param::Float(x) => (*x, DType::Float64),
        Param::Shape(_) => {
            return Err(BlockwiseError::Kernel(
                "full cannot fill with a shape".to_string(),
            ))
        }
    };
    Ok(Block::filled(shape, value, dtype.unwrap_or(natural)))
}

/// Element function producing blocks of ones
pub const ONES: ElementFunction = ElementFunction::new("ones", ones_block);
/// Element function producing blocks of zeros
pub const ZEROS: ElementFunction = ElementFunction::new("zeros", zeros_block);
/// Element function producing blocks of one fill value
pub const FULL: ElementFunction = ElementFunction::new("full", full_block);

/// [`GraphBuilder::ones`] with the process-wide token source
///
/// # Errors
///
/// Returns an error if the chunking does not fit `shape`.
pub fn ones(shape: &[usize], chunks: impl Into<ChunkSpec>) -> Result<ChunkedArray> {
    GraphBuilder::default().ones(shape, chunks, None)
}

/// [`GraphBuilder::zeros`] with the process-wide token source
///
/// # Errors
///
/// Returns an error if the chunking does not fit `shape`.
pub fn zeros(shape: &[usize], chunks: impl Into<ChunkSpec>) -> Result<ChunkedArray> {
    GraphBuilder::default().zeros(shape, chunks, None)
}

/// [`GraphBuilder::full`] with the process-wide token source
///
/// # Errors
///
/// Returns an error if the chunking does not fit `shape`.
pub fn full(shape: &[usize], fill_value: Param, chunks: impl Into<ChunkSpec>) -> Result<ChunkedArray> {
    GraphBuilder::default().full(shape, fill_value, chunks, None)
}

/// [`GraphBuilder::from_array`] with the process-wide token source
///
/// # Errors
///
/// Returns an error if the chunking does not fit the array's shape.
pub fn from_array<T: Element>(data: &ArrayD<T>, chunks: impl Into<ChunkSpec>) -> Result<ChunkedArray> {
    GraphBuilder::default().from_array(data, chunks)
}
