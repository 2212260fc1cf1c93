//! Local reference scheduler
//!
//! Resolves the graph of a [`ChunkedArray`] in memory. Tasks are grouped
//! into dependency levels; every level runs in parallel on the scheduler's
//! own Rayon pool once the previous level has finished.

use crate::array::ChunkedArray;
use crate::block::Block;
use crate::errors::{BlockwiseError, Result};
use crate::graph::{Graph, Key, Task};
use crate::parallel::ParallelConfig;
use crate::reductions::kernels::{self, Value};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::BTreeMap;
use tracing::{info, trace};

/// Executes graphs with a dedicated thread pool
#[derive(Debug)]
pub struct LocalScheduler {
    pool: ThreadPool,
}

impl LocalScheduler {
    /// # Errors
    ///
    /// Returns [`BlockwiseError::ThreadPool`] if the pool cannot be built.
    pub fn new(config: &ParallelConfig) -> Result<Self> {
        Ok(Self {
            pool: config.build_pool()?,
        })
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Compute every output block of `array`, keyed by block key
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::MissingKey`] for a dangling task reference
    /// and propagates element function and kernel errors.
    pub fn compute_blocks(&self, array: &ChunkedArray) -> Result<BTreeMap<Key, Block>> {
        let outputs = array.keys();
        let mut values = self.execute(array.graph(), &outputs)?;
        outputs
            .into_iter()
            .map(|key| {
                let value = values.remove(&key).ok_or_else(|| BlockwiseError::MissingKey {
                    key: key.to_string(),
                })?;
                Ok((key, value.into_block()?))
            })
            .collect()
    }

    /// Compute `array` and assemble its blocks into one block
    ///
    /// # Errors
    ///
    /// See [`LocalScheduler::compute_blocks`].
    pub fn compute(&self, array: &ChunkedArray) -> Result<Block> {
        let values = self.execute(array.graph(), &array.keys())?;
        assemble(array, &values)
    }

    /// Compute several arrays in one pass over their merged graph
    ///
    /// Tasks the arrays share, such as the blocks of a common input, run
    /// once. Results come back in the order of `arrays`.
    ///
    /// # Errors
    ///
    /// See [`LocalScheduler::compute_blocks`].
    pub fn compute_many(&self, arrays: &[&ChunkedArray]) -> Result<Vec<Block>> {
        let graph = Graph::merge(arrays.iter().map(|array| array.graph()));
        let outputs: Vec<Key> = arrays.iter().flat_map(|array| array.keys()).collect();
        let values = self.execute(&graph, &outputs)?;
        arrays.iter().map(|array| assemble(array, &values)).collect()
    }

    fn execute(&self, graph: &Graph, outputs: &[Key]) -> Result<BTreeMap<Key, Value>> {
        let graph = graph.cull(outputs)?;
        let levels = dependency_levels(&graph)?;
        info!(
            tasks = graph.len(),
            levels = levels.len(),
            threads = self.num_threads(),
            "computing graph"
        );

        let mut values: BTreeMap<Key, Value> = BTreeMap::new();
        for level in levels {
            let computed = self.pool.install(|| {
                level
                    .par_iter()
                    .map(|&key| {
                        let task = graph.get(key).ok_or_else(|| BlockwiseError::MissingKey {
                            key: key.to_string(),
                        })?;
                        trace!(%key, "executing task");
                        run_task(task, &values).map(|value| (key.clone(), value))
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            values.extend(computed);
        }
        info!(outputs = outputs.len(), "graph computed");
        Ok(values)
    }
}

/// Keys grouped so that every task only depends on earlier groups
fn dependency_levels(graph: &Graph) -> Result<Vec<Vec<&Key>>> {
    let mut depth: BTreeMap<&Key, usize> = BTreeMap::new();
    let mut pending: Vec<(&Key, &Task)> = graph.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|&(key, task)| {
            let deps: Option<Vec<usize>> = task
                .dependencies()
                .into_iter()
                .map(|dep| depth.get(dep).copied())
                .collect();
            match deps {
                Some(deps) => {
                    depth.insert(key, deps.into_iter().max().map_or(0, |d| d + 1));
                    false
                }
                None => true,
            }
        });
        if pending.len() == before {
            return Err(BlockwiseError::Kernel(format!(
                "graph has a dependency cycle through {}",
                pending[0].0
            )));
        }
    }

    let mut levels: Vec<Vec<&Key>> = Vec::new();
    for (key, d) in depth {
        if levels.len() <= d {
            levels.resize_with(d + 1, Vec::new);
        }
        levels[d].push(key);
    }
    Ok(levels)
}

/// Place every output block of `array` into one block of its full shape
fn assemble(array: &ChunkedArray, values: &BTreeMap<Key, Value>) -> Result<Block> {
    let mut out = Block::filled(&array.shape(), 0.0, array.dtype());
    for key in array.keys() {
        let block = fetch(values, &key)?.as_block()?;
        out.assign_at(&array.chunks().block_offset(&key.coord)?, block);
    }
    Ok(out)
}

fn fetch<'a>(values: &'a BTreeMap<Key, Value>, key: &Key) -> Result<&'a Value> {
    values.get(key).ok_or_else(|| BlockwiseError::MissingKey {
        key: key.to_string(),
    })
}

fn run_task(task: &Task, values: &BTreeMap<Key, Value>) -> Result<Value> {
    match task {
        Task::Create {
            function,
            shape,
            args,
            dtype,
            kwargs,
        } => {
            let block = function.call(shape, args, Some(*dtype), kwargs)?;
            Ok(Value::Block(block.cast(*dtype)))
        }
        Task::Literal(block) => Ok(Value::Block(block.clone())),
        Task::Partial {
            input,
            kernel,
            config,
        } => kernels::partial_reduce(*kernel, fetch(values, input)?.as_block()?, config),
        Task::ArgPartial {
            input,
            kind,
            config,
            placement,
        } => kernels::arg_partial(*kind, fetch(values, input)?.as_block()?, config, placement),
        Task::Combine {
            inputs,
            kernel,
            config,
            block_shape,
        } => {
            let parts = inputs
                .iter()
                .map(|key| fetch(values, key))
                .collect::<Result<Vec<_>>>()?;
            kernels::combine(*kernel, &parts, config, block_shape)
        }
        Task::Aggregate {
            inputs,
            kernel,
            config,
            keepdims,
            block_shape,
        } => {
            let parts = inputs
                .iter()
                .map(|key| fetch(values, key))
                .collect::<Result<Vec<_>>>()?;
            kernels::aggregate(*kernel, &parts, config, *keepdims, block_shape).map(Value::Block)
        }
    }
}
