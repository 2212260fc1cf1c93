//! Reduction plan construction
//!
//! A reduction over a chunked array becomes three kinds of graph entries:
//! one partial task per input block, optional intermediate combine levels
//! bounded by `split_every`, and one aggregate task per output block. The
//! plan is built entirely before the graph is extended, so a failing plan
//! never leaves entries behind.

use super::kernels::{Kernel, KernelConfig};
use super::operations::{normalize_axes, ReduceOptions, Reduction};
use crate::array::ChunkedArray;
use crate::block::DType;
use crate::errors::{BlockwiseError, Result};
use crate::graph::{Key, Task};
use crate::partition::{cartesian, Chunks};
use std::collections::BTreeMap;
use tracing::debug;

/// Reduce `array` with `reduction` according to `options`
///
/// # Errors
///
/// - [`BlockwiseError::AxisOutOfBounds`] / [`BlockwiseError::DuplicateAxis`]
///   for invalid axes
/// - [`BlockwiseError::InvalidMomentOrder`] for a moment of order below 2
/// - [`BlockwiseError::EmptyReduction`] for min/max style reductions over an
///   axis that holds no blocks
pub fn reduce(
    array: &ChunkedArray,
    reduction: Reduction,
    options: &ReduceOptions,
) -> Result<ChunkedArray> {
    let axes = normalize_axes(&options.axis, array.ndim())?;
    if let Reduction::Moment { order } = reduction {
        if order < 2 {
            return Err(BlockwiseError::InvalidMomentOrder { order });
        }
    }

    let kernel = reduction.kernel();
    let dtype = options
        .dtype
        .unwrap_or_else(|| reduction.default_dtype(array.dtype()));
    let config = KernelConfig {
        axes,
        dtype,
        ddof: options.ddof,
    };

    let plan = TreePlan {
        label: reduction.as_str(),
        kernel,
        config,
        keepdims: options.keepdims,
        split_every: options.split_every,
        output_dtype: dtype,
    };
    plan.build(array, |_coord, input, config| {
        Ok(Task::Partial {
            input,
            kernel,
            config: config.clone(),
        })
    })
}

/// Shape of one reduction tree, independent of the kind of partial task
pub(crate) struct TreePlan<'a> {
    pub label: &'a str,
    pub kernel: Kernel,
    pub config: KernelConfig,
    pub keepdims: bool,
    pub split_every: Option<usize>,
    pub output_dtype: DType,
}

impl TreePlan<'_> {
    /// Extend the graph of `array` with the partial, combine and aggregate
    /// entries of this plan
    pub(crate) fn build(
        &self,
        array: &ChunkedArray,
        partial: impl Fn(&[usize], Key, &KernelConfig) -> Result<Task>,
    ) -> Result<ChunkedArray> {
        let axes = &self.config.axes;
        let chunks = array.chunks();
        let numblocks = chunks.numblocks();

        if !self.kernel.has_identity() && axes.iter().any(|&a| numblocks[a] == 0) {
            return Err(BlockwiseError::EmptyReduction {
                reduction: self.label.to_string(),
                axes: axes.clone(),
            });
        }

        let name = array.tokens().next_token(self.label);
        let partial_name = format!("{name}-partial");
        let kept: Vec<usize> = (0..array.ndim()).filter(|a| !axes.contains(a)).collect();
        let kept_extents: Vec<usize> = kept.iter().map(|&a| numblocks[a]).collect();
        let reduced_extents: Vec<usize> = axes.iter().map(|&a| numblocks[a]).collect();
        let fan_in = self.split_every.map(|n| n.max(2));

        let mut tasks: BTreeMap<Key, Task> = BTreeMap::new();
        for kept_coord in cartesian(&kept_extents) {
            let mut inputs = Vec::new();
            for reduced_coord in cartesian(&reduced_extents) {
                let coord = merge_coord(&kept, &kept_coord, axes, &reduced_coord);
                let key = Key::new(partial_name.as_str(), coord.clone());
                let input = Key::new(array.name(), coord.clone());
                tasks.insert(key.clone(), partial(&coord, input, &self.config)?);
                inputs.push(key);
            }

            let block_shape = self.keepdims_block_shape(chunks, &kept, &kept_coord);
            let mut level = 0;
            while let Some(limit) = fan_in.filter(|&limit| inputs.len() > limit) {
                level += 1;
                let combine_name = format!("{name}-combine-{level}");
                inputs = inputs
                    .chunks(limit)
                    .enumerate()
                    .map(|(group, members)| {
                        let mut coord = kept_coord.clone();
                        coord.push(group);
                        let key = Key::new(combine_name.as_str(), coord);
                        tasks.insert(
                            key.clone(),
                            Task::Combine {
                                inputs: members.to_vec(),
                                kernel: self.kernel,
                                config: self.config.clone(),
                                block_shape: block_shape.clone(),
                            },
                        );
                        key
                    })
                    .collect();
            }

            let out_coord = if self.keepdims {
                merge_coord(&kept, &kept_coord, axes, &vec![0; axes.len()])
            } else {
                kept_coord.clone()
            };
            tasks.insert(
                Key::new(name.as_str(), out_coord),
                Task::Aggregate {
                    inputs,
                    kernel: self.kernel,
                    config: self.config.clone(),
                    keepdims: self.keepdims,
                    block_shape,
                },
            );
        }

        let out_chunks = self.output_chunks(chunks);
        debug!(
            name = name.as_str(),
            reduction = self.label,
            axes = ?axes,
            keepdims = self.keepdims,
            tasks = tasks.len(),
            "planned reduction"
        );
        Ok(ChunkedArray::new(
            array.graph().extend(tasks),
            name,
            out_chunks,
            self.output_dtype,
            std::sync::Arc::clone(array.tokens()),
        ))
    }

    /// Output block shape with the reduced axes kept at length 1
    fn keepdims_block_shape(&self, chunks: &Chunks, kept: &[usize], kept_coord: &[usize]) -> Vec<usize> {
        let plans = chunks.plans();
        (0..chunks.ndim())
            .map(|dim| match kept.iter().position(|&k| k == dim) {
                Some(i) => plans[dim][kept_coord[i]],
                None => 1,
            })
            .collect()
    }

    fn output_chunks(&self, chunks: &Chunks) -> Chunks {
        let plans = chunks
            .plans()
            .iter()
            .enumerate()
            .filter_map(|(dim, plan)| {
                if !self.config.axes.contains(&dim) {
                    Some(plan.clone())
                } else if self.keepdims {
                    Some(vec![1])
                } else {
                    None
                }
            })
            .collect();
        Chunks::from_plans_unchecked(plans)
    }
}

/// Interleave kept and reduced coordinates back into dimension order
fn merge_coord(kept: &[usize], kept_coord: &[usize], axes: &[usize], reduced_coord: &[usize]) -> Vec<usize> {
    let mut coord = vec![0; kept.len() + axes.len()];
    for (&dim, &i) in kept.iter().zip(kept_coord) {
        coord[dim] = i;
    }
    for (&dim, &i) in axes.iter().zip(reduced_coord) {
        coord[dim] = i;
    }
    coord
}
