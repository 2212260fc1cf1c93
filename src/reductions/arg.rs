//! Argument reductions: argmin, argmax and their NaN-skipping variants
//!
//! Each block's partial task reports the winning value together with its
//! index along the reduced span, already shifted by the block's global
//! offset. Combining never has to know where a partial came from.

use super::aggregate::TreePlan;
use super::kernels::{ArgPlacement, ArgState, Kernel, KernelConfig, Scalar};
use super::operations::{normalize_axes, ArgReduceOptions, ArgReduction, Axes, IndexOrder};
use crate::array::ChunkedArray;
use crate::block::DType;
use crate::errors::{BlockwiseError, Result};
use crate::graph::Task;
use crate::partition::exclusive_prefix_sum;
use ndarray::{ArrayD, Zip};

/// Reduce `array` to the indices of its extreme values
///
/// Reducing every axis, or an explicit list of axes together with
/// [`IndexOrder::RowMajor`], reports row-major linear indices into the
/// reduced span.
///
/// # Errors
///
/// - [`BlockwiseError::AxisOutOfBounds`] / [`BlockwiseError::DuplicateAxis`]
///   for invalid axes
/// - [`BlockwiseError::AmbiguousArgIndex`] for several explicit axes without
///   an index order, or an empty explicit axis list
/// - [`BlockwiseError::EmptyReduction`] when a reduced axis holds no blocks
pub fn arg_reduce(
    array: &ChunkedArray,
    kind: ArgReduction,
    options: &ArgReduceOptions,
) -> Result<ChunkedArray> {
    let axes = normalize_axes(&options.axis, array.ndim())?;
    if matches!(options.axis, Axes::Many(_)) {
        // an empty list names no span to index into
        if axes.is_empty() && array.ndim() > 0 {
            return Err(BlockwiseError::AmbiguousArgIndex { axes });
        }
        if axes.len() > 1 && !matches!(options.order, Some(IndexOrder::RowMajor)) {
            return Err(BlockwiseError::AmbiguousArgIndex { axes });
        }
    }

    let shape = array.shape();
    let extents: Vec<usize> = axes.iter().map(|&a| shape[a]).collect();
    let config = KernelConfig {
        axes,
        dtype: DType::Int64,
        ddof: 0,
    };
    let plan = TreePlan {
        label: kind.as_str(),
        kernel: Kernel::Arg(kind),
        config,
        keepdims: options.keepdims,
        split_every: options.split_every,
        output_dtype: DType::Int64,
    };

    let chunks = array.chunks();
    plan.build(array, |coord, input, config| {
        let offset = chunks.block_offset(coord)?;
        Ok(Task::ArgPartial {
            input,
            kind,
            config: config.clone(),
            placement: ArgPlacement {
                offsets: config.axes.iter().map(|&a| offset[a]).collect(),
                extents: extents.clone(),
            },
        })
    })
}

/// Combine per-block `(values, local indices)` pairs along one axis
///
/// `block_lengths` are the lengths of the blocks the pairs came from, in
/// order; each local index is shifted by its block's start offset before
/// the pairs are compared. Ties keep the lower global index.
///
/// ```
/// use blockwise::reductions::{arg_aggregate, ArgReduction};
/// use ndarray::{arr1, ArrayD};
///
/// let pairs: Vec<(ArrayD<f64>, ArrayD<i64>)> = vec![
///     (arr1(&[4.0, 3.0, 5.0]).into_dyn(), arr1(&[10, 11, 12]).into_dyn()),
///     (arr1(&[3.0, 5.0, 1.0]).into_dyn(), arr1(&[1, 2, 3]).into_dyn()),
/// ];
/// let result = arg_aggregate(ArgReduction::ArgMin, &[100, 100], &pairs).unwrap();
/// assert_eq!(result, arr1(&[101, 11, 103]).into_dyn());
/// ```
///
/// # Errors
///
/// Returns a kernel error if there are no pairs, if the number of pairs and
/// block lengths differ, or if the pairs disagree in shape.
#[allow(clippy::cast_possible_wrap)]
pub fn arg_aggregate(
    kind: ArgReduction,
    block_lengths: &[usize],
    pairs: &[(ArrayD<f64>, ArrayD<i64>)],
) -> Result<ArrayD<i64>> {
    if pairs.len() != block_lengths.len() {
        return Err(BlockwiseError::Kernel(format!(
            "{} pairs given for {} block lengths",
            pairs.len(),
            block_lengths.len()
        )));
    }
    let offsets = exclusive_prefix_sum(block_lengths);
    let mut states = pairs.iter().zip(&offsets).map(|((values, indices), &offset)| {
        if values.shape() != indices.shape() {
            return Err(BlockwiseError::Kernel(format!(
                "values of shape {:?} paired with indices of shape {:?}",
                values.shape(),
                indices.shape()
            )));
        }
        Ok(Zip::from(values).and(indices).map_collect(|&value, &index| ArgState {
            value: Scalar::Float(value),
            index: index + offset as i64,
        }))
    });

    let mut acc = states.next().ok_or_else(|| {
        BlockwiseError::Kernel(format!("{} received no partial results", kind.as_str()))
    })??;
    for state in states {
        let state = state?;
        if state.shape() != acc.shape() {
            return Err(BlockwiseError::Kernel(format!(
                "partial result of shape {:?} does not match {:?}",
                state.shape(),
                acc.shape()
            )));
        }
        Zip::from(&mut acc).and(&state).for_each(|current, candidate| {
            if candidate.beats(current, kind) {
                *current = *candidate;
            }
        });
    }
    Ok(acc.mapv(|state| state.index))
}
