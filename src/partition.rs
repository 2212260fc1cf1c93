//! Block partitioning and block-size plans
//!
//! [`partition`] splits one dimension into blocks; [`Chunks`] holds the
//! per-dimension plans of a whole array and answers the addressing
//! questions the graph builder and the aggregators ask of it.

use crate::errors::{BlockwiseError, Result};
use std::ops::Range;

/// Split `size` elements into blocks of `blocksize`, the last possibly shorter
///
/// ```
/// assert_eq!(blockwise::partition(30, 8).unwrap(), vec![8, 8, 8, 6]);
/// ```
///
/// # Errors
///
/// Returns [`BlockwiseError::InvalidBlockSize`] if `blocksize` is zero.
pub fn partition(size: usize, blocksize: usize) -> Result<Vec<usize>> {
    if blocksize == 0 {
        return Err(BlockwiseError::InvalidBlockSize { blocksize });
    }
    let mut blocks = vec![blocksize; size / blocksize];
    if size % blocksize != 0 {
        blocks.push(size % blocksize);
    }
    Ok(blocks)
}

/// Requested chunking, before it is resolved against a shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkSpec {
    /// Same blocksize along every dimension
    Uniform(usize),
    /// One blocksize per dimension
    PerDim(Vec<usize>),
    /// Fully explicit block lengths per dimension
    Explicit(Vec<Vec<usize>>),
}

impl From<usize> for ChunkSpec {
    fn from(blocksize: usize) -> Self {
        Self::Uniform(blocksize)
    }
}

impl From<Vec<usize>> for ChunkSpec {
    fn from(blocksizes: Vec<usize>) -> Self {
        Self::PerDim(blocksizes)
    }
}

impl From<&[usize]> for ChunkSpec {
    fn from(blocksizes: &[usize]) -> Self {
        Self::PerDim(blocksizes.to_vec())
    }
}

impl From<Vec<Vec<usize>>> for ChunkSpec {
    fn from(plans: Vec<Vec<usize>>) -> Self {
        Self::Explicit(plans)
    }
}

/// Block-size plans for every dimension of an array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chunks(Vec<Vec<usize>>);

impl Chunks {
    /// Resolve a [`ChunkSpec`] against `shape`
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::InvalidBlockSize`] for a zero blocksize and
    /// [`BlockwiseError::InvalidChunks`] when the plan does not fit the shape.
    pub fn normalize(spec: &ChunkSpec, shape: &[usize]) -> Result<Self> {
        match spec {
            ChunkSpec::Uniform(blocksize) => shape
                .iter()
                .map(|&size| partition(size, *blocksize))
                .collect::<Result<Vec<_>>>()
                .map(Self),
            ChunkSpec::PerDim(blocksizes) => {
                if blocksizes.len() != shape.len() {
                    return Err(BlockwiseError::InvalidChunks {
                        shape: shape.to_vec(),
                        chunks: vec![blocksizes.clone()],
                        message: format!(
                            "{} blocksizes given for {} dimensions",
                            blocksizes.len(),
                            shape.len()
                        ),
                    });
                }
                shape
                    .iter()
                    .zip(blocksizes)
                    .map(|(&size, &blocksize)| partition(size, blocksize))
                    .collect::<Result<Vec<_>>>()
                    .map(Self)
            }
            ChunkSpec::Explicit(plans) => {
                let invalid = |message: String| BlockwiseError::InvalidChunks {
                    shape: shape.to_vec(),
                    chunks: plans.clone(),
                    message,
                };
                if plans.len() != shape.len() {
                    return Err(invalid(format!(
                        "{} plans given for {} dimensions",
                        plans.len(),
                        shape.len()
                    )));
                }
                for (dim, (plan, &size)) in plans.iter().zip(shape).enumerate() {
                    if plan.contains(&0) {
                        return Err(invalid(format!("zero-length block in dimension {dim}")));
                    }
                    let total: usize = plan.iter().sum();
                    if total != size {
                        return Err(invalid(format!(
                            "blocks of dimension {dim} sum to {total}, expected {size}"
                        )));
                    }
                }
                Ok(Self(plans.clone()))
            }
        }
    }

    /// A plan with no dimensions: one scalar block
    #[must_use]
    pub const fn scalar() -> Self {
        Self(Vec::new())
    }

    pub(crate) const fn from_plans_unchecked(plans: Vec<Vec<usize>>) -> Self {
        Self(plans)
    }

    #[must_use]
    pub fn plans(&self) -> &[Vec<usize>] {
        &self.0
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Total length of every dimension
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.0.iter().map(|plan| plan.iter().sum::<usize>()).collect()
    }

    /// Number of blocks along every dimension
    #[must_use]
    pub fn numblocks(&self) -> Vec<usize> {
        self.0.iter().map(Vec::len).collect()
    }

    /// Every block coordinate, last dimension varying fastest
    #[must_use]
    pub fn block_coords(&self) -> Vec<Vec<usize>> {
        cartesian(&self.numblocks())
    }

    fn check_coord(&self, coord: &[usize]) -> Result<()> {
        let inside = coord.len() == self.0.len()
            && self.0.iter().zip(coord).all(|(plan, &i)| i < plan.len());
        if inside {
            Ok(())
        } else {
            Err(BlockwiseError::BlockOutOfBounds {
                coord: coord.to_vec(),
                numblocks: self.numblocks(),
            })
        }
    }

    /// Concrete shape of the block at `coord`
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::BlockOutOfBounds`] if `coord` is not a block
    /// of this plan.
    pub fn block_shape(&self, coord: &[usize]) -> Result<Vec<usize>> {
        self.check_coord(coord)?;
        Ok(self.0.iter().zip(coord).map(|(plan, &i)| plan[i]).collect())
    }

    /// Start offset of the block at `coord` along every dimension
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::BlockOutOfBounds`] if `coord` is not a block
    /// of this plan.
    pub fn block_offset(&self, coord: &[usize]) -> Result<Vec<usize>> {
        self.check_coord(coord)?;
        Ok(self
            .0
            .iter()
            .zip(coord)
            .map(|(plan, &i)| plan[..i].iter().sum::<usize>())
            .collect())
    }

    /// Element ranges covered by the block at `coord`
    ///
    /// # Errors
    ///
    /// Returns [`BlockwiseError::BlockOutOfBounds`] if `coord` is not a block
    /// of this plan.
    pub fn block_ranges(&self, coord: &[usize]) -> Result<Vec<Range<usize>>> {
        Ok(self
            .block_offset(coord)?
            .into_iter()
            .zip(self.block_shape(coord)?)
            .map(|(start, len)| start..start + len)
            .collect())
    }
}

/// Offsets at which each block starts, given the block lengths
#[must_use]
pub fn exclusive_prefix_sum(lengths: &[usize]) -> Vec<usize> {
    lengths
        .iter()
        .scan(0, |acc, &len| {
            let start = *acc;
            *acc += len;
            Some(start)
        })
        .collect()
}

/// Row-major cartesian product of `0..n` for every `n` in `extents`
#[must_use]
pub fn cartesian(extents: &[usize]) -> Vec<Vec<usize>> {
    let mut coords = vec![Vec::with_capacity(extents.len())];
    for &extent in extents {
        coords = coords
            .into_iter()
            .flat_map(|prefix| {
                (0..extent).map(move |i| {
                    let mut next = prefix.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_ragged_tail() {
        assert_eq!(partition(30, 8).unwrap(), vec![8, 8, 8, 6]);
        assert_eq!(partition(32, 8).unwrap(), vec![8, 8, 8, 8]);
        assert_eq!(partition(3, 8).unwrap(), vec![3]);
        assert!(partition(0, 8).unwrap().is_empty());
    }

    #[test]
    fn test_partition_rejects_zero_blocksize() {
        match partition(10, 0) {
            Err(BlockwiseError::InvalidBlockSize { blocksize }) => assert_eq!(blocksize, 0),
            other => panic!("Expected InvalidBlockSize, got {other:?}"),
        }
    }

    #[test]
    fn test_partition_sums_to_size() {
        for size in 0..40 {
            for blocksize in 1..12 {
                let blocks = partition(size, blocksize).unwrap();
                assert_eq!(blocks.iter().sum::<usize>(), size);
                if let Some((_, head)) = blocks.split_last() {
                    assert!(head.iter().all(|&b| b == blocksize));
                }
            }
        }
    }

    #[test]
    fn test_cartesian_row_major() {
        assert_eq!(
            cartesian(&[2, 3]),
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2]
            ]
        );
        assert_eq!(cartesian(&[]), vec![Vec::<usize>::new()]);
        assert!(cartesian(&[3, 0]).is_empty());
    }

    #[test]
    fn test_exclusive_prefix_sum() {
        assert_eq!(exclusive_prefix_sum(&[4, 4, 3]), vec![0, 4, 8]);
        assert!(exclusive_prefix_sum(&[]).is_empty());
    }

    #[test]
    fn test_block_addressing() {
        let chunks = Chunks::normalize(&ChunkSpec::Uniform(4), &[11, 6]).unwrap();
        assert_eq!(chunks.plans(), &[vec![4, 4, 3], vec![4, 2]]);
        assert_eq!(chunks.numblocks(), vec![3, 2]);
        assert_eq!(chunks.block_shape(&[2, 1]).unwrap(), vec![3, 2]);
        assert_eq!(chunks.block_offset(&[2, 1]).unwrap(), vec![8, 4]);
        assert_eq!(chunks.block_ranges(&[1, 0]).unwrap(), vec![4..8, 0..4]);
        assert_eq!(chunks.shape(), vec![11, 6]);
    }

    #[test]
    fn test_block_addressing_rejects_foreign_coords() {
        let chunks = Chunks::normalize(&ChunkSpec::Uniform(4), &[11, 6]).unwrap();
        match chunks.block_shape(&[3, 0]) {
            Err(BlockwiseError::BlockOutOfBounds { coord, numblocks }) => {
                assert_eq!(coord, vec![3, 0]);
                assert_eq!(numblocks, vec![3, 2]);
            }
            other => panic!("Expected BlockOutOfBounds, got {other:?}"),
        }
        assert!(matches!(
            chunks.block_offset(&[1]),
            Err(BlockwiseError::BlockOutOfBounds { .. })
        ));
        assert!(chunks.block_ranges(&[0, 2]).is_err());
    }

    #[test]
    fn test_explicit_plan_validation() {
        let bad_sum = Chunks::normalize(&ChunkSpec::Explicit(vec![vec![2, 2]]), &[5]);
        assert!(matches!(bad_sum, Err(BlockwiseError::InvalidChunks { .. })));

        let zero = Chunks::normalize(&ChunkSpec::Explicit(vec![vec![5, 0]]), &[5]);
        assert!(matches!(zero, Err(BlockwiseError::InvalidChunks { .. })));

        let rank = Chunks::normalize(&ChunkSpec::PerDim(vec![2]), &[5, 5]);
        assert!(matches!(rank, Err(BlockwiseError::InvalidChunks { .. })));

        let ok = Chunks::normalize(&ChunkSpec::Explicit(vec![vec![2, 3]]), &[5]).unwrap();
        assert_eq!(ok.plans(), &[vec![2, 3]]);
    }
}
