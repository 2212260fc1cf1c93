//! Argument reductions: global index correctness across block boundaries

use blockwise::prelude::*;
use blockwise::reductions::{arg_aggregate, arg_reduce};
use ndarray::{arr1, arr2, ArrayD, IxDyn};

fn builder() -> GraphBuilder {
    GraphBuilder::new(SequentialTokens::shared())
}

fn compute_indices(array: &ChunkedArray) -> Result<ArrayD<i64>> {
    let scheduler = LocalScheduler::new(&ParallelConfig::with_threads(4))?;
    match scheduler.compute(array)? {
        Block::Int64(indices) => Ok(indices),
        other => panic!("Expected an int64 block, got {other:?}"),
    }
}

fn along(axis: isize) -> ArgReduceOptions {
    ArgReduceOptions::new().axis(Axes::One(axis))
}

/// Values with many repeats, so ties are common
#[allow(clippy::cast_precision_loss)]
fn tied(shape: &[usize]) -> ArrayD<f64> {
    let len: usize = shape.iter().product();
    let values = (0..len).map(|i| ((i * 7 + i / 3) % 5) as f64);
    ArrayD::from_shape_vec(IxDyn(shape), values.collect()).unwrap()
}

/// First position of the extreme value in `values`
fn first_extreme(values: &[f64], maximum: bool) -> i64 {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        let better = if maximum { v > values[best] } else { v < values[best] };
        if better {
            best = i;
        }
    }
    best as i64
}

#[test]
fn test_arg_aggregate_applies_block_offsets() -> Result<()> {
    let pairs: Vec<(ArrayD<f64>, ArrayD<i64>)> = vec![
        (arr1(&[4.0, 3.0, 5.0]).into_dyn(), arr1(&[10, 11, 12]).into_dyn()),
        (arr1(&[3.0, 5.0, 1.0]).into_dyn(), arr1(&[1, 2, 3]).into_dyn()),
    ];
    let argmin = arg_aggregate(ArgReduction::ArgMin, &[100, 100], &pairs)?;
    assert_eq!(argmin, arr1(&[101, 11, 103]).into_dyn());

    let argmax = arg_aggregate(ArgReduction::ArgMax, &[100, 100], &pairs)?;
    assert_eq!(argmax, arr1(&[10, 102, 12]).into_dyn());

    match arg_aggregate(ArgReduction::ArgMin, &[100], &pairs) {
        Err(BlockwiseError::Kernel(message)) => assert!(message.contains("block lengths")),
        other => panic!("Expected a kernel error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_arg_aggregate_nan_handling() -> Result<()> {
    let pairs: Vec<(ArrayD<f64>, ArrayD<i64>)> = vec![
        (arr1(&[f64::NAN, 2.0]).into_dyn(), arr1(&[0, 1]).into_dyn()),
        (arr1(&[1.0, f64::NAN]).into_dyn(), arr1(&[0, 0]).into_dyn()),
    ];
    assert_eq!(
        arg_aggregate(ArgReduction::NanArgMin, &[2, 2], &pairs)?,
        arr1(&[2, 1]).into_dyn()
    );
    assert_eq!(
        arg_aggregate(ArgReduction::ArgMin, &[2, 2], &pairs)?,
        arr1(&[0, 2]).into_dyn()
    );
    Ok(())
}

#[test]
fn test_argmax_across_block_boundaries() -> Result<()> {
    let targets = [0_usize, 4, 8, 3, 7, 10, 4, 8, 1, 9, 5];
    let data = ArrayD::from_shape_fn(IxDyn(&[11, 11]), |idx| {
        -(idx[0] as f64 - targets[idx[1]] as f64).abs()
    });
    let x = builder().from_array(&data, ChunkSpec::Uniform(4))?;
    let reduced = x.argmax(&ArgReduceOptions::new().axis(Axes::One(0)))?;

    assert_eq!(reduced.dtype(), DType::Int64);
    let expected: Vec<i64> = targets.iter().map(|&t| t as i64).collect();
    assert_eq!(compute_indices(&reduced)?, arr1(&expected).into_dyn());
    Ok(())
}

#[test]
fn test_single_axis_matches_unchunked_with_ties() -> Result<()> {
    let data = tied(&[11, 11]);
    let x = builder().from_array(&data, ChunkSpec::Uniform(4))?;

    for (kind, maximum) in [(ArgReduction::ArgMin, false), (ArgReduction::ArgMax, true)] {
        let down = compute_indices(&arg_reduce(&x, kind, &along(0))?)?;
        let across = compute_indices(&arg_reduce(&x, kind, &along(-1))?)?;
        for j in 0..11 {
            let column: Vec<f64> = (0..11).map(|i| data[[i, j]]).collect();
            assert_eq!(down[[j]], first_extreme(&column, maximum));
            let row: Vec<f64> = (0..11).map(|k| data[[j, k]]).collect();
            assert_eq!(across[[j]], first_extreme(&row, maximum));
        }
    }
    Ok(())
}

#[test]
fn test_all_axes_returns_flat_index() -> Result<()> {
    let data = tied(&[5, 7]);
    let x = builder().from_array(&data, ChunkSpec::PerDim(vec![2, 3]))?;
    let flat: Vec<f64> = data.iter().copied().collect();

    let argmin = compute_indices(&x.argmin(&ArgReduceOptions::new())?)?;
    assert_eq!(argmin.shape(), &[] as &[usize]);
    assert_eq!(argmin.sum(), first_extreme(&flat, false));

    let argmax = x.argmax(&ArgReduceOptions::new().keepdims(true))?;
    assert_eq!(argmax.chunks().plans(), &[vec![1], vec![1]]);
    let argmax = compute_indices(&argmax)?;
    assert_eq!(argmax.shape(), &[1, 1]);
    assert_eq!(argmax.sum(), first_extreme(&flat, true));
    Ok(())
}

#[test]
fn test_multiple_axes_need_an_order() -> Result<()> {
    let data = tied(&[4, 5, 6]);
    let x = builder().from_array(&data, ChunkSpec::PerDim(vec![3, 2, 4]))?;

    match x.argmin(&ArgReduceOptions::new().axis(Axes::Many(vec![0, -1]))) {
        Err(BlockwiseError::AmbiguousArgIndex { axes }) => assert_eq!(axes, vec![0, 2]),
        other => panic!("Expected AmbiguousArgIndex, got {other:?}"),
    }

    for order in [None, Some(IndexOrder::RowMajor)] {
        let mut no_axes = ArgReduceOptions::new().axis(Axes::Many(vec![]));
        no_axes.order = order;
        match x.argmax(&no_axes) {
            Err(BlockwiseError::AmbiguousArgIndex { axes }) => assert!(axes.is_empty()),
            other => panic!("Expected AmbiguousArgIndex, got {other:?}"),
        }
    }

    let options = ArgReduceOptions::new()
        .axis(Axes::Many(vec![0, -1]))
        .order(IndexOrder::RowMajor)
        .split_every(2);
    let reduced = compute_indices(&x.argmax(&options)?)?;
    assert_eq!(reduced.shape(), &[5]);
    for j in 0..5 {
        let span: Vec<f64> = (0..4)
            .flat_map(|i| (0..6).map(move |k| (i, k)))
            .map(|(i, k)| data[[i, j, k]])
            .collect();
        assert_eq!(reduced[[j]], first_extreme(&span, true));
    }
    Ok(())
}

#[test]
fn test_nan_arg_reductions() -> Result<()> {
    let data = arr2(&[
        [1.0, f64::NAN, 3.0, 4.0],
        [5.0, 6.0, 7.0, f64::NAN],
        [9.0, 10.0, 11.0, 12.0],
    ])
    .into_dyn();
    let x = builder().from_array(&data, ChunkSpec::PerDim(vec![2, 2]))?;

    assert_eq!(compute_indices(&x.nanargmin(&along(0))?)?, arr1(&[0, 1, 0, 0]).into_dyn());
    assert_eq!(compute_indices(&x.nanargmax(&along(0))?)?, arr1(&[2, 2, 2, 2]).into_dyn());
    assert_eq!(compute_indices(&x.nanargmin(&along(1))?)?, arr1(&[0, 0, 0]).into_dyn());
    assert_eq!(compute_indices(&x.nanargmax(&along(1))?)?, arr1(&[3, 2, 3]).into_dyn());

    // plain variants report the first NaN
    assert_eq!(compute_indices(&x.argmin(&along(0))?)?, arr1(&[0, 0, 0, 1]).into_dyn());
    assert_eq!(compute_indices(&x.argmax(&along(1))?)?, arr1(&[1, 3, 3]).into_dyn());
    Ok(())
}

#[test]
fn test_all_nan_slice_returns_first_index() -> Result<()> {
    let data = arr2(&[[f64::NAN, 1.0], [f64::NAN, 0.0], [f64::NAN, 2.0]]).into_dyn();
    let x = builder().from_array(&data, ChunkSpec::Uniform(2))?;
    let options = ArgReduceOptions::new().axis(Axes::One(0));

    assert_eq!(compute_indices(&x.nanargmin(&options)?)?, arr1(&[0, 1]).into_dyn());
    assert_eq!(compute_indices(&x.nanargmax(&options)?)?, arr1(&[0, 2]).into_dyn());
    Ok(())
}

#[test]
fn test_integer_arg_reduction() -> Result<()> {
    let data = arr1(&[3_i32, 1, 4, 1, 5, 9, 2, 6, 5, 3]).into_dyn();
    let x = builder().from_array(&data, ChunkSpec::Uniform(3))?;
    assert_eq!(compute_indices(&x.argmin(&ArgReduceOptions::new())?)?.sum(), 1);
    assert_eq!(compute_indices(&x.argmax(&ArgReduceOptions::new())?)?.sum(), 5);
    Ok(())
}

#[test]
fn test_arg_reduction_over_empty_axis() -> Result<()> {
    let empty = ArrayD::<f64>::zeros(IxDyn(&[3, 0]));
    let x = builder().from_array(&empty, ChunkSpec::Uniform(2))?;
    match x.argmax(&ArgReduceOptions::new().axis(Axes::One(1))) {
        Err(BlockwiseError::EmptyReduction { reduction, axes }) => {
            assert_eq!(reduction, "argmax");
            assert_eq!(axes, vec![1]);
        }
        other => panic!("Expected EmptyReduction, got {other:?}"),
    }
    Ok(())
}
