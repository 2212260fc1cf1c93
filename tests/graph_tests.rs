//! Graph construction, naming and execution tests
//!
//! Covers the partitioner, the deferred graph builder and the local
//! scheduler that resolves built graphs.

use blockwise::prelude::*;
use blockwise::{partition, wrap, Params, Task};
use ndarray::{arr0, ArrayD, Dimension, IxDyn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

fn builder() -> GraphBuilder {
    GraphBuilder::new(SequentialTokens::shared())
}

fn scheduler() -> LocalScheduler {
    LocalScheduler::new(&ParallelConfig::with_threads(2)).unwrap()
}

#[test]
fn test_partition_scenario() -> Result<()> {
    assert_eq!(partition(30, 8)?, vec![8, 8, 8, 6]);
    match partition(30, 0) {
        Err(BlockwiseError::InvalidBlockSize { blocksize }) => assert_eq!(blocksize, 0),
        other => panic!("Expected InvalidBlockSize, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_ones_emits_one_entry_per_block() -> Result<()> {
    let x = builder().ones(&[30, 7], ChunkSpec::PerDim(vec![8, 3]), None)?;

    assert_eq!(x.name(), "ones-1");
    assert_eq!(x.dtype(), DType::Float64);
    assert_eq!(x.shape(), vec![30, 7]);
    assert_eq!(x.chunks().plans(), &[vec![8, 8, 8, 6], vec![3, 3, 1]]);
    assert_eq!(x.numblocks(), vec![4, 3]);
    assert_eq!(x.graph().len(), 12);

    let keys = x.keys();
    let unique: BTreeSet<&Key> = keys.iter().collect();
    assert_eq!(unique.len(), keys.len());
    assert_eq!(keys[0], Key::new("ones-1", vec![0, 0]));
    assert_eq!(keys[1], Key::new("ones-1", vec![0, 1]));

    for key in &keys {
        match x.graph().get(key) {
            Some(Task::Create { shape, dtype, .. }) => {
                assert_eq!(shape, &x.chunks().block_shape(&key.coord)?);
                assert_eq!(*dtype, DType::Float64);
            }
            other => panic!("Expected a create task, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn test_block_shapes_match_offsets() -> Result<()> {
    let x = builder().zeros(&[11, 9, 4], ChunkSpec::PerDim(vec![4, 5, 4]), None)?;
    let chunks = x.chunks();
    for coord in chunks.block_coords() {
        let offsets = chunks.block_offset(&coord)?;
        let shape = chunks.block_shape(&coord)?;
        for (dim, plan) in chunks.plans().iter().enumerate() {
            assert_eq!(offsets[dim], plan[..coord[dim]].iter().sum::<usize>());
            assert_eq!(shape[dim], plan[coord[dim]]);
        }
    }
    Ok(())
}

#[test]
fn test_names_are_unique_per_source() -> Result<()> {
    let b = builder();
    let first = b.ones(&[4], ChunkSpec::Uniform(2), None)?;
    let second = b.ones(&[4], ChunkSpec::Uniform(2), None)?;
    assert_eq!(first.name(), "ones-1");
    assert_eq!(second.name(), "ones-2");

    let named = b.build(
        BuildRequest::new(wrap::ONES, ChunkSpec::Uniform(2))
            .shape(&[4])
            .dtype(DType::Int32)
            .name("my-ones"),
    )?;
    assert_eq!(named.name(), "my-ones");
    assert!(named.graph().contains(&Key::new("my-ones", vec![1])));
    Ok(())
}

#[test]
fn test_construction_is_deterministic() -> Result<()> {
    let build = || -> Result<ChunkedArray> {
        let x = builder().full(&[9, 5], Param::Float(2.5), ChunkSpec::Uniform(4), None)?;
        x.var(&ReduceOptions::new().axis(Axes::One(-1)).split_every(2))
    };
    let a = build()?;
    let b = build()?;
    assert_eq!(a.name(), b.name());
    assert_eq!(a.graph(), b.graph());
    assert_eq!(a.graph().to_json(), b.graph().to_json());
    assert!(a.graph().to_json().contains("('full-1', 0, 0)"));
    Ok(())
}

#[test]
fn test_missing_shape_argument() {
    let request = BuildRequest::new(wrap::ONES, ChunkSpec::Uniform(2));
    match builder().build(request) {
        Err(BlockwiseError::MissingShapeArgument { function }) => assert_eq!(function, "ones"),
        other => panic!("Expected MissingShapeArgument, got {other:?}"),
    }

    let not_a_shape = BuildRequest::new(wrap::ONES, ChunkSpec::Uniform(2)).arg(Param::Float(3.0));
    assert!(matches!(
        builder().build(not_a_shape),
        Err(BlockwiseError::MissingShapeArgument { .. })
    ));
}

#[test]
fn test_shape_from_keyword_and_positional() -> Result<()> {
    let b = builder();

    let from_kwarg = b.build(
        BuildRequest::new(wrap::FULL, ChunkSpec::Uniform(2))
            .kwarg("shape", Param::Shape(vec![5]))
            .arg(Param::Int(3)),
    )?;
    assert_eq!(from_kwarg.shape(), vec![5]);
    assert_eq!(from_kwarg.dtype(), DType::Int64);

    let from_arg = b.build(
        BuildRequest::new(wrap::FULL, ChunkSpec::Uniform(2))
            .arg(Param::Int(5))
            .kwarg("fill_value", Param::Float(2.5)),
    )?;
    assert_eq!(from_arg.shape(), vec![5]);
    assert_eq!(from_arg.dtype(), DType::Float64);

    let values = scheduler().compute(&from_arg)?.to_f64();
    assert!(values.iter().all(|&x| (x - 2.5).abs() < f64::EPSILON));
    Ok(())
}

#[test]
fn test_full_probes_dtype_from_fill_value() -> Result<()> {
    let flags = builder().full(&[3, 3], Param::Bool(true), ChunkSpec::Uniform(2), None)?;
    assert_eq!(flags.dtype(), DType::Bool);

    let forced = builder().full(&[3, 3], Param::Bool(true), ChunkSpec::Uniform(2), Some(DType::Float32))?;
    assert_eq!(forced.dtype(), DType::Float32);
    match scheduler().compute(&forced)? {
        Block::Float32(values) => assert!(values.iter().all(|&x| x == 1.0)),
        other => panic!("Expected a float32 block, got {other:?}"),
    }
    Ok(())
}

static ARANGE_CALLS: AtomicUsize = AtomicUsize::new(0);

#[allow(clippy::unnecessary_wraps)]
fn counting_arange(shape: &[usize], _args: &[Param], dtype: Option<DType>, _kwargs: &Params) -> Result<Block> {
    ARANGE_CALLS.fetch_add(1, Ordering::SeqCst);
    let data = ArrayD::from_shape_fn(IxDyn(shape), |idx| idx.slice().iter().sum::<usize>() as i64);
    Ok(Block::from_i64(data, dtype.unwrap_or(DType::Int64)))
}

#[test]
fn test_element_function_runs_once_for_probe_then_per_block() -> Result<()> {
    let function = ElementFunction::new("arange", counting_arange);
    let x = builder().build(BuildRequest::new(function, ChunkSpec::Uniform(2)).shape(&[5, 3]))?;

    assert_eq!(x.dtype(), DType::Int64);
    assert_eq!(ARANGE_CALLS.load(Ordering::SeqCst), 1);

    let blocks = scheduler().compute_blocks(&x)?;
    assert_eq!(blocks.len(), 6);
    assert_eq!(ARANGE_CALLS.load(Ordering::SeqCst), 7);

    let corner = &blocks[&Key::new(x.name(), vec![2, 1])];
    assert_eq!(corner.shape(), &[1, 1]);
    Ok(())
}

static SHARED_CALLS: AtomicUsize = AtomicUsize::new(0);

#[allow(clippy::unnecessary_wraps)]
fn counting_shared(shape: &[usize], _args: &[Param], dtype: Option<DType>, _kwargs: &Params) -> Result<Block> {
    SHARED_CALLS.fetch_add(1, Ordering::SeqCst);
    let data = ArrayD::from_shape_fn(IxDyn(shape), |idx| idx.slice().iter().sum::<usize>() as i64);
    Ok(Block::from_i64(data, dtype.unwrap_or(DType::Int64)))
}

#[test]
fn test_compute_many_runs_shared_tasks_once() -> Result<()> {
    let function = ElementFunction::new("shared", counting_shared);
    let x = builder().build(BuildRequest::new(function, ChunkSpec::Uniform(2)).shape(&[5, 3]))?;
    assert_eq!(SHARED_CALLS.load(Ordering::SeqCst), 1);

    let along_rows = ReduceOptions::new().axis(Axes::One(0));
    let total = x.sum(&along_rows)?;
    let average = x.mean(&along_rows)?;
    let results = scheduler().compute_many(&[&total, &average])?;
    // one dtype probe, then each of the 6 input blocks once
    assert_eq!(SHARED_CALLS.load(Ordering::SeqCst), 7);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], Block::Int64(ndarray::arr1(&[2, 7, 2]).into_dyn()));
    assert_eq!(results[1].dtype(), DType::Float64);
    assert_eq!(results[0], scheduler().compute(&total)?);
    assert_eq!(results[1], scheduler().compute(&average)?);

    assert!(scheduler().compute_many(&[])?.is_empty());
    Ok(())
}

#[test]
fn test_into_parts_exposes_construction_result() -> Result<()> {
    let x = builder().zeros(&[5, 4], ChunkSpec::PerDim(vec![2, 4]), Some(DType::Int32))?;
    let keys = x.keys();
    let (graph, name, chunks, dtype) = x.into_parts();

    assert_eq!(name, "zeros-1");
    assert_eq!(chunks.plans(), &[vec![2, 2, 1], vec![4]]);
    assert_eq!(dtype, DType::Int32);
    assert_eq!(graph.len(), 3);
    assert!(keys.iter().all(|key| graph.contains(key)));
    Ok(())
}

#[test]
fn test_from_array_round_trip() -> Result<()> {
    let data = ArrayD::from_shape_fn(IxDyn(&[7, 5]), |idx| (idx[0] * 10 + idx[1]) as i32);
    let x = builder().from_array(&data, ChunkSpec::PerDim(vec![3, 2]))?;
    assert_eq!(x.dtype(), DType::Int32);
    assert_eq!(x.graph().len(), 9);
    assert!(matches!(x.graph().get(&x.keys()[0]), Some(Task::Literal(_))));

    match scheduler().compute(&x)? {
        Block::Int32(values) => assert_eq!(values, data),
        other => panic!("Expected an int32 block, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_scalar_array_has_one_block() -> Result<()> {
    let x = builder().from_array(&arr0(5.0_f64).into_dyn(), ChunkSpec::PerDim(vec![]))?;
    assert_eq!(x.ndim(), 0);
    assert_eq!(x.keys(), vec![Key::new(x.name(), vec![])]);
    assert_eq!(scheduler().compute(&x)?, Block::Float64(arr0(5.0).into_dyn()));
    Ok(())
}

#[test]
fn test_invalid_explicit_chunks() {
    let result = builder().ones(&[5, 4], ChunkSpec::Explicit(vec![vec![2, 2], vec![4]]), None);
    match result {
        Err(BlockwiseError::InvalidChunks { shape, chunks, .. }) => {
            assert_eq!(shape, vec![5, 4]);
            assert_eq!(chunks, vec![vec![2, 2], vec![4]]);
        }
        other => panic!("Expected InvalidChunks, got {other:?}"),
    }
}

#[test]
fn test_cull_reports_missing_keys() -> Result<()> {
    let x = builder().ones(&[4], ChunkSpec::Uniform(2), None)?;
    let culled = x.graph().cull(&[Key::new(x.name(), vec![1])])?;
    assert_eq!(culled.len(), 1);

    match x.graph().cull(&[Key::new("missing", vec![0])]) {
        Err(BlockwiseError::MissingKey { key }) => assert_eq!(key, "('missing', 0)"),
        other => panic!("Expected MissingKey, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_reduction_shares_input_entries() -> Result<()> {
    let x = builder().ones(&[6, 6], ChunkSpec::Uniform(3), None)?;
    let total = x.sum(&ReduceOptions::new())?;
    for key in x.keys() {
        assert_eq!(total.graph().get(&key), x.graph().get(&key));
    }
    // 4 inputs, 4 partials, 1 aggregate
    assert_eq!(total.graph().len(), 9);
    Ok(())
}

#[test]
fn test_parallel_config() -> Result<()> {
    assert!(ParallelConfig::default().num_threads.is_none());
    assert_eq!(ParallelConfig::with_threads(3).num_threads, Some(3));
    assert!(ParallelConfig::all_cores().num_threads.is_some_and(|n| n > 0));

    let scheduler = LocalScheduler::new(&ParallelConfig::with_threads(3))?;
    assert_eq!(scheduler.num_threads(), 3);
    Ok(())
}
