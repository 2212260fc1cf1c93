//! Per-block partial-reduce and cross-block combine kernels
//!
//! Every kernel reduces a block with `keepdims` semantics, so partial
//! results of blocks that share their kept coordinates all have the same
//! shape and combine element by element. Dropping reduced dimensions only
//! happens in [`aggregate`], once per output block.

use super::operations::ArgReduction;
use crate::block::{Block, DType};
use crate::errors::{BlockwiseError, Result};
use ndarray::{Array2, ArrayD, ArrayView1, Dimension, IxDyn, Zip};
use std::cmp::Ordering;

/// Element-wise folds with an associative, commutative combine step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    Sum,
    Prod,
    Min,
    Max,
    Any,
    All,
}

impl FoldOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Prod => "prod",
            Self::Min => "min",
            Self::Max => "max",
            Self::Any => "any",
            Self::All => "all",
        }
    }

    fn identity_f64(self, skipna: bool) -> f64 {
        match self {
            Self::Sum | Self::Any => 0.0,
            Self::Prod | Self::All => 1.0,
            Self::Min if skipna => f64::NAN,
            Self::Max if skipna => f64::NAN,
            Self::Min => f64::INFINITY,
            Self::Max => f64::NEG_INFINITY,
        }
    }

    const fn identity_i64(self) -> i64 {
        match self {
            Self::Sum | Self::Any => 0,
            Self::Prod | Self::All => 1,
            Self::Min => i64::MAX,
            Self::Max => i64::MIN,
        }
    }

    fn apply_f64(self, skipna: bool, acc: f64, x: f64) -> f64 {
        match self {
            Self::Sum if skipna && x.is_nan() => acc,
            Self::Prod if skipna && x.is_nan() => acc,
            Self::Sum => acc + x,
            Self::Prod => acc * x,
            Self::Min | Self::Max => {
                if x.is_nan() {
                    if skipna {
                        acc
                    } else {
                        f64::NAN
                    }
                } else if acc.is_nan() {
                    if skipna {
                        x
                    } else {
                        acc
                    }
                } else if self == Self::Min {
                    acc.min(x)
                } else {
                    acc.max(x)
                }
            }
            Self::Any => f64::from(u8::from(acc != 0.0 || x != 0.0)),
            Self::All => f64::from(u8::from(acc != 0.0 && x != 0.0)),
        }
    }

    fn apply_i64(self, acc: i64, x: i64) -> i64 {
        match self {
            Self::Sum => acc.wrapping_add(x),
            Self::Prod => acc.wrapping_mul(x),
            Self::Min => acc.min(x),
            Self::Max => acc.max(x),
            Self::Any => i64::from(acc != 0 || x != 0),
            Self::All => i64::from(acc != 0 && x != 0),
        }
    }
}

/// Statistic finalized from a [`MomentState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentStat {
    Mean,
    Var,
    Std,
    /// Central moment of the given order
    Central(u32),
}

impl MomentStat {
    /// Highest central moment the statistic needs
    #[must_use]
    pub const fn order(self) -> u32 {
        match self {
            Self::Mean => 1,
            Self::Var | Self::Std => 2,
            Self::Central(order) => order,
        }
    }
}

/// Kernel family bound to a reduction for the lifetime of one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Fold { op: FoldOp, skipna: bool },
    Moments { stat: MomentStat, skipna: bool },
    Arg(ArgReduction),
}

impl Kernel {
    /// Stable name used when rendering graphs
    #[must_use]
    pub fn name(self) -> String {
        let prefix = |skipna: bool| if skipna { "nan" } else { "" };
        match self {
            Self::Fold { op, skipna } => format!("{}{}", prefix(skipna), op.as_str()),
            Self::Moments { stat, skipna } => match stat {
                MomentStat::Mean => format!("{}mean", prefix(skipna)),
                MomentStat::Var => format!("{}var", prefix(skipna)),
                MomentStat::Std => format!("{}std", prefix(skipna)),
                MomentStat::Central(order) => format!("{}moment{order}", prefix(skipna)),
            },
            Self::Arg(kind) => kind.as_str().to_string(),
        }
    }

    /// Whether the combine step has a value for an empty group
    #[must_use]
    pub const fn has_identity(self) -> bool {
        match self {
            Self::Fold { op, .. } => matches!(
                op,
                FoldOp::Sum | FoldOp::Prod | FoldOp::Any | FoldOp::All
            ),
            Self::Moments { .. } => true,
            Self::Arg(_) => false,
        }
    }
}

/// Options handed to every kernel invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Reduced dimensions, ascending
    pub axes: Vec<usize>,
    /// Accumulation and output dtype
    pub dtype: DType,
    pub ddof: usize,
}

/// Where a block sits along the reduced axes of an argument reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgPlacement {
    /// Global start of the block along each reduced axis
    pub offsets: Vec<usize>,
    /// Global length of each reduced axis
    pub extents: Vec<usize>,
}

/// Running count, mean and central moment sums of a set of values
#[derive(Debug, Clone, PartialEq)]
pub struct MomentState {
    pub count: f64,
    pub mean: f64,
    /// `central[k - 2]` is the sum of `(x - mean)^k`
    pub central: Vec<f64>,
}

impl MomentState {
    #[must_use]
    pub fn empty(order: u32) -> Self {
        Self {
            count: 0.0,
            mean: f64::NAN,
            central: vec![0.0; order.saturating_sub(1) as usize],
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_values(values: &[f64], order: u32) -> Self {
        if values.is_empty() {
            return Self::empty(order);
        }
        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let central: Vec<f64> = (2..=order)
            .map(|k| {
                #[allow(clippy::cast_possible_wrap)]
                let k = k as i32;
                values.iter().map(|x| (x - mean).powi(k)).sum::<f64>()
            })
            .collect();
        Self {
            count,
            mean,
            central,
        }
    }

    /// Merge states with the exact binomial update around the pooled mean
    #[must_use]
    pub fn merge(parts: &[&Self], order: u32) -> Self {
        let populated: Vec<&Self> = parts.iter().copied().filter(|p| p.count > 0.0).collect();
        let count: f64 = populated.iter().map(|p| p.count).sum();
        if populated.is_empty() {
            return Self::empty(order);
        }
        let mean = populated.iter().map(|p| p.count * p.mean).sum::<f64>() / count;

        let central: Vec<f64> = (2..=order as usize)
            .map(|p| {
                populated
                    .iter()
                    .map(|part| {
                        let delta = part.mean - mean;
                        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                        let mut m = part.central[p - 2] + part.count * delta.powi(p as i32);
                        for k in 1..=p - 2 {
                            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                            let term = binomial(p, k) * part.central[p - k - 2] * delta.powi(k as i32);
                            m += term;
                        }
                        m
                    })
                    .sum::<f64>()
            })
            .collect();

        Self {
            count,
            mean,
            central,
        }
    }

    /// Value of `stat`, dividing moment sums by `count - ddof`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(&self, stat: MomentStat, ddof: usize) -> f64 {
        let denominator = (self.count - ddof as f64).max(0.0);
        match stat {
            MomentStat::Mean => self.mean,
            MomentStat::Var => self.central[0] / denominator,
            MomentStat::Std => (self.central[0] / denominator).sqrt(),
            MomentStat::Central(order) => self.central[order as usize - 2] / denominator,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn binomial(n: usize, k: usize) -> f64 {
    (1..=k).fold(1.0, |acc, i| acc * (n + 1 - i) as f64 / i as f64)
}

/// An element value compared by an argument reduction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    #[must_use]
    pub fn is_nan(self) -> bool {
        matches!(self, Self::Float(x) if x.is_nan())
    }

    #[allow(clippy::cast_precision_loss)]
    fn compare(self, other: Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(&b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Self::Int(a), Self::Float(b)) => (a as f64).partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(b as f64)).unwrap_or(Ordering::Equal),
        }
    }
}

/// Winning value of an argument reduction with its global index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgState {
    pub value: Scalar,
    pub index: i64,
}

impl ArgState {
    /// Whether `self` should replace `current` as the winner
    ///
    /// Ties go to the lower global index. NaN-aware kinds only keep a NaN
    /// when nothing else is available; plain kinds let NaN win.
    #[must_use]
    pub fn beats(&self, current: &Self, kind: ArgReduction) -> bool {
        match (self.value.is_nan(), current.value.is_nan()) {
            (true, true) => self.index < current.index,
            (true, false) => !kind.skips_nan(),
            (false, true) => kind.skips_nan(),
            (false, false) => match self.value.compare(current.value) {
                Ordering::Less => kind.is_min(),
                Ordering::Greater => !kind.is_min(),
                Ordering::Equal => self.index < current.index,
            },
        }
    }
}

/// Intermediate or final value produced by one task
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Block(Block),
    Moments(ArrayD<MomentState>),
    Args(ArrayD<ArgState>),
}

impl Value {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Block(_) => "block",
            Self::Moments(_) => "moment state",
            Self::Args(_) => "argument state",
        }
    }

    /// The block held by this value
    ///
    /// # Errors
    ///
    /// Returns a kernel error if the value is a partial reduction state.
    pub fn as_block(&self) -> Result<&Block> {
        match self {
            Self::Block(block) => Ok(block),
            other => Err(unexpected("block", other)),
        }
    }

    /// Take the block out of this value
    ///
    /// # Errors
    ///
    /// Returns a kernel error if the value is a partial reduction state.
    pub fn into_block(self) -> Result<Block> {
        match self {
            Self::Block(block) => Ok(block),
            other => Err(unexpected("block", &other)),
        }
    }
}

fn unexpected(expected: &str, found: &Value) -> BlockwiseError {
    BlockwiseError::Kernel(format!("expected a {expected}, found a {}", found.kind()))
}

/// Apply `f` to every lane of `data` along `axes`, keeping reduced axes as length 1
///
/// Lanes visit the reduced elements in row-major order.
fn reduce_lanes<T, S>(
    data: &ArrayD<T>,
    axes: &[usize],
    mut f: impl FnMut(ArrayView1<'_, T>) -> S,
) -> Result<ArrayD<S>>
where
    T: Clone,
{
    let shape = data.shape();
    let kept: Vec<usize> = (0..data.ndim()).filter(|a| !axes.contains(a)).collect();
    let order: Vec<usize> = kept.iter().chain(axes).copied().collect();

    let rows: usize = kept.iter().map(|&a| shape[a]).product();
    let cols: usize = axes.iter().map(|&a| shape[a]).product();
    let out_shape: Vec<usize> = shape
        .iter()
        .enumerate()
        .map(|(a, &len)| if axes.contains(&a) { 1 } else { len })
        .collect();

    let flat: Vec<T> = data.view().permuted_axes(order.as_slice()).iter().cloned().collect();
    let lanes = Array2::from_shape_vec((rows, cols), flat)?;
    let values: Vec<S> = lanes.outer_iter().map(&mut f).collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), values)?)
}

fn fold_block(op: FoldOp, skipna: bool, block: &Block, config: &KernelConfig) -> Result<Block> {
    let data = block.cast(config.dtype);
    if config.dtype.is_float() {
        let values = data.to_f64();
        let out = reduce_lanes(&values, &config.axes, |lane| {
            lane.iter()
                .fold(op.identity_f64(skipna), |acc, &x| op.apply_f64(skipna, acc, x))
        })?;
        Ok(Block::from_f64(out, config.dtype))
    } else {
        let values = data.to_i64();
        let out = reduce_lanes(&values, &config.axes, |lane| {
            lane.iter().fold(op.identity_i64(), |acc, &x| op.apply_i64(acc, x))
        })?;
        Ok(Block::from_i64(out, config.dtype))
    }
}

fn fold_parts(
    op: FoldOp,
    skipna: bool,
    parts: &[&Block],
    config: &KernelConfig,
    block_shape: &[usize],
) -> Result<Block> {
    let dim = IxDyn(block_shape);
    if config.dtype.is_float() {
        let mut acc = ArrayD::from_elem(dim, op.identity_f64(skipna));
        for part in parts {
            let values = part.to_f64();
            check_shape(values.shape(), block_shape)?;
            Zip::from(&mut acc)
                .and(&values)
                .for_each(|a, &x| *a = op.apply_f64(skipna, *a, x));
        }
        Ok(Block::from_f64(acc, config.dtype))
    } else {
        let mut acc = ArrayD::from_elem(dim, op.identity_i64());
        for part in parts {
            let values = part.to_i64();
            check_shape(values.shape(), block_shape)?;
            Zip::from(&mut acc)
                .and(&values)
                .for_each(|a, &x| *a = op.apply_i64(*a, x));
        }
        Ok(Block::from_i64(acc, config.dtype))
    }
}

fn check_shape(found: &[usize], expected: &[usize]) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(BlockwiseError::Kernel(format!(
            "partial result of shape {found:?} does not match output block shape {expected:?}"
        )))
    }
}

fn moment_block(
    stat: MomentStat,
    skipna: bool,
    block: &Block,
    config: &KernelConfig,
) -> Result<ArrayD<MomentState>> {
    let values = block.cast(config.dtype).to_f64();
    let order = stat.order();
    reduce_lanes(&values, &config.axes, |lane| {
        let kept: Vec<f64> = lane
            .iter()
            .copied()
            .filter(|x| !(skipna && x.is_nan()))
            .collect();
        MomentState::from_values(&kept, order)
    })
}

fn merge_moments(
    parts: &[&ArrayD<MomentState>],
    order: u32,
    block_shape: &[usize],
) -> Result<ArrayD<MomentState>> {
    for part in parts {
        check_shape(part.shape(), block_shape)?;
    }
    Ok(ArrayD::from_shape_fn(IxDyn(block_shape), |idx| {
        let states: Vec<&MomentState> = parts.iter().map(|part| &part[idx.slice()]).collect();
        MomentState::merge(&states, order)
    }))
}

/// Local argument reduction of one block, with indices already made global
///
/// # Errors
///
/// Returns a kernel error if a reduced axis is not a dimension of the block
/// or the placement does not describe every reduced axis.
pub fn arg_partial(
    kind: ArgReduction,
    block: &Block,
    config: &KernelConfig,
    placement: &ArgPlacement,
) -> Result<Value> {
    let shape = block.shape();
    if let Some(&axis) = config.axes.iter().find(|&&a| a >= shape.len()) {
        return Err(BlockwiseError::Kernel(format!(
            "{} axis {axis} is outside a block of shape {shape:?}",
            kind.as_str()
        )));
    }
    let reduced = config.axes.len();
    if placement.offsets.len() != reduced || placement.extents.len() != reduced {
        return Err(BlockwiseError::Kernel(format!(
            "{} placement covers {} offsets and {} extents for {reduced} reduced axes",
            kind.as_str(),
            placement.offsets.len(),
            placement.extents.len()
        )));
    }
    let local_extents: Vec<usize> = config.axes.iter().map(|&a| shape[a]).collect();
    let strides = row_major_strides(&placement.extents);
    let to_global = |local_linear: usize| -> i64 {
        let local = unravel(local_linear, &local_extents);
        let global: usize = local
            .iter()
            .zip(&placement.offsets)
            .zip(&strides)
            .map(|((&l, &offset), &stride)| (l + offset) * stride)
            .sum();
        #[allow(clippy::cast_possible_wrap)]
        let global = global as i64;
        global
    };

    let states = if block.dtype().is_float() {
        reduce_lanes(&block.to_f64(), &config.axes, |lane| {
            best_in_lane(kind, lane.iter().map(|&x| Scalar::Float(x)), &to_global)
        })?
    } else {
        reduce_lanes(&block.to_i64(), &config.axes, |lane| {
            best_in_lane(kind, lane.iter().map(|&x| Scalar::Int(x)), &to_global)
        })?
    };
    Ok(Value::Args(states))
}

fn best_in_lane(
    kind: ArgReduction,
    values: impl Iterator<Item = Scalar>,
    to_global: impl Fn(usize) -> i64,
) -> ArgState {
    let mut best: Option<ArgState> = None;
    for (local, value) in values.enumerate() {
        let candidate = ArgState {
            value,
            index: to_global(local),
        };
        best = match best {
            Some(current) if !candidate.beats(&current, kind) => Some(current),
            _ => Some(candidate),
        };
    }
    // blocks never have an empty lane
    best.unwrap_or(ArgState {
        value: Scalar::Float(f64::NAN),
        index: 0,
    })
}

fn merge_args(
    kind: ArgReduction,
    parts: &[&ArrayD<ArgState>],
    block_shape: &[usize],
) -> Result<ArrayD<ArgState>> {
    let Some((first, rest)) = parts.split_first() else {
        return Err(BlockwiseError::Kernel(format!(
            "{} received no partial results",
            kind.as_str()
        )));
    };
    check_shape(first.shape(), block_shape)?;
    let mut acc = (*first).clone();
    for part in rest {
        check_shape(part.shape(), block_shape)?;
        Zip::from(&mut acc).and(*part).for_each(|current, candidate| {
            if candidate.beats(current, kind) {
                *current = *candidate;
            }
        });
    }
    Ok(acc)
}

/// Strides of a row-major array with the given extents
#[must_use]
pub fn row_major_strides(extents: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; extents.len()];
    for i in (0..extents.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * extents[i + 1];
    }
    strides
}

/// Row-major multi-index of `linear` within `extents`
#[must_use]
pub fn unravel(mut linear: usize, extents: &[usize]) -> Vec<usize> {
    let mut idx = vec![0; extents.len()];
    for i in (0..extents.len()).rev() {
        idx[i] = linear % extents[i];
        linear /= extents[i];
    }
    idx
}

/// Local reduce of one block for fold and moment kernels
///
/// # Errors
///
/// Returns a kernel error for argument kernels, which need a placement and
/// go through [`arg_partial`].
pub fn partial_reduce(kernel: Kernel, block: &Block, config: &KernelConfig) -> Result<Value> {
    match kernel {
        Kernel::Fold { op, skipna } => fold_block(op, skipna, block, config).map(Value::Block),
        Kernel::Moments { stat, skipna } => {
            moment_block(stat, skipna, block, config).map(Value::Moments)
        }
        Kernel::Arg(kind) => Err(BlockwiseError::Kernel(format!(
            "{} partials need a block placement",
            kind.as_str()
        ))),
    }
}

/// Combine partial results into one partial result of the same kind
///
/// # Errors
///
/// Returns a kernel error if the parts are of the wrong kind or shape.
pub fn combine(
    kernel: Kernel,
    parts: &[&Value],
    config: &KernelConfig,
    block_shape: &[usize],
) -> Result<Value> {
    match kernel {
        Kernel::Fold { op, skipna } => {
            let blocks = parts
                .iter()
                .map(|part| part.as_block())
                .collect::<Result<Vec<_>>>()?;
            fold_parts(op, skipna, &blocks, config, block_shape).map(Value::Block)
        }
        Kernel::Moments { stat, .. } => {
            let states = parts
                .iter()
                .map(|part| match part {
                    Value::Moments(states) => Ok(states),
                    other => Err(unexpected("moment state", other)),
                })
                .collect::<Result<Vec<_>>>()?;
            merge_moments(&states, stat.order(), block_shape).map(Value::Moments)
        }
        Kernel::Arg(kind) => {
            let states = parts
                .iter()
                .map(|part| match part {
                    Value::Args(states) => Ok(states),
                    other => Err(unexpected("argument state", other)),
                })
                .collect::<Result<Vec<_>>>()?;
            merge_args(kind, &states, block_shape).map(Value::Args)
        }
    }
}

/// Combine partial results and finalize them into an output block
///
/// `block_shape` is the output block shape with reduced axes kept as length
/// 1; they are dropped afterwards unless `keepdims` is set.
///
/// # Errors
///
/// Returns a kernel error if the parts are of the wrong kind or shape.
pub fn aggregate(
    kernel: Kernel,
    parts: &[&Value],
    config: &KernelConfig,
    keepdims: bool,
    block_shape: &[usize],
) -> Result<Block> {
    let block = match combine(kernel, parts, config, block_shape)? {
        Value::Block(block) => block.cast(config.dtype),
        Value::Moments(states) => {
            let Kernel::Moments { stat, .. } = kernel else {
                return Err(BlockwiseError::Kernel(
                    "moment state produced by a non-moment kernel".to_string(),
                ));
            };
            let values = states.mapv(|state| state.finalize(stat, config.ddof));
            Block::from_f64(values, config.dtype)
        }
        Value::Args(states) => Block::Int64(states.mapv(|state| state.index)),
    };
    Ok(if keepdims {
        block
    } else {
        block.squeeze_axes(&config.axes)
    })
}
