//! Element types and the in-memory block representation
//!
//! A [`Block`] is one rectangular piece of a chunked array, held as an
//! `ndarray::ArrayD` of one of the supported element types.

use ndarray::{ArrayD, IxDyn, Slice};
use std::ops::Range;

/// Element type of a block or of a whole chunked array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    /// Get the string representation of the dtype
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dense block of elements
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Bool(ArrayD<bool>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

macro_rules! each_block {
    ($block:expr, $arr:ident => $body:expr) => {
        match $block {
            Block::Bool($arr) => $body,
            Block::Int32($arr) => $body,
            Block::Int64($arr) => $body,
            Block::Float32($arr) => $body,
            Block::Float64($arr) => $body,
        }
    };
}

macro_rules! map_block {
    ($block:expr, $arr:ident => $body:expr) => {
        match $block {
            Block::Bool($arr) => Block::Bool($body),
            Block::Int32($arr) => Block::Int32($body),
            Block::Int64($arr) => Block::Int64($body),
            Block::Float32($arr) => Block::Float32($body),
            Block::Float64($arr) => Block::Float64($body),
        }
    };
}

impl Block {
    /// A block of `shape` with every element set to `value` cast to `dtype`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn filled(shape: &[usize], value: f64, dtype: DType) -> Self {
        let dim = IxDyn(shape);
        match dtype {
            DType::Bool => Self::Bool(ArrayD::from_elem(dim, value != 0.0)),
            DType::Int32 => Self::Int32(ArrayD::from_elem(dim, value as i32)),
            DType::Int64 => Self::Int64(ArrayD::from_elem(dim, value as i64)),
            DType::Float32 => Self::Float32(ArrayD::from_elem(dim, value as f32)),
            DType::Float64 => Self::Float64(ArrayD::from_elem(dim, value)),
        }
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        each_block!(self, a => a.shape())
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        each_block!(self, a => a.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements widened to `f64`
    #[must_use]
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            Self::Bool(a) => a.mapv(|x| if x { 1.0 } else { 0.0 }),
            Self::Int32(a) => a.mapv(f64::from),
            #[allow(clippy::cast_precision_loss)]
            Self::Int64(a) => a.mapv(|x| x as f64),
            Self::Float32(a) => a.mapv(f64::from),
            Self::Float64(a) => a.clone(),
        }
    }

    /// Elements cast to `i64`, truncating floats toward zero
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_i64(&self) -> ArrayD<i64> {
        match self {
            Self::Bool(a) => a.mapv(i64::from),
            Self::Int32(a) => a.mapv(i64::from),
            Self::Int64(a) => a.clone(),
            Self::Float32(a) => a.mapv(|x| x as i64),
            Self::Float64(a) => a.mapv(|x| x as i64),
        }
    }

    /// Truthiness of every element; NaN counts as true
    #[must_use]
    pub fn to_bool(&self) -> ArrayD<bool> {
        match self {
            Self::Bool(a) => a.clone(),
            Self::Int32(a) => a.mapv(|x| x != 0),
            Self::Int64(a) => a.mapv(|x| x != 0),
            Self::Float32(a) => a.mapv(|x| x != 0.0),
            Self::Float64(a) => a.mapv(|x| x != 0.0),
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_f64(data: ArrayD<f64>, dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Bool(data.mapv(|x| x != 0.0)),
            DType::Int32 => Self::Int32(data.mapv(|x| x as i32)),
            DType::Int64 => Self::Int64(data.mapv(|x| x as i64)),
            DType::Float32 => Self::Float32(data.mapv(|x| x as f32)),
            DType::Float64 => Self::Float64(data),
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_i64(data: ArrayD<i64>, dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Bool(data.mapv(|x| x != 0)),
            DType::Int32 => Self::Int32(data.mapv(|x| x as i32)),
            DType::Int64 => Self::Int64(data),
            DType::Float32 => Self::Float32(data.mapv(|x| x as f32)),
            DType::Float64 => Self::Float64(data.mapv(|x| x as f64)),
        }
    }

    #[must_use]
    pub fn from_bool(data: ArrayD<bool>, dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Bool(data),
            _ => Self::from_i64(data.mapv(i64::from), dtype),
        }
    }

    /// Convert the block to another element type
    #[must_use]
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        match (self, dtype) {
            (Self::Bool(a), _) => Self::from_bool(a.clone(), dtype),
            (_, DType::Bool) => Self::Bool(self.to_bool()),
            (Self::Int32(_) | Self::Int64(_), _) => Self::from_i64(self.to_i64(), dtype),
            _ => Self::from_f64(self.to_f64(), dtype),
        }
    }

    /// Copy out the sub-block covering `ranges`, one range per dimension
    #[must_use]
    pub(crate) fn slice(&self, ranges: &[Range<usize>]) -> Self {
        map_block!(self, a => a
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned())
    }

    /// Drop the length-1 axes listed in `axes`
    #[must_use]
    pub fn squeeze_axes(self, axes: &[usize]) -> Self {
        let mut sorted = axes.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        map_block!(self, a => {
            let mut a = a;
            for &axis in &sorted {
                a = a.index_axis_move(ndarray::Axis(axis), 0);
            }
            a
        })
    }

    /// Write `other` into the region of `self` starting at `offsets`
    pub fn assign_at(&mut self, offsets: &[usize], other: &Self) {
        let other = other.cast(self.dtype());
        let ranges: Vec<Range<usize>> = offsets
            .iter()
            .zip(other.shape())
            .map(|(&start, &len)| start..start + len)
            .collect();
        match (self, &other) {
            (Self::Bool(dst), Self::Bool(src)) => assign_region(dst, &ranges, src),
            (Self::Int32(dst), Self::Int32(src)) => assign_region(dst, &ranges, src),
            (Self::Int64(dst), Self::Int64(src)) => assign_region(dst, &ranges, src),
            (Self::Float32(dst), Self::Float32(src)) => assign_region(dst, &ranges, src),
            (Self::Float64(dst), Self::Float64(src)) => assign_region(dst, &ranges, src),
            _ => unreachable!("cast produced a block of a different dtype"),
        }
    }
}

fn assign_region<T: Clone>(dst: &mut ArrayD<T>, ranges: &[Range<usize>], src: &ArrayD<T>) {
    dst.slice_each_axis_mut(|ax| Slice::from(ranges[ax.axis.index()].clone()))
        .assign(src);
}

/// Element types that can be stored in a [`Block`]
pub trait Element: Clone + Send + Sync + 'static {
    const DTYPE: DType;

    fn into_block(data: ArrayD<Self>) -> Block;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn into_block(data: ArrayD<Self>) -> Block {
                Block::$variant(data)
            }
        }

        impl From<ArrayD<$ty>> for Block {
            fn from(data: ArrayD<$ty>) -> Self {
                Block::$variant(data)
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);
