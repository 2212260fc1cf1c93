//! Reduction variants, options and axis normalization
//!
//! Each [`Reduction`] is bound once per call to a [`Kernel`] and a default
//! output dtype; the plan builders never look the variant up again per block.

use super::kernels::{FoldOp, Kernel, MomentStat};
use crate::block::DType;
use crate::errors::{BlockwiseError, Result};

/// Supported cross-block reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    Prod,
    Mean,
    Var,
    Std,
    Min,
    Max,
    Any,
    All,
    NanSum,
    NanProd,
    NanMean,
    NanVar,
    NanStd,
    NanMin,
    NanMax,
    /// Central moment of the given order, divided by `n - ddof`
    Moment { order: u32 },
}

impl Reduction {
    /// Get the string representation of the reduction
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Prod => "prod",
            Self::Mean => "mean",
            Self::Var => "var",
            Self::Std => "std",
            Self::Min => "min",
            Self::Max => "max",
            Self::Any => "any",
            Self::All => "all",
            Self::NanSum => "nansum",
            Self::NanProd => "nanprod",
            Self::NanMean => "nanmean",
            Self::NanVar => "nanvar",
            Self::NanStd => "nanstd",
            Self::NanMin => "nanmin",
            Self::NanMax => "nanmax",
            Self::Moment { .. } => "moment",
        }
    }

    /// The kernel family that computes this reduction
    #[must_use]
    pub const fn kernel(self) -> Kernel {
        match self {
            Self::Sum => Kernel::Fold { op: FoldOp::Sum, skipna: false },
            Self::Prod => Kernel::Fold { op: FoldOp::Prod, skipna: false },
            Self::Min => Kernel::Fold { op: FoldOp::Min, skipna: false },
            Self::Max => Kernel::Fold { op: FoldOp::Max, skipna: false },
            Self::Any => Kernel::Fold { op: FoldOp::Any, skipna: false },
            Self::All => Kernel::Fold { op: FoldOp::All, skipna: false },
            Self::NanSum => Kernel::Fold { op: FoldOp::Sum, skipna: true },
            Self::NanProd => Kernel::Fold { op: FoldOp::Prod, skipna: true },
            Self::NanMin => Kernel::Fold { op: FoldOp::Min, skipna: true },
            Self::NanMax => Kernel::Fold { op: FoldOp::Max, skipna: true },
            Self::Mean => Kernel::Moments { stat: MomentStat::Mean, skipna: false },
            Self::Var => Kernel::Moments { stat: MomentStat::Var, skipna: false },
            Self::Std => Kernel::Moments { stat: MomentStat::Std, skipna: false },
            Self::NanMean => Kernel::Moments { stat: MomentStat::Mean, skipna: true },
            Self::NanVar => Kernel::Moments { stat: MomentStat::Var, skipna: true },
            Self::NanStd => Kernel::Moments { stat: MomentStat::Std, skipna: true },
            Self::Moment { order } => Kernel::Moments {
                stat: MomentStat::Central(order),
                skipna: false,
            },
        }
    }

    /// Output dtype when the caller does not override it
    #[must_use]
    pub const fn default_dtype(self, input: DType) -> DType {
        match self {
            Self::Sum | Self::Prod | Self::NanSum | Self::NanProd => match input {
                DType::Bool | DType::Int32 | DType::Int64 => DType::Int64,
                other => other,
            },
            Self::Mean
            | Self::Var
            | Self::Std
            | Self::NanMean
            | Self::NanVar
            | Self::NanStd
            | Self::Moment { .. } => match input {
                DType::Float32 => DType::Float32,
                _ => DType::Float64,
            },
            Self::Min | Self::Max | Self::NanMin | Self::NanMax => input,
            Self::Any | Self::All => DType::Bool,
        }
    }
}

/// Index-returning reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgReduction {
    ArgMin,
    ArgMax,
    NanArgMin,
    NanArgMax,
}

impl ArgReduction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArgMin => "argmin",
            Self::ArgMax => "argmax",
            Self::NanArgMin => "nanargmin",
            Self::NanArgMax => "nanargmax",
        }
    }

    #[must_use]
    pub const fn is_min(self) -> bool {
        matches!(self, Self::ArgMin | Self::NanArgMin)
    }

    #[must_use]
    pub const fn skips_nan(self) -> bool {
        matches!(self, Self::NanArgMin | Self::NanArgMax)
    }
}

/// Axis selection for a reduction; negative values count from the last dimension
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Axes {
    /// Every dimension
    #[default]
    All,
    One(isize),
    Many(Vec<isize>),
}

impl From<isize> for Axes {
    fn from(axis: isize) -> Self {
        Self::One(axis)
    }
}

impl From<Vec<isize>> for Axes {
    fn from(axes: Vec<isize>) -> Self {
        Self::Many(axes)
    }
}

impl From<&[isize]> for Axes {
    fn from(axes: &[isize]) -> Self {
        Self::Many(axes.to_vec())
    }
}

/// Resolve `axes` against an array of `ndim` dimensions
///
/// The result is sorted ascending and free of duplicates.
///
/// # Errors
///
/// Returns [`BlockwiseError::AxisOutOfBounds`] for an axis outside
/// `[-ndim, ndim)` and [`BlockwiseError::DuplicateAxis`] when two entries
/// name the same dimension.
pub fn normalize_axes(axes: &Axes, ndim: usize) -> Result<Vec<usize>> {
    let requested: Vec<isize> = match axes {
        Axes::All => return Ok((0..ndim).collect()),
        Axes::One(axis) => vec![*axis],
        Axes::Many(axes) => axes.clone(),
    };

    #[allow(clippy::cast_possible_wrap)]
    let signed_ndim = ndim as isize;
    let mut normalized = Vec::with_capacity(requested.len());
    for axis in requested {
        if axis < -signed_ndim || axis >= signed_ndim {
            return Err(BlockwiseError::AxisOutOfBounds { axis, ndim });
        }
        #[allow(clippy::cast_sign_loss)]
        let resolved = (if axis < 0 { axis + signed_ndim } else { axis }) as usize;
        if normalized.contains(&resolved) {
            return Err(BlockwiseError::DuplicateAxis { axis: resolved });
        }
        normalized.push(resolved);
    }
    normalized.sort_unstable();
    Ok(normalized)
}

/// Options recognized by [`Reduction`]s
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReduceOptions {
    pub axis: Axes,
    /// Keep reduced dimensions with length 1
    pub keepdims: bool,
    /// Accumulation and output dtype override
    pub dtype: Option<DType>,
    /// Delta degrees of freedom for var, std and moment
    pub ddof: usize,
    /// Largest number of partial results one combine task receives
    pub split_every: Option<usize>,
}

impl ReduceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn axis(mut self, axis: impl Into<Axes>) -> Self {
        self.axis = axis.into();
        self
    }

    #[must_use]
    pub fn keepdims(mut self, keepdims: bool) -> Self {
        self.keepdims = keepdims;
        self
    }

    #[must_use]
    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    #[must_use]
    pub fn ddof(mut self, ddof: usize) -> Self {
        self.ddof = ddof;
        self
    }

    #[must_use]
    pub fn split_every(mut self, split_every: usize) -> Self {
        self.split_every = Some(split_every);
        self
    }
}

/// How positions spanning several reduced axes become one index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    /// Last axis varies fastest
    RowMajor,
}

/// Options recognized by [`ArgReduction`]s
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgReduceOptions {
    pub axis: Axes,
    pub keepdims: bool,
    /// Required when an explicit list of more than one axis is reduced
    pub order: Option<IndexOrder>,
    pub split_every: Option<usize>,
}

impl ArgReduceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn axis(mut self, axis: impl Into<Axes>) -> Self {
        self.axis = axis.into();
        self
    }

    #[must_use]
    pub fn keepdims(mut self, keepdims: bool) -> Self {
        self.keepdims = keepdims;
        self
    }

    #[must_use]
    pub fn order(mut self, order: IndexOrder) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub fn split_every(mut self, split_every: usize) -> Self {
        self.split_every = Some(split_every);
        self
    }
}
