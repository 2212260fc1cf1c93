//! Cross-block reductions
//!
//! This module turns a chunked array into the plan of a reduction over some
//! of its axes: per-block partial results, combined across blocks that share
//! their kept coordinates.
//!
//! # Organization
//!
//! - [`operations`]: reduction variants, options and axis normalization
//! - [`kernels`]: partial-reduce, combine and finalize kernels
//! - [`aggregate`]: plan construction for value reductions
//! - [`arg`]: plan construction for index-returning reductions

pub mod aggregate;
pub mod arg;
pub mod kernels;
pub mod operations;

pub use aggregate::reduce;
pub use arg::{arg_aggregate, arg_reduce};
pub use kernels::{ArgState, Kernel, KernelConfig, MomentState, Value};
pub use operations::{
    normalize_axes, ArgReduceOptions, ArgReduction, Axes, IndexOrder, ReduceOptions, Reduction,
};

use crate::array::ChunkedArray;
use crate::errors::Result;

macro_rules! reduction_methods {
    ($($method:ident => $variant:ident),* $(,)?) => {
        $(
            #[doc = concat!("Plan `", stringify!($method), "` over the axes in `options`")]
            ///
            /// # Errors
            ///
            /// See [`reduce`].
            pub fn $method(&self, options: &ReduceOptions) -> Result<ChunkedArray> {
                reduce(self, Reduction::$variant, options)
            }
        )*
    };
}

macro_rules! arg_methods {
    ($($method:ident => $variant:ident),* $(,)?) => {
        $(
            #[doc = concat!("Plan `", stringify!($method), "` over the axes in `options`")]
            ///
            /// # Errors
            ///
            /// See [`arg_reduce`].
            pub fn $method(&self, options: &ArgReduceOptions) -> Result<ChunkedArray> {
                arg_reduce(self, ArgReduction::$variant, options)
            }
        )*
    };
}

impl ChunkedArray {
    /// Plan any [`Reduction`] over this array
    ///
    /// # Errors
    ///
    /// See [`reduce`].
    pub fn reduce(&self, reduction: Reduction, options: &ReduceOptions) -> Result<ChunkedArray> {
        reduce(self, reduction, options)
    }

    reduction_methods! {
        sum => Sum,
        prod => Prod,
        mean => Mean,
        var => Var,
        std => Std,
        min => Min,
        max => Max,
        any => Any,
        all => All,
        nansum => NanSum,
        nanprod => NanProd,
        nanmean => NanMean,
        nanvar => NanVar,
        nanstd => NanStd,
        nanmin => NanMin,
        nanmax => NanMax,
    }

    /// Plan the central moment of `order`, divided by `n - ddof`
    ///
    /// # Errors
    ///
    /// See [`reduce`].
    pub fn moment(&self, order: u32, options: &ReduceOptions) -> Result<ChunkedArray> {
        reduce(self, Reduction::Moment { order }, options)
    }

    arg_methods! {
        argmin => ArgMin,
        argmax => ArgMax,
        nanargmin => NanArgMin,
        nanargmax => NanArgMax,
    }
}
