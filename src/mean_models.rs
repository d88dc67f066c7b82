//! A module for prior mean functions of the GP engines.
//!
//! The prior mean defaults to the zero function; a constant mean is also
//! provided for fields with a known baseline level.

use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait for prior mean functions used in GP regression
pub trait MeanModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Evaluate the prior mean at the given `x` data points specified
    /// as a (n, d) matrix, returning a (n,) vector.
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F>;
}

/// The zero function as prior mean (default)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ZeroMean();

impl<F: Float> MeanModel<F> for ZeroMean {
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl fmt::Display for ZeroMean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ZeroMean")
    }
}

/// A constant function as prior mean
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ConstantMean<F: Float>(pub F);

impl<F: Float> Default for ConstantMean<F> {
    fn default() -> Self {
        ConstantMean(F::zero())
    }
}

impl<F: Float> MeanModel<F> for ConstantMean<F> {
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.0)
    }
}

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConstantMean({})", self.0)
    }
}
