//! A module for covariance functions (kernels) used to build the prior
//! covariance blocks of the GP engines.
//!
//! The following kernels are implemented:
//! * squared exponential,
//! * absolute exponential,
//! * matern 3/2.
//!
//! Any user type implementing [`CovarianceModel`] can be plugged into the
//! engines; the engines only rely on the scalar `value` contract, which must
//! be symmetric (`k(a, b) == k(b, a)`) and positive semi-definite over any
//! finite point set.

use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait for covariance functions k(x, x') used in GP regression
pub trait CovarianceModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Compute covariance between two points `a` and `b` given as (d,) vectors.
    fn value(
        &self,
        a: &ArrayBase<impl Data<Elem = F>, Ix1>,
        b: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F;

    /// Compute the cross-covariance block between two point sets given as
    /// (nx, d) and (ny, d) matrices, returning a (nx, ny) matrix.
    fn cross(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let mut k = Array2::zeros((x.nrows(), y.nrows()));
        for (i, xi) in x.rows().into_iter().enumerate() {
            for (j, yj) in y.rows().into_iter().enumerate() {
                k[[i, j]] = self.value(&xi, &yj);
            }
        }
        k
    }

    /// Compute the self-covariance block of a point set given as a (n, d)
    /// matrix. Only the upper triangle is evaluated, the lower one is
    /// mirrored, exploiting kernel symmetry for a 2x saving.
    fn symmetric(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let n = x.nrows();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let v = self.value(&x.row(i), &x.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        k
    }
}

/// Squared exponential (RBF) kernel
///
/// `k(a, b) = sigma2 * exp(-0.5 * ||a - b||^2 / length^2)`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SquaredExponential<F: Float> {
    /// Signal variance sigma^2
    pub sigma2: F,
    /// Length scale
    pub length: F,
}

impl<F: Float> SquaredExponential<F> {
    /// Constructor given signal variance and length scale
    pub fn new(sigma2: F, length: F) -> Self {
        SquaredExponential { sigma2, length }
    }
}

impl<F: Float> Default for SquaredExponential<F> {
    fn default() -> Self {
        SquaredExponential {
            sigma2: F::one(),
            length: F::one(),
        }
    }
}

impl<F: Float> CovarianceModel<F> for SquaredExponential<F> {
    fn value(
        &self,
        a: &ArrayBase<impl Data<Elem = F>, Ix1>,
        b: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F {
        let mut d2 = F::zero();
        for (ai, bi) in a.iter().zip(b.iter()) {
            let d = *ai - *bi;
            d2 = d2 + d * d;
        }
        self.sigma2 * F::exp(F::cast(-0.5) * d2 / (self.length * self.length))
    }
}

impl<F: Float> fmt::Display for SquaredExponential<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SquaredExponential(sigma2={}, length={})",
            self.sigma2, self.length
        )
    }
}

/// Absolute exponential (Ornstein-Uhlenbeck) kernel
///
/// `k(a, b) = sigma2 * exp(-sum_i |a_i - b_i| / length)`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct AbsoluteExponential<F: Float> {
    /// Signal variance sigma^2
    pub sigma2: F,
    /// Length scale
    pub length: F,
}

impl<F: Float> AbsoluteExponential<F> {
    /// Constructor given signal variance and length scale
    pub fn new(sigma2: F, length: F) -> Self {
        AbsoluteExponential { sigma2, length }
    }
}

impl<F: Float> Default for AbsoluteExponential<F> {
    fn default() -> Self {
        AbsoluteExponential {
            sigma2: F::one(),
            length: F::one(),
        }
    }
}

impl<F: Float> CovarianceModel<F> for AbsoluteExponential<F> {
    fn value(
        &self,
        a: &ArrayBase<impl Data<Elem = F>, Ix1>,
        b: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F {
        let mut d1 = F::zero();
        for (ai, bi) in a.iter().zip(b.iter()) {
            d1 = d1 + (*ai - *bi).abs();
        }
        self.sigma2 * F::exp(-d1 / self.length)
    }
}

impl<F: Float> fmt::Display for AbsoluteExponential<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "AbsoluteExponential(sigma2={}, length={})",
            self.sigma2, self.length
        )
    }
}

/// Matern 3/2 kernel
///
/// `k(a, b) = sigma2 * (1 + sqrt(3) * ||a - b|| / length) * exp(-sqrt(3) * ||a - b|| / length)`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Matern32<F: Float> {
    /// Signal variance sigma^2
    pub sigma2: F,
    /// Length scale
    pub length: F,
}

impl<F: Float> Matern32<F> {
    /// Constructor given signal variance and length scale
    pub fn new(sigma2: F, length: F) -> Self {
        Matern32 { sigma2, length }
    }
}

impl<F: Float> Default for Matern32<F> {
    fn default() -> Self {
        Matern32 {
            sigma2: F::one(),
            length: F::one(),
        }
    }
}

impl<F: Float> CovarianceModel<F> for Matern32<F> {
    fn value(
        &self,
        a: &ArrayBase<impl Data<Elem = F>, Ix1>,
        b: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F {
        let mut d2 = F::zero();
        for (ai, bi) in a.iter().zip(b.iter()) {
            let d = *ai - *bi;
            d2 = d2 + d * d;
        }
        let t = F::cast(3.0_f64.sqrt()) * d2.sqrt() / self.length;
        self.sigma2 * (F::one() + t) * F::exp(-t)
    }
}

impl<F: Float> fmt::Display for Matern32<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern32(sigma2={}, length={})", self.sigma2, self.length)
    }
}
