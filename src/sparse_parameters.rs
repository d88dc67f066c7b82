use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use crate::parameters::GpValidParams;
use linfa::{Float, ParamGuard};
use ndarray::Array2;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Sparse GP inducing points specification
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Inducings<F: Float> {
    /// `usize` points are selected randomly in the training dataset
    Randomized(usize),
    /// Points are given as a (npoints, d) matrix
    Located(Array2<F>),
}

impl<F: Float> Default for Inducings<F> {
    fn default() -> Inducings<F> {
        Self::Randomized(10)
    }
}

/// A set of validated sparse GP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Mean: Serialize, Kern: Serialize",
        deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, Kern: Deserialize<'de>"
    ))
)]
pub struct SgpValidParams<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> {
    /// GP parameters (mean, kernel, noise variance)
    pub(crate) gp_params: GpValidParams<F, Mean, Kern>,
    /// Inducing points specification used by the `Fit` entry point
    pub(crate) z: Inducings<F>,
    /// Nugget added to the inducing covariance diagonal before factorization
    pub(crate) nugget: F,
    /// Random generator seed for randomized inducing points
    pub(crate) seed: Option<u64>,
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> Default
    for SgpValidParams<F, Mean, Kern>
{
    fn default() -> SgpValidParams<F, Mean, Kern> {
        SgpValidParams {
            gp_params: GpValidParams::default(),
            z: Inducings::default(),
            nugget: F::cast(1e-10),
            seed: None,
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> SgpValidParams<F, Mean, Kern> {
    /// Get the prior mean model
    pub fn mean(&self) -> &Mean {
        &self.gp_params.mean
    }

    /// Get the covariance model k(x, x')
    pub fn kernel(&self) -> &Kern {
        &self.gp_params.kernel
    }

    /// Get the measurement noise variance
    pub fn noise_variance(&self) -> F {
        self.gp_params.noise_variance
    }

    /// Get the inducing points specification
    pub fn inducings(&self) -> &Inducings<F> {
        &self.z
    }

    /// Get the nugget added to the inducing covariance diagonal
    pub fn nugget(&self) -> F {
        self.nugget
    }

    /// Get the random generator seed
    pub fn seed(&self) -> Option<&u64> {
        self.seed.as_ref()
    }
}

#[derive(Clone, Debug)]
/// The set of parameters configuring the execution of
/// the [sparse GP algorithm](struct.SparseGaussianProcess.html).
pub struct SgpParams<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>>(
    SgpValidParams<F, Mean, Kern>,
);

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> SgpParams<F, Mean, Kern> {
    /// A constructor for sparse GP parameters given a covariance model
    /// and an inducing points specification; the mean model defaults.
    pub fn new(kernel: Kern, inducings: Inducings<F>) -> SgpParams<F, Mean, Kern> {
        Self(SgpValidParams {
            gp_params: GpValidParams {
                mean: Mean::default(),
                kernel,
                noise_variance: F::zero(),
            },
            z: inducings,
            nugget: F::cast(1e-10),
            seed: None,
        })
    }

    /// Set the prior mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.gp_params.mean = mean;
        self
    }

    /// Set the covariance model.
    pub fn kernel(mut self, kernel: Kern) -> Self {
        self.0.gp_params.kernel = kernel;
        self
    }

    /// Set the measurement noise variance.
    pub fn noise_variance(mut self, noise_variance: F) -> Self {
        self.0.gp_params.noise_variance = noise_variance;
        self
    }

    /// Specify nz inducing points as a (nz, d) matrix.
    pub fn inducings(mut self, z: Array2<F>) -> Self {
        self.0.z = Inducings::Located(z);
        self
    }

    /// Specify nz inducing points to be picked randomly in the input
    /// training dataset.
    pub fn n_inducings(mut self, nz: usize) -> Self {
        self.0.z = Inducings::Randomized(nz);
        self
    }

    /// Set the nugget added to the diagonal of the inducing covariance
    /// block before factorization.
    ///
    /// Inducing sets dense with respect to the kernel length scale make
    /// `K_uu` ill-conditioned even when the kernel is valid; the nugget
    /// keeps the factorization well-posed. Defaults to 1e-10.
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget = nugget;
        self
    }

    /// Set the seed of the random generator used to pick inducing points.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> From<SgpValidParams<F, Mean, Kern>>
    for SgpParams<F, Mean, Kern>
{
    fn from(valid: SgpValidParams<F, Mean, Kern>) -> Self {
        SgpParams(valid)
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> ParamGuard
    for SgpParams<F, Mean, Kern>
{
    type Checked = SgpValidParams<F, Mean, Kern>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let noise = self.0.gp_params.noise_variance;
        if noise < F::zero() || !noise.is_finite() {
            return Err(GpError::InvalidConfig(format!(
                "`noise_variance` should be a non-negative finite number, got {noise}"
            )));
        }
        let nugget = self.0.nugget;
        if nugget <= F::zero() || !nugget.is_finite() {
            return Err(GpError::InvalidConfig(format!(
                "`nugget` should be a positive finite number, got {nugget}"
            )));
        }
        match &self.0.z {
            Inducings::Randomized(0) => {
                return Err(GpError::InvalidConfig(
                    "at least one inducing point is required".to_string(),
                ));
            }
            Inducings::Located(z) if z.nrows() == 0 => {
                return Err(GpError::InvalidConfig(
                    "at least one inducing point is required".to_string(),
                ));
            }
            _ => {}
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::SquaredExponential;
    use crate::mean_models::ZeroMean;
    use ndarray::Array2;

    #[test]
    fn test_empty_inducings_rejected() {
        let params = SgpParams::<f64, ZeroMean, SquaredExponential<f64>>::new(
            SquaredExponential::default(),
            Inducings::Located(Array2::zeros((0, 1))),
        );
        assert!(matches!(params.check(), Err(GpError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_nugget_rejected() {
        let params = SgpParams::<f64, ZeroMean, SquaredExponential<f64>>::new(
            SquaredExponential::default(),
            Inducings::Randomized(5),
        )
        .nugget(-1e-10);
        assert!(matches!(params.check(), Err(GpError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder() {
        let params = SgpParams::<f64, ZeroMean, SquaredExponential<f64>>::new(
            SquaredExponential::default(),
            Inducings::Randomized(5),
        )
        .noise_variance(0.1)
        .seed(Some(42))
        .check()
        .unwrap();
        assert_eq!(0.1, params.noise_variance());
        assert_eq!(1e-10, params.nugget());
        assert_eq!(Some(&42), params.seed());
    }
}
