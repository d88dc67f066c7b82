use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use linfa::{Float, ParamGuard};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Mean: Serialize, Kern: Serialize",
        deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, Kern: Deserialize<'de>"
    ))
)]
pub struct GpValidParams<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> {
    /// Prior mean model representing mean(x)
    pub(crate) mean: Mean,
    /// Covariance model representing k(x, x')
    pub(crate) kernel: Kern,
    /// Measurement noise variance added to the training covariance diagonal
    pub(crate) noise_variance: F,
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> Default
    for GpValidParams<F, Mean, Kern>
{
    fn default() -> GpValidParams<F, Mean, Kern> {
        GpValidParams {
            mean: Mean::default(),
            kernel: Kern::default(),
            noise_variance: F::zero(),
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> GpValidParams<F, Mean, Kern> {
    /// Get the prior mean model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Get the covariance model k(x, x')
    pub fn kernel(&self) -> &Kern {
        &self.kernel
    }

    /// Get the measurement noise variance
    pub fn noise_variance(&self) -> F {
        self.noise_variance
    }
}

#[derive(Clone, Debug)]
/// The set of parameters configuring the execution of
/// the [GP algorithm](struct.GaussianProcess.html).
pub struct GpParams<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>>(
    GpValidParams<F, Mean, Kern>,
);

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> GpParams<F, Mean, Kern> {
    /// A constructor for GP parameters given mean and covariance models
    pub fn new(mean: Mean, kernel: Kern) -> GpParams<F, Mean, Kern> {
        Self(GpValidParams {
            mean,
            kernel,
            noise_variance: F::zero(),
        })
    }

    /// Set the prior mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set the covariance model.
    pub fn kernel(mut self, kernel: Kern) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set the measurement noise variance.
    ///
    /// The noise variance is added to the diagonal of the training
    /// covariance block before inversion. Defaults to 0.
    pub fn noise_variance(mut self, noise_variance: F) -> Self {
        self.0.noise_variance = noise_variance;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> From<GpValidParams<F, Mean, Kern>>
    for GpParams<F, Mean, Kern>
{
    fn from(valid: GpValidParams<F, Mean, Kern>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> ParamGuard
    for GpParams<F, Mean, Kern>
{
    type Checked = GpValidParams<F, Mean, Kern>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let noise = self.0.noise_variance;
        if noise < F::zero() || !noise.is_finite() {
            return Err(GpError::InvalidConfig(format!(
                "`noise_variance` should be a non-negative finite number, got {noise}"
            )));
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

    #[test]
    fn test_negative_noise_rejected() {
        let params = GpParams::<f64, ZeroMean, SquaredExponential<f64>>::new(
            ZeroMean(),
            SquaredExponential::default(),
        )
        .noise_variance(-1.);
        assert!(matches!(params.check(), Err(GpError::InvalidConfig(_))));
    }

    #[test]
    fn test_defaults() {
        let params = GpParams::<f64, ZeroMean, SquaredExponential<f64>>::new(
            ZeroMean(),
            SquaredExponential::default(),
        )
        .check()
        .unwrap();
        assert_eq!(0., params.noise_variance());
    }
}
