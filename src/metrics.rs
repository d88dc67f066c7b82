//! A module for metrics to evaluate the predictive quality of trained GP
//! engines through cross validation.

use linfa::dataset::Dataset;
use linfa::{
    traits::{Fit, Predict, PredictInplace},
    Float, ParamGuard,
};
use ndarray::{Array1, Array2};

use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use crate::{GaussianProcess, GpParams, SgpParams, SparseGaussianProcess};

/// A trait for Q2 predictive coefficient cross validation score
pub trait PredictScore<F, P, O>
where
    F: Float,
    P: Fit<Array2<F>, Array1<F>, GpError, Object = O> + ParamGuard,
    O: PredictInplace<Array2<F>, Array1<F>>,
{
    /// Return the training data (xt, yt) of the trained model
    fn training_data(&self) -> Result<(&Array2<F>, &Array1<F>)>;

    /// Return the model parameters
    fn params(&self) -> P;

    /// Compute quality metric Q2 with kfold cross validation.
    ///
    /// Sub models configured like the trained one are refitted on each
    /// fold, so the score reflects the parameter choice rather than one
    /// particular trained state. A perfect predictor scores 1.
    fn q2_score(&self, kfold: usize) -> Result<F> {
        let (xt, yt) = self.training_data()?;
        let dataset = Dataset::new(xt.to_owned(), yt.to_owned());
        let yt_mean = yt.mean().ok_or(GpError::NotTrained)?;
        // Predictive Residual Sum of Squares
        let mut press = F::zero();
        // Total Sum of Squares
        let mut tss = F::zero();
        for (train, valid) in dataset.fold(kfold).into_iter() {
            let model: O = self.params().fit(&train)?;
            let pred = model.predict(valid.records());
            press += (valid.targets() - &pred).mapv(|v| v * v).sum();
            tss += (valid.targets() - yt_mean).mapv(|v| v * v).sum();
        }
        Ok(F::one() - press / tss)
    }

    /// Q2 predictive coefficient with Leave-One-Out Cross-Validation
    fn looq2_score(&self) -> Result<F> {
        let n = self.training_data()?.0.nrows();
        self.q2_score(n)
    }
}

impl<F, Mean, Kern> PredictScore<F, GpParams<F, Mean, Kern>, Self>
    for GaussianProcess<F, Mean, Kern>
where
    F: Float,
    Mean: MeanModel<F>,
    Kern: CovarianceModel<F>,
{
    fn training_data(&self) -> Result<(&Array2<F>, &Array1<F>)> {
        GaussianProcess::training_data(self)
    }

    fn params(&self) -> GpParams<F, Mean, Kern> {
        GpParams::from(self.params.clone())
    }
}

impl<F, Mean, Kern> PredictScore<F, SgpParams<F, Mean, Kern>, Self>
    for SparseGaussianProcess<F, Mean, Kern>
where
    F: Float,
    Mean: MeanModel<F>,
    Kern: CovarianceModel<F>,
{
    fn training_data(&self) -> Result<(&Array2<F>, &Array1<F>)> {
        SparseGaussianProcess::training_data(self)
    }

    fn params(&self) -> SgpParams<F, Mean, Kern> {
        SgpParams::from(self.params.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernels::SquaredExponential;
    use crate::mean_models::ZeroMean;
    use crate::Inducings;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, Array2, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    const PI: f64 = std::f64::consts::PI;

    fn f_obj(x: &Array2<f64>) -> Array2<f64> {
        x.mapv(|v| (3. * PI * v).sin() + 0.3 * (9. * PI * v).cos() + 0.5 * (7. * PI * v).sin())
    }

    fn f_smooth(x: &Array2<f64>) -> Array2<f64> {
        x.mapv(|v| (3. * PI * v).sin())
    }

    fn make_test_data(
        nt: usize,
        eta2: f64,
        rng: &mut Xoshiro256Plus,
        f: fn(&Array2<f64>) -> Array2<f64>,
    ) -> (Array2<f64>, Array1<f64>) {
        let normal = Normal::new(0., eta2.sqrt()).unwrap();
        let gaussian_noise = Array::<f64, _>::random_using((nt, 1), normal, rng);
        let xt = 2. * Array::<f64, _>::random_using((nt, 1), Uniform::new(0., 1.), rng) - 1.;
        let yt = (f(&xt) + gaussian_noise).remove_axis(Axis(1));
        (xt, yt)
    }

    #[test]
    fn test_q2_gp() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let eta2: f64 = 0.01;
        let (xt, yt) = make_test_data(100, eta2, &mut rng, f_obj);

        let gp = GaussianProcess::<f64, ZeroMean, SquaredExponential<f64>>::params(
            ZeroMean(),
            SquaredExponential::new(1., 0.08),
        )
        .noise_variance(eta2)
        .fit(&Dataset::new(xt, yt))
        .expect("GP fitted");

        assert_abs_diff_eq!(gp.looq2_score().unwrap(), 1., epsilon = 0.15);
        assert_abs_diff_eq!(gp.q2_score(10).unwrap(), 1., epsilon = 0.15);
    }

    #[test]
    fn test_q2_sgp() {
        // a target the fixed length scale can track: the sparse posterior
        // only sees the data through the inducing set, so the wigglier
        // f_obj would need tuned hyperparameters to score well
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let eta2: f64 = 0.01;
        let (xt, yt) = make_test_data(200, eta2, &mut rng, f_smooth);

        let sgp = SgpParams::<f64, ZeroMean, _>::new(
            SquaredExponential::new(1., 0.2),
            Inducings::Randomized(50),
        )
        .noise_variance(eta2)
        .seed(Some(42))
        .fit(&Dataset::new(xt, yt))
        .expect("SGP fitted");

        assert_abs_diff_eq!(sgp.looq2_score().unwrap(), 1., epsilon = 0.15);
        assert_abs_diff_eq!(sgp.q2_score(10).unwrap(), 1., epsilon = 0.15);
    }

    #[test]
    fn test_q2_untrained() {
        let gp = GaussianProcess::new(
            crate::Kriging::<f64>::params().check().unwrap(),
        );
        assert!(matches!(gp.q2_score(5), Err(GpError::NotTrained)));
    }
}
