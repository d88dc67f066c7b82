use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use crate::sparse_parameters::{Inducings, SgpParams, SgpValidParams};
use crate::utils::spd_inverse;

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Structures computed during sparse training and reused by every prediction
#[derive(Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(serialize = "F: Serialize", deserialize = "F: Deserialize<'de>"))
)]
pub(crate) struct SgpState<F: Float> {
    /// Training inputs (n, d)
    xt: Array2<F>,
    /// Training outputs (n,)
    yt: Array1<F>,
    /// Inducing points (nz, d)
    z: Array2<F>,
    /// Prior mean evaluated at the inducing points
    mean_u: Array1<F>,
    /// Prior covariance block at the inducing points
    kuu: Array2<F>,
    /// Cached inverse of `K_uu`
    kuu_inv: Array2<F>,
    /// Posterior mean at the inducing points
    mu_u: Array1<F>,
    /// Posterior covariance block at the inducing points
    sigma_uu: Array2<F>,
    /// Posterior cross-covariance between training and inducing points
    sigma_mu: Array2<F>,
}

impl<F: Float> Clone for SgpState<F> {
    fn clone(&self) -> Self {
        Self {
            xt: self.xt.to_owned(),
            yt: self.yt.to_owned(),
            z: self.z.to_owned(),
            mean_u: self.mean_u.to_owned(),
            kuu: self.kuu.to_owned(),
            kuu_inv: self.kuu_inv.to_owned(),
            mu_u: self.mu_u.to_owned(),
            sigma_uu: self.sigma_uu.to_owned(),
            sigma_mu: self.sigma_mu.to_owned(),
        }
    }
}

/// Sparse GP regression engine using the FITC approximation.
///
/// The FITC (Fully Independent Training Conditional) approximation
/// summarizes the n training points through a posterior over nz << n
/// inducing points. Training costs `O(n * nz^2)` instead of the `O(n^3)`
/// of the exact engine, and predictions only touch the inducing blocks.
///
/// Training conditions the prior at the inducing points on the dataset:
///
/// * `Lambda = diag(K_mm - K_mu K_uu^-1 K_mu^T)`, the residual variances
///   the inducing points cannot explain,
/// * `P = (Lambda + noise_variance I)^-1`,
/// * `Delta_uu = K_uu + K_mu^T P K_mu`,
/// * posterior covariance `Sigma_uu = K_uu Delta_uu^-1 K_uu` and mean
///   `mu_u = mean(z) + K_uu Delta_uu^-1 K_mu^T P (y - mean(x))`.
///
/// Predictions then condition on the inducing posterior alone. When the
/// inducing points coincide with the training inputs the approximation is
/// exact and this engine reproduces
/// [`GaussianProcess`](crate::GaussianProcess).
///
/// # Implementation
///
/// Same foundations as the exact engine: `ndarray`/`linfa` data types and
/// traits, Cholesky based inversions through `linfa-linalg`, optional
/// `serde` serialization behind the `serializable` feature. The inducing
/// self-covariance block gets a configurable nugget on its diagonal before
/// factorization, as dense inducing sets make `K_uu` ill-conditioned even
/// for valid kernels. Randomized inducing point selection draws without
/// replacement from the training inputs using a `rand_xoshiro` generator,
/// seedable for reproducibility.
///
/// # Example
///
/// ```no_run
/// use fieldgp::{Inducings, SparseKriging};
/// use linfa::prelude::*;
/// use ndarray::{Array, Array1};
///
/// let xt = Array::linspace(0., 1., 100).insert_axis(ndarray::Axis(1));
/// let yt: Array1<f64> = xt.column(0).mapv(|x| (2. * std::f64::consts::PI * x).sin());
///
/// let sgp = SparseKriging::params(Inducings::Randomized(20))
///     .noise_variance(1e-4)
///     .seed(Some(42))
///     .fit(&Dataset::new(xt, yt))
///     .unwrap();
/// ```
#[derive(Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Mean: Serialize, Kern: Serialize",
        deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, Kern: Deserialize<'de>"
    ))
)]
pub struct SparseGaussianProcess<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> {
    /// Parameters used to configure this engine
    pub(crate) params: SgpValidParams<F, Mean, Kern>,
    /// Trained state, `None` until `train` succeeds
    state: Option<SgpState<F>>,
}

/// Sparse kriging as sparse GP special case when using zero mean and
/// squared exponential kernel
pub type SparseKriging<F> =
    SgpParams<F, crate::mean_models::ZeroMean, crate::kernels::SquaredExponential<F>>;

impl<F: Float> SparseKriging<F> {
    /// Sparse kriging parameters constructor
    pub fn params(inducings: Inducings<F>) -> SparseKriging<F> {
        SgpParams::new(crate::kernels::SquaredExponential::default(), inducings)
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> Clone
    for SparseGaussianProcess<F, Mean, Kern>
{
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            state: self.state.clone(),
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> fmt::Display
    for SparseGaussianProcess<F, Mean, Kern>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SGP(mean={}, kernel={}, noise_variance={}, trained={})",
            self.params.mean(),
            self.params.kernel(),
            self.params.noise_variance(),
            self.state.is_some(),
        )
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>>
    SparseGaussianProcess<F, Mean, Kern>
{
    /// Sparse GP parameters constructor given a covariance model and an
    /// inducing points specification
    pub fn params<NewMean: MeanModel<F>, NewKern: CovarianceModel<F>>(
        kernel: NewKern,
        inducings: Inducings<F>,
    ) -> SgpParams<F, NewMean, NewKern> {
        SgpParams::new(kernel, inducings)
    }

    /// Create an untrained engine from validated parameters
    pub fn new(params: SgpValidParams<F, Mean, Kern>) -> Self {
        SparseGaussianProcess {
            params,
            state: None,
        }
    }

    /// Whether the engine holds a trained state
    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    /// Train the engine on inputs `x` given as a (n, d) matrix, outputs `y`
    /// given as a (n,) vector and inducing points `z` given as a (nz, d)
    /// matrix.
    ///
    /// Computes the FITC posterior at the inducing points. A previously
    /// trained state is replaced wholesale, and only on success.
    pub fn train(
        &mut self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        z: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(GpError::ShapeMismatch(format!(
                "{} training inputs for {} training outputs",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(GpError::ShapeMismatch(
                "training set cannot be empty".to_string(),
            ));
        }
        if z.nrows() == 0 {
            return Err(GpError::ShapeMismatch(
                "inducing point set cannot be empty".to_string(),
            ));
        }
        if z.ncols() != x.ncols() {
            return Err(GpError::ShapeMismatch(format!(
                "inducing points of dim {} for training inputs of dim {}",
                z.ncols(),
                x.ncols()
            )));
        }
        let now = Instant::now();
        let kernel = self.params.kernel();
        let noise = self.params.noise_variance();
        let mean_t = self.params.mean().value(x);
        let mean_u = self.params.mean().value(z);

        let kmu = kernel.cross(x, z);
        // inducing sets dense against the length scale leave K_uu
        // ill-conditioned, the nugget keeps the factorization well-posed
        let kuu = kernel.symmetric(z) + Array2::eye(z.nrows()) * self.params.nugget();
        let kuu_inv = spd_inverse(&kuu, "K_uu")?;

        // Lambda = diag(K_mm - K_mu K_uu^-1 K_mu^T), only the diagonal of
        // the corrected block is ever needed
        let n = x.nrows();
        let b = kmu.dot(&kuu_inv);
        let mut precision = Array1::zeros(n);
        // sqrt(eps) relative floor: lambda_i vanishes when z contains x_i,
        // and with zero noise the precision is undefined
        let floor = F::epsilon().sqrt();
        for (i, xi) in x.rows().into_iter().enumerate() {
            let kii = kernel.value(&xi, &xi);
            let lambda = kii - b.row(i).dot(&kmu.row(i));
            let le = lambda + noise;
            if le <= floor * kii || !le.is_finite() {
                return Err(GpError::SingularMatrix(format!(
                    "Lambda + noise_variance * I: diagonal entry {le} below tolerance at row {i}"
                )));
            }
            precision[i] = F::one() / le;
        }

        // P K_mu, scaling each row of K_mu by the matching precision entry
        let pkmu = &kmu * &precision.to_owned().insert_axis(Axis(1));
        let delta_uu = &kuu + &kmu.t().dot(&pkmu);
        let delta_inv = spd_inverse(&delta_uu, "Delta_uu")?;

        let kuu_delta_inv = kuu.dot(&delta_inv);
        let sigma_uu = kuu_delta_inv.dot(&kuu);
        let sigma_mu = pkmu.dot(&delta_inv).dot(&kuu).mapv(|v| v * noise);
        let wr = (&y.to_owned() - &mean_t) * &precision;
        let mu_u = &mean_u + &kuu_delta_inv.dot(&kmu.t().dot(&wr));

        debug!(
            "SGP trained on {} points of dim {} with {} inducing points in {:?}",
            x.nrows(),
            x.ncols(),
            z.nrows(),
            now.elapsed()
        );
        self.state = Some(SgpState {
            xt: x.to_owned(),
            yt: y.to_owned(),
            z: z.to_owned(),
            mean_u,
            kuu,
            kuu_inv,
            mu_u,
            sigma_uu,
            sigma_mu,
        });
        Ok(())
    }

    /// Predict posterior mean values at n given `x` points of d components
    /// specified as a (n, d) matrix. Returns n scalar values as a (n,) vector.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let state = self.state()?;
        self.check_query(x, state)?;
        let ksu = self.params.kernel().cross(x, &state.z);
        let a = ksu.dot(&state.kuu_inv);
        let shift = &state.mu_u - &state.mean_u;
        Ok(self.params.mean().value(x) + a.dot(&shift))
    }

    /// Predict posterior variance values at n given `x` points specified as
    /// a (n, d) matrix. Returns n variance values as a (n,) vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let state = self.state()?;
        self.check_query(x, state)?;
        let kernel = self.params.kernel();
        let ksu = kernel.cross(x, &state.z);
        let a = ksu.dot(&state.kuu_inv);
        let mid = &state.kuu - &state.sigma_uu;
        let mut kxx = Array1::zeros(x.nrows());
        for (i, xi) in x.rows().into_iter().enumerate() {
            kxx[i] = kernel.value(&xi, &xi);
        }
        let var = kxx - (a.dot(&mid) * a).sum_axis(Axis(1));
        // Posterior variance might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(var.mapv(|v| if v < F::zero() { F::zero() } else { v }))
    }

    /// Predict both the posterior mean vector (n,) and the full posterior
    /// covariance matrix (n, n) at n given `x` points specified as a (n, d)
    /// matrix.
    pub fn predict_valcov(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array2<F>)> {
        let state = self.state()?;
        self.check_query(x, state)?;
        let kernel = self.params.kernel();
        let ksu = kernel.cross(x, &state.z);
        let a = ksu.dot(&state.kuu_inv);
        let shift = &state.mu_u - &state.mean_u;
        let mean = self.params.mean().value(x) + a.dot(&shift);
        let mid = &state.kuu - &state.sigma_uu;
        let cov = kernel.symmetric(x) - a.dot(&mid).dot(&a.t());
        Ok((mean, cov))
    }

    /// Retrieve the inducing points of a trained engine
    pub fn inducings(&self) -> Result<&Array2<F>> {
        Ok(&self.state()?.z)
    }

    /// Retrieve the inducing posterior of a trained engine: posterior mean
    /// (nz,) and covariance (nz, nz) at the inducing points, and the
    /// posterior cross-covariance (n, nz) between training and inducing
    /// points.
    pub fn inducing_posterior(&self) -> Result<(&Array1<F>, &Array2<F>, &Array2<F>)> {
        let state = self.state()?;
        Ok((&state.mu_u, &state.sigma_uu, &state.sigma_mu))
    }

    /// Retrieve the training dataset of a trained engine
    pub fn training_data(&self) -> Result<(&Array2<F>, &Array1<F>)> {
        let state = self.state()?;
        Ok((&state.xt, &state.yt))
    }

    /// Retrieve input and output dimensions of a trained engine
    pub fn dims(&self) -> Result<(usize, usize)> {
        Ok((self.state()?.xt.ncols(), 1))
    }

    fn state(&self) -> Result<&SgpState<F>> {
        self.state.as_ref().ok_or(GpError::NotTrained)
    }

    fn check_query(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        state: &SgpState<F>,
    ) -> Result<()> {
        if x.ncols() != state.z.ncols() {
            return Err(GpError::ShapeMismatch(format!(
                "query inputs of dim {} for training inputs of dim {}",
                x.ncols(),
                state.z.ncols()
            )));
        }
        Ok(())
    }
}

/// Pick nz inducing points randomly (without replacement) among the
/// training inputs
fn make_inducings<F: Float>(
    nz: usize,
    xt: &ArrayView2<F>,
    rng: &mut Xoshiro256Plus,
) -> Array2<F> {
    let mut indices = (0..xt.nrows()).collect::<Vec<_>>();
    indices.shuffle(rng);
    let n = nz.min(xt.nrows());
    let mut z = Array2::zeros((n, xt.ncols()));
    for (i, &idx) in indices.iter().take(n).enumerate() {
        z.row_mut(i).assign(&xt.row(idx));
    }
    z
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for SgpValidParams<F, Mean, Kern>
{
    type Object = SparseGaussianProcess<F, Mean, Kern>;

    /// Fit a sparse GP on the given dataset, resolving the inducing points
    /// specification first, and return a trained engine
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let z = match &self.z {
            Inducings::Randomized(nz) => {
                let mut rng = match self.seed {
                    Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
                    None => Xoshiro256Plus::from_entropy(),
                };
                make_inducings(*nz, &dataset.records().view(), &mut rng)
            }
            Inducings::Located(z) => z.to_owned(),
        };
        let mut sgp = SparseGaussianProcess::new(self.clone());
        sgp.train(dataset.records(), dataset.targets(), &z)?;
        Ok(sgp)
    }
}

impl<F, D, Mean, Kern> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for SparseGaussianProcess<F, Mean, Kern>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    Kern: CovarianceModel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("SGP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{GaussianProcess, Kriging};
    use crate::kernels::SquaredExponential;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Dataset;
    use linfa::ParamGuard;
    use ndarray::{array, Array};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    fn sparse_engine(
        noise: f64,
    ) -> SparseGaussianProcess<
        f64,
        crate::mean_models::ZeroMean,
        SquaredExponential<f64>,
    > {
        let params = SparseKriging::params(Inducings::Randomized(10))
            .noise_variance(noise)
            .check()
            .unwrap();
        SparseGaussianProcess::new(params)
    }

    #[test]
    fn test_untrained_predict_fails() {
        let sgp = sparse_engine(0.01);
        assert!(matches!(
            sgp.predict(&array![[0.5]]),
            Err(GpError::NotTrained)
        ));
        assert!(matches!(sgp.inducings(), Err(GpError::NotTrained)));
    }

    #[test]
    fn test_exact_recovery_with_training_inducings() {
        // with z == x the FITC approximation is exact
        let xt = array![[0.], [0.5], [1.], [1.5], [2.]];
        let yt = array![0., 0.8, 1., 0.3, -0.4];

        let mut gp = GaussianProcess::new(
            Kriging::<f64>::params().noise_variance(0.01).check().unwrap(),
        );
        gp.train(&xt, &yt).unwrap();

        let mut sgp = sparse_engine(0.01);
        sgp.train(&xt, &yt, &xt).unwrap();

        let xq = array![[0.25], [0.75], [1.8]];
        assert_abs_diff_eq!(
            gp.predict(&xq).unwrap(),
            sgp.predict(&xq).unwrap(),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            gp.predict_var(&xq).unwrap(),
            sgp.predict_var(&xq).unwrap(),
            epsilon = 1e-6
        );

        let (mu_u, sigma_uu, sigma_mu) = sgp.inducing_posterior().unwrap();
        assert_eq!(5, mu_u.len());
        assert_eq!((5, 5), (sigma_uu.nrows(), sigma_uu.ncols()));
        assert_eq!((5, 5), (sigma_mu.nrows(), sigma_mu.ncols()));
    }

    #[test]
    fn test_noisy_sine_fit() {
        let rng = &mut Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::linspace(0., 1., 100).insert_axis(Axis(1));
        let truth = xt
            .column(0)
            .mapv(|x| (2. * std::f64::consts::PI * x).sin());
        let noise: Array1<f64> = Array::random_using(100, Normal::new(0., 0.05).unwrap(), rng);
        let yt = &truth + &noise;

        let sgp = SgpParams::<f64, crate::mean_models::ZeroMean, _>::new(
            SquaredExponential::new(1., 0.2),
            Inducings::Randomized(30),
        )
        .noise_variance(0.05 * 0.05)
        .seed(Some(42))
        .check()
        .unwrap()
        .fit(&Dataset::new(xt.to_owned(), yt))
        .unwrap();

        assert_eq!(30, sgp.inducings().unwrap().nrows());
        let preds = sgp.predict(&xt).unwrap();
        assert_abs_diff_eq!(truth, preds, epsilon = 0.3);
        // variance stays below the prior variance everywhere
        let vars = sgp.predict_var(&xt).unwrap();
        for v in vars.iter() {
            assert!(*v <= 1. + 1e-10);
        }
    }

    #[test]
    fn test_duplicate_inducings_tolerated() {
        // a duplicated inducing point spans no new subspace: with the
        // nugget in place training succeeds and predictions match the
        // deduplicated inducing set
        let xt = array![[0.], [1.], [2.]];
        let yt = array![0., 1., 0.];
        let mut dup = sparse_engine(0.01);
        dup.train(&xt, &yt, &array![[1.], [1.]]).unwrap();
        let mut single = sparse_engine(0.01);
        single.train(&xt, &yt, &array![[1.]]).unwrap();

        let xq = array![[0.5], [1.5]];
        assert_abs_diff_eq!(
            single.predict(&xq).unwrap(),
            dup.predict(&xq).unwrap(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_zero_noise_with_training_inducings_singular() {
        // Lambda vanishes and there is no noise to regularize it
        let xt = array![[0.], [1.], [2.]];
        let yt = array![0., 1., 0.];
        let mut sgp = sparse_engine(0.);
        let res = sgp.train(&xt, &yt, &xt);
        assert!(matches!(res, Err(GpError::SingularMatrix(_))));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut sgp = sparse_engine(0.01);
        let res = sgp.train(&array![[0.], [1.]], &array![0.], &array![[0.5]]);
        assert!(matches!(res, Err(GpError::ShapeMismatch(_))));
        let res = sgp.train(&array![[0.], [1.]], &array![0., 1.], &array![[0.5, 0.5]]);
        assert!(matches!(res, Err(GpError::ShapeMismatch(_))));

        sgp.train(&array![[0.], [1.]], &array![0., 1.], &array![[0.5]])
            .unwrap();
        let res = sgp.predict(&array![[0., 1.]]);
        assert!(matches!(res, Err(GpError::ShapeMismatch(_))));
    }

    #[test]
    fn test_shape_contract() {
        let mut sgp = sparse_engine(0.01);
        sgp.train(
            &array![[0.], [1.], [2.], [3.]],
            &array![0., 1., 0., -1.],
            &array![[0.5], [2.5]],
        )
        .unwrap();
        let xq = array![[0.2], [1.4], [2.8]];
        let (mean, cov) = sgp.predict_valcov(&xq).unwrap();
        assert_eq!(3, mean.len());
        assert_eq!((3, 3), (cov.nrows(), cov.ncols()));
    }

    #[test]
    fn test_make_inducings_seeded() {
        let xt = Array::linspace(0., 1., 20).insert_axis(Axis(1));
        let mut rng1 = Xoshiro256Plus::seed_from_u64(7);
        let mut rng2 = Xoshiro256Plus::seed_from_u64(7);
        let z1 = make_inducings(5, &xt.view(), &mut rng1);
        let z2 = make_inducings(5, &xt.view(), &mut rng2);
        assert_eq!(z1, z2);
        assert_eq!((5, 1), (z1.nrows(), z1.ncols()));
        // more inducing points than training points: capped
        let mut rng3 = Xoshiro256Plus::seed_from_u64(7);
        let z3 = make_inducings(50, &xt.view(), &mut rng3);
        assert_eq!(20, z3.nrows());
    }
}
