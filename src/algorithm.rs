use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use crate::parameters::{GpParams, GpValidParams};
use crate::utils::spd_inverse;

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use log::debug;
use ndarray::{concatenate, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Prior structures computed during training and reused by every prediction
#[derive(Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(serialize = "F: Serialize", deserialize = "F: Deserialize<'de>"))
)]
pub(crate) struct GpPrior<F: Float> {
    /// Training inputs (n, d)
    xt: Array2<F>,
    /// Training outputs (n,)
    yt: Array1<F>,
    /// Prior mean evaluated at the training inputs
    mean_t: Array1<F>,
    /// Cached inverse of `K_mm + noise_variance * I`
    kmm_inv: Array2<F>,
}

impl<F: Float> Clone for GpPrior<F> {
    fn clone(&self) -> Self {
        Self {
            xt: self.xt.to_owned(),
            yt: self.yt.to_owned(),
            mean_t: self.mean_t.to_owned(),
            kmm_inv: self.kmm_inv.to_owned(),
        }
    }
}

/// Standard (exact) GP regression engine.
///
/// The unknown scalar field is modeled as a gaussian process
///
/// `Y(x) = mean(x) + Z(x)`
///
/// where `mean(x)` is a pluggable prior mean function (zero by default) and
/// `Z(x)` a zero-mean process with covariance given by a pluggable kernel
/// `k(x, x')`. Training stores the dataset, builds the training covariance
/// block and caches its inverse (with measurement noise variance added to
/// the diagonal); predictions then apply the standard GP conditioning
/// formulas and are read-only against the trained state.
///
/// The full training covariance inversion is `O(n^3)`: for large training
/// sets see [`SparseGaussianProcess`](crate::SparseGaussianProcess).
///
/// # Implementation
///
/// * Based on [ndarray](https://github.com/rust-ndarray/ndarray)
///   and [linfa](https://github.com/rust-ml/linfa): trained models are also
///   obtainable through the `linfa` `Fit` trait and usable through
///   `PredictInplace`.
/// * All required inversions operate on symmetric positive-definite blocks
///   and go through a Cholesky factorization
///   ([linfa-linalg](https://github.com/rust-ml/linfa-linalg)); a
///   factorization failure surfaces as [`GpError::SingularMatrix`].
/// * Models can be serialized using [serde](https://serde.rs/) when the
///   `serializable` feature is enabled.
///
/// # Example
///
/// ```no_run
/// use fieldgp::{GaussianProcess, kernels::SquaredExponential, mean_models::ZeroMean};
/// use linfa::ParamGuard;
/// use ndarray::array;
///
/// let params = GaussianProcess::<f64, ZeroMean, SquaredExponential<f64>>::params(
///     ZeroMean(),
///     SquaredExponential::default(),
/// )
/// .noise_variance(0.01)
/// .check()
/// .unwrap();
///
/// let mut gp = GaussianProcess::new(params);
/// gp.train(&array![[0.], [1.], [2.]], &array![0., 1., 0.]).unwrap();
///
/// let (mean, cov) = gp.predict_valcov(&array![[0.5], [1.5]]).unwrap();
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
pub struct GaussianProcess<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> {
    /// Parameters used to configure this engine
    pub(crate) params: GpValidParams<F, Mean, Kern>,
    /// Trained state, `None` until `train` succeeds
    prior: Option<GpPrior<F>>,
}

/// Kriging as GP special case when using zero mean and squared exponential kernel
pub type Kriging<F> = GpParams<F, crate::mean_models::ZeroMean, crate::kernels::SquaredExponential<F>>;

impl<F: Float> Kriging<F> {
    /// Kriging parameters constructor
    pub fn params() -> Kriging<F> {
        GpParams::new(
            crate::mean_models::ZeroMean(),
            crate::kernels::SquaredExponential::default(),
        )
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> Clone
    for GaussianProcess<F, Mean, Kern>
{
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            prior: self.prior.clone(),
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> fmt::Display
    for GaussianProcess<F, Mean, Kern>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(mean={}, kernel={}, noise_variance={}, trained={})",
            self.params.mean,
            self.params.kernel,
            self.params.noise_variance,
            self.prior.is_some(),
        )
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>> GaussianProcess<F, Mean, Kern> {
    /// GP parameters constructor
    pub fn params<NewMean: MeanModel<F>, NewKern: CovarianceModel<F>>(
        mean: NewMean,
        kernel: NewKern,
    ) -> GpParams<F, NewMean, NewKern> {
        GpParams::new(mean, kernel)
    }

    /// Create an untrained engine from validated parameters
    pub fn new(params: GpValidParams<F, Mean, Kern>) -> Self {
        GaussianProcess {
            params,
            prior: None,
        }
    }

    /// Whether the engine holds a trained state
    pub fn is_trained(&self) -> bool {
        self.prior.is_some()
    }

    /// Train the engine on inputs `x` given as a (n, d) matrix and outputs
    /// `y` given as a (n,) vector.
    ///
    /// Builds the prior mean vector and the training covariance block,
    /// then caches `(K_mm + noise_variance * I)^-1`. A previously trained
    /// state is replaced wholesale, and only on success.
    pub fn train(
        &mut self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
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
        let now = Instant::now();
        let mean_t = self.params.mean.value(x);
        let mut kmm = self.params.kernel.symmetric(x);
        let noise = self.params.noise_variance;
        kmm.diag_mut().mapv_inplace(|v| v + noise);
        let kmm_inv = spd_inverse(&kmm, "K_mm + noise_variance * I")?;
        debug!(
            "GP trained on {} points of dim {} in {:?}",
            x.nrows(),
            x.ncols(),
            now.elapsed()
        );
        self.prior = Some(GpPrior {
            xt: x.to_owned(),
            yt: y.to_owned(),
            mean_t,
            kmm_inv,
        });
        Ok(())
    }

    /// Append a single training point `(x, y)` to a trained engine.
    ///
    /// The cached inverse is extended by one row/column through the block
    /// matrix inversion lemma instead of being recomputed from scratch.
    /// The resulting state matches a full retrain on the extended dataset
    /// within floating point tolerance.
    pub fn update(&mut self, x: &ArrayBase<impl Data<Elem = F>, Ix1>, y: F) -> Result<()> {
        let params = &self.params;
        let prior = self.prior.as_mut().ok_or(GpError::NotTrained)?;
        if x.len() != prior.xt.ncols() {
            return Err(GpError::ShapeMismatch(format!(
                "new input of dim {} for training inputs of dim {}",
                x.len(),
                prior.xt.ncols()
            )));
        }
        let n = prior.xt.nrows();
        let mut k = Array1::zeros(n);
        for (i, xi) in prior.xt.rows().into_iter().enumerate() {
            k[i] = params.kernel.value(x, &xi);
        }
        let kappa = params.kernel.value(x, x) + params.noise_variance;

        // Schur complement of the extended covariance block
        let v = prior.kmm_inv.dot(&k);
        let s = kappa - k.dot(&v);
        if s <= F::zero() || !s.is_finite() {
            return Err(GpError::SingularMatrix(
                "extended K_mm + noise_variance * I: non-positive Schur complement".to_string(),
            ));
        }
        let s_inv = F::one() / s;

        let mut inv = Array2::zeros((n + 1, n + 1));
        for i in 0..n {
            for j in 0..n {
                inv[[i, j]] = prior.kmm_inv[[i, j]] + v[i] * v[j] * s_inv;
            }
            inv[[i, n]] = -v[i] * s_inv;
            inv[[n, i]] = -v[i] * s_inv;
        }
        inv[[n, n]] = s_inv;

        let xx = x.to_owned().insert_axis(Axis(0));
        let mean_new = params.mean.value(&xx);
        prior.xt = concatenate![Axis(0), prior.xt.view(), xx.view()];
        prior.yt = concatenate![Axis(0), prior.yt.view(), Array1::from_elem(1, y).view()];
        prior.mean_t = concatenate![Axis(0), prior.mean_t.view(), mean_new.view()];
        prior.kmm_inv = inv;
        Ok(())
    }

    /// Predict posterior mean values at n given `x` points of d components
    /// specified as a (n, d) matrix. Returns n scalar values as a (n,) vector.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let prior = self.prior()?;
        self.check_query(x, prior)?;
        let ksm = self.params.kernel.cross(x, &prior.xt);
        let resid = &prior.yt - &prior.mean_t;
        Ok(self.params.mean.value(x) + ksm.dot(&prior.kmm_inv).dot(&resid))
    }

    /// Predict posterior variance values at n given `x` points specified as
    /// a (n, d) matrix. Returns n variance values as a (n,) vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let prior = self.prior()?;
        self.check_query(x, prior)?;
        let ksm = self.params.kernel.cross(x, &prior.xt);
        let a = ksm.dot(&prior.kmm_inv);
        let mut kxx = Array1::zeros(x.nrows());
        for (i, xi) in x.rows().into_iter().enumerate() {
            kxx[i] = self.params.kernel.value(&xi, &xi);
        }
        let var = kxx - (a * ksm).sum_axis(Axis(1));
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
        let prior = self.prior()?;
        self.check_query(x, prior)?;
        let ksm = self.params.kernel.cross(x, &prior.xt);
        let a = ksm.dot(&prior.kmm_inv);
        let resid = &prior.yt - &prior.mean_t;
        let mean = self.params.mean.value(x) + a.dot(&resid);
        let cov = self.params.kernel.symmetric(x) - a.dot(&ksm.t());
        Ok((mean, cov))
    }

    /// Retrieve the training dataset of a trained engine
    pub fn training_data(&self) -> Result<(&Array2<F>, &Array1<F>)> {
        let prior = self.prior()?;
        Ok((&prior.xt, &prior.yt))
    }

    /// Retrieve input and output dimensions of a trained engine
    pub fn dims(&self) -> Result<(usize, usize)> {
        let prior = self.prior()?;
        Ok((prior.xt.ncols(), 1))
    }

    fn prior(&self) -> Result<&GpPrior<F>> {
        self.prior.as_ref().ok_or(GpError::NotTrained)
    }

    fn check_query(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        prior: &GpPrior<F>,
    ) -> Result<()> {
        if x.ncols() != prior.xt.ncols() {
            return Err(GpError::ShapeMismatch(format!(
                "query inputs of dim {} for training inputs of dim {}",
                x.ncols(),
                prior.xt.ncols()
            )));
        }
        Ok(())
    }
}

impl<F: Float, Mean: MeanModel<F>, Kern: CovarianceModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, Mean, Kern>
{
    type Object = GaussianProcess<F, Mean, Kern>;

    /// Fit a GP on the given dataset, returning a trained engine
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let mut gp = GaussianProcess::new(self.clone());
        gp.train(dataset.records(), dataset.targets())?;
        Ok(gp)
    }
}

impl<F, D, Mean, Kern> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for GaussianProcess<F, Mean, Kern>
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

        let values = self.predict(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}
