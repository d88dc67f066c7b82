//! This library implements gaussian process regression for the estimation
//! of scalar fields over low-dimensional spatial domains, also known as
//! kriging, as in the estimation of a temperature, concentration or depth
//! field sampled at scattered locations.
//!
//! A field sample is a pair `(x, y)` with `x` a d-dimensional location and
//! `y` a scalar measurement. The field is modeled as a gaussian process
//! with a pluggable prior mean function and covariance function (kernel);
//! a trained model predicts the posterior mean and the posterior
//! covariance of the field at any set of query locations.
//!
//! Two engines are provided:
//!
//! * [`GaussianProcess`], the exact engine: `O(n^3)` training on the
//!   full covariance block, exact posterior, optional `O(n^2)` incremental
//!   update to absorb one sample at a time,
//! * [`SparseGaussianProcess`], the FITC sparse engine: the training set
//!   is summarized through a posterior over nz << n inducing points for
//!   `O(n * nz^2)` training, trading exactness for scalability.
//!
//! Both engines share the kernels of [`kernels`], the prior means of
//! [`mean_models`] and the cross validation scores of [`metrics`], and
//! both implement the `linfa` `Fit`/`PredictInplace` traits besides their
//! inherent `train`/`predict` API.
//!
//! # Example
//!
//! ```
//! use fieldgp::Kriging;
//! use linfa::prelude::*;
//! use ndarray::array;
//!
//! let xt = array![[0.], [1.], [2.], [3.], [4.]];
//! let yt = array![0.0, 0.8, 0.9, 0.1, -0.8];
//!
//! let gp = Kriging::<f64>::params()
//!     .noise_variance(1e-6)
//!     .fit(&Dataset::new(xt, yt))
//!     .expect("GP fitted");
//!
//! let mean = gp.predict(&array![[1.5]]).expect("prediction");
//! let var = gp.predict_var(&array![[1.5]]).expect("variance");
//! assert_eq!(1, mean.len());
//! assert_eq!(1, var.len());
//! ```
//!
//! # Features
//!
//! ## serializable
//!
//! The `serializable` feature enables the serialization of trained models
//! using the [serde serialization framework](https://serde.rs/).
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

mod algorithm;
mod errors;
pub mod kernels;
pub mod mean_models;
pub mod metrics;
mod parameters;
mod sparse_algorithm;
mod sparse_parameters;
mod utils;

pub use algorithm::{GaussianProcess, Kriging};
pub use errors::{GpError, Result};
pub use parameters::{GpParams, GpValidParams};
pub use sparse_algorithm::{SparseGaussianProcess, SparseKriging};
pub use sparse_parameters::{Inducings, SgpParams, SgpValidParams};
