use crate::errors::{GpError, Result};
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::Array2;

/// Invert a symmetric positive-definite matrix through its Cholesky factor.
///
/// Given `A = L L^T`, computes `A^-1 = L^-T L^-1` where `L^-1` is obtained
/// by a triangular solve against the identity. `what` names the matrix in
/// the error raised when `A` is not positive definite.
pub(crate) fn spd_inverse<F: Float>(m: &Array2<F>, what: &str) -> Result<Array2<F>> {
    let l = m
        .cholesky()
        .map_err(|e| GpError::SingularMatrix(format!("{what}: {e}")))?;
    // A zero pivot passes through some Cholesky implementations silently
    // for positive semi-definite inputs, then poisons the triangular solve.
    if l.diag().iter().any(|v| *v <= F::zero() || !v.is_finite()) {
        return Err(GpError::SingularMatrix(format!(
            "{what}: matrix is not positive definite"
        )));
    }
    let li = l.solve_triangular(&Array2::eye(l.nrows()), UPLO::Lower)?;
    Ok(li.t().dot(&li))
}
