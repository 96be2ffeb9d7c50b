use faer::diag::DiagRef;
use faer::linalg::solvers;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
    #[error("pseudo-inverse needs a square matrix, got {0}x{1}")]
    NotSquare(usize, usize),
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

pub trait FaerEigh {
    /// Eigenvalues (ascending) and eigenvectors (columns) of a symmetric matrix.
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), LinalgError>;
}

impl<S: Data<Elem = f64>> FaerEigh for ArrayBase<S, Ix2> {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), LinalgError> {
        let (rows, cols) = self.dim();
        let mat = Mat::from_fn(rows, cols, |i, j| self[(i, j)]);
        let eigen = mat
            .as_ref()
            .self_adjoint_eigen(side)
            .map_err(LinalgError::SelfAdjointEigen)?;
        Ok((diag_to_array(eigen.S()), mat_to_array(eigen.U())))
    }
}

/// Default relative eigenvalue cutoff for an `n x n` matrix, as numpy and Octave use.
pub fn default_rcond(n: usize) -> f64 {
    f64::EPSILON * n as f64
}

/// Pseudo-inverse of a symmetric matrix from its eigendecomposition.
///
/// Eigenvalues not above `rcond * max_eigenvalue` are treated as zero, so
/// null-space directions map to zero instead of blowing up. `rcond` defaults
/// to [`default_rcond`].
pub fn pinv_self_adjoint<S: Data<Elem = f64>>(
    a: &ArrayBase<S, Ix2>,
    rcond: Option<f64>,
) -> Result<Array2<f64>, LinalgError> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(LinalgError::NotSquare(rows, cols));
    }
    if rows == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let (s, v) = a.eigh(Side::Lower)?;
    let s_max = s.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let cutoff = rcond.unwrap_or_else(|| default_rcond(rows)) * s_max;

    let inv_s = s.mapv(|val| if val > cutoff { 1.0 / val } else { 0.0 });
    let dropped = inv_s.iter().filter(|&&val| val == 0.0).count();
    if dropped > 0 {
        log::debug!("pseudo-inverse discarded {dropped} of {rows} eigenvalues below {cutoff:.3e}");
    }

    let v_scaled = &v * &inv_s;
    Ok(v_scaled.dot(&v.t()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn pinv_matches_numpy() {
        let x = array![[0.0, 1.0], [2.0, 4.0], [3.0, 1.0]];
        let s = x.t().dot(&x);
        let pinv = pinv_self_adjoint(&s, None).unwrap();

        let reference = array![[0.15929204, -0.09734513], [-0.09734513, 0.11504425]];
        for (got, want) in pinv.iter().zip(reference.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-8);
        }
    }

    #[test]
    fn pinv_zeroes_null_space() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let pinv = pinv_self_adjoint(&a, None).unwrap();
        for val in pinv.iter() {
            assert_abs_diff_eq!(*val, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn pinv_rejects_non_square() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            pinv_self_adjoint(&a, None),
            Err(LinalgError::NotSquare(2, 3))
        ));
    }
}
