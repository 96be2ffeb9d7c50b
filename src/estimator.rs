pub mod nystrom;
pub mod nystrom_d;
pub use nystrom::Nystrom;
pub use nystrom_d::NystromD;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::error::{check_non_negative, KefError, Result};
use crate::kernel::Kernel;
use crate::linalg::pinv_self_adjoint;

/// Score-matching fit and evaluation of a kernel exponential family model
/// `log p(y) = sum_k beta_k * dk(x_{a_k}, y) / dx_{i_k}` over basis components
/// `(a_k, i_k)`.
///
/// Implementors build the linear system for their basis; fitting and the
/// data-wide evaluations are shared.
#[allow(non_snake_case)]
pub trait Estimator {
    fn get_num_dimensions(&self) -> usize;
    fn get_num_data(&self) -> usize;
    fn get_num_basis(&self) -> usize;
    fn get_lambda(&self) -> f64;
    fn get_lambda_l2(&self) -> f64;
    fn pinv_rcond(&self) -> Option<f64>;

    /// Number of basis components, the length of `beta`.
    fn get_system_size(&self) -> usize;

    fn compute_h(&self) -> Array1<f64>;
    fn compute_G_mn(&self) -> Array2<f64>;
    fn compute_G_mm(&self) -> Array2<f64>;
    /// Extracts `G_mm` from the basis columns of `G_mn`. Only meaningful if
    /// [`basis_is_subsampled_data`](Estimator::basis_is_subsampled_data).
    fn subsample_G_mm_from_G_mn(&self, G_mn: &Array2<f64>) -> Array2<f64>;
    fn basis_is_subsampled_data(&self) -> bool;

    /// Replaces the data points used for fitting and as query points.
    /// A fitted `beta` is kept.
    fn set_data(&mut self, data: Array2<f64>) -> Result<()>;
    fn get_beta(&self) -> Option<&Array1<f64>>;
    fn set_beta(&mut self, beta: Array1<f64>) -> Result<()>;

    fn log_pdf(&self, idx: usize) -> Result<f64>;
    /// Gradient of `log_pdf` at data point `idx`. Per basis point only the
    /// dimensions active for that point are contracted, so with inactive
    /// components this differs from the exact derivative of `log_pdf`.
    fn grad(&self, idx: usize) -> Result<Array1<f64>>;
    /// Hessian of `log_pdf`, restricted per basis point like [`grad`](Estimator::grad).
    fn hessian(&self, idx: usize) -> Result<Array2<f64>>;
    fn hessian_diag(&self, idx: usize) -> Result<Array1<f64>>;

    /// `G_mn G_mn^T / N + lambda G_mm`, plus `lambda_l2` on the diagonal.
    fn compute_system_matrix(&self) -> Array2<f64> {
        let n = self.get_num_data() as f64;

        log::debug!("Computing G_mn");
        let G_mn = self.compute_G_mn();
        let G_mm = if self.basis_is_subsampled_data() {
            log::debug!("Subsampling G_mm from G_mn");
            self.subsample_G_mm_from_G_mn(&G_mn)
        } else {
            log::debug!("Computing G_mm");
            self.compute_G_mm()
        };

        let mut system = G_mn.dot(&G_mn.t()) / n + G_mm * self.get_lambda();
        let lambda_l2 = self.get_lambda_l2();
        if lambda_l2 > 0.0 {
            system.diag_mut().map_inplace(|v| *v += lambda_l2);
        }
        system
    }

    fn compute_system_vector(&self) -> Array1<f64> {
        self.compute_h()
    }

    fn fit(&mut self) -> Result<()> {
        log::info!(
            "Fitting {} basis components on {} data points",
            self.get_system_size(),
            self.get_num_data()
        );
        let h = self.compute_system_vector();
        let system = self.compute_system_matrix();

        log::debug!("Solving with self-adjoint pseudo-inverse");
        let system_pinv = pinv_self_adjoint(&system, self.pinv_rcond())?;
        self.set_beta(-system_pinv.dot(&h))
    }

    fn log_pdf_multiple(&self) -> Result<Array1<f64>>
    where
        Self: Sync,
    {
        let values = (0..self.get_num_data())
            .into_par_iter()
            .map(|idx| self.log_pdf(idx))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array1::from(values))
    }

    /// Score-matching objective on the current data,
    /// `1/N sum_n (0.5 ||grad||^2 + trace(hessian))`.
    fn score(&self) -> Result<f64>
    where
        Self: Sync,
    {
        let n = self.get_num_data();
        let terms = (0..n)
            .into_par_iter()
            .map(|idx| {
                let grad = self.grad(idx)?;
                let hessian_diag = self.hessian_diag(idx)?;
                Ok(0.5 * grad.dot(&grad) + hessian_diag.sum())
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(terms.iter().sum::<f64>() / n as f64)
    }
}

pub(crate) enum BasisStorage {
    /// The basis points are the rows of the training data.
    Data,
    Owned(Array2<f64>),
}

/// State shared by the estimator variants.
pub(crate) struct Base<'k, K: Kernel + ?Sized> {
    data: Array2<f64>,
    basis: BasisStorage,
    kernel: &'k K,
    lambda: f64,
    lambda_l2: f64,
    pinv_rcond: Option<f64>,
    beta: Option<Array1<f64>>,
}

pub(crate) fn check_shape(
    what: &'static str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(KefError::ShapeMismatch {
            what,
            expected,
            found,
        })
    }
}

impl<'k, K: Kernel + ?Sized> Base<'k, K> {
    pub(crate) fn new(
        data: Array2<f64>,
        basis: BasisStorage,
        kernel: &'k K,
        lambda: f64,
    ) -> Result<Self> {
        check_non_negative("lambda", lambda)?;
        let (n, d) = data.dim();
        if n == 0 || d == 0 {
            return Err(KefError::EmptyData(n, d));
        }
        if let BasisStorage::Owned(matrix) = &basis {
            if matrix.nrows() == 0 {
                return Err(KefError::EmptyBasis);
            }
            check_shape("basis", (matrix.nrows(), d), matrix.dim())?;
        }
        Ok(Base {
            data,
            basis,
            kernel,
            lambda,
            lambda_l2: 0.0,
            pinv_rcond: None,
            beta: None,
        })
    }

    pub(crate) fn kernel(&self) -> &'k K {
        self.kernel
    }

    pub(crate) fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub(crate) fn basis(&self) -> ArrayView2<'_, f64> {
        match &self.basis {
            BasisStorage::Data => self.data.view(),
            BasisStorage::Owned(matrix) => matrix.view(),
        }
    }

    pub(crate) fn basis_is_data(&self) -> bool {
        matches!(self.basis, BasisStorage::Data)
    }

    pub(crate) fn query_point(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.data.row(idx)
    }

    pub(crate) fn num_dimensions(&self) -> usize {
        self.data.ncols()
    }

    pub(crate) fn num_data(&self) -> usize {
        self.data.nrows()
    }

    pub(crate) fn num_basis(&self) -> usize {
        self.basis().nrows()
    }

    pub(crate) fn lambda(&self) -> f64 {
        self.lambda
    }

    pub(crate) fn lambda_l2(&self) -> f64 {
        self.lambda_l2
    }

    pub(crate) fn set_lambda_l2(&mut self, lambda_l2: f64) -> Result<()> {
        check_non_negative("lambda_l2", lambda_l2)?;
        self.lambda_l2 = lambda_l2;
        Ok(())
    }

    pub(crate) fn pinv_rcond(&self) -> Option<f64> {
        self.pinv_rcond
    }

    pub(crate) fn set_pinv_rcond(&mut self, rcond: f64) -> Result<()> {
        check_non_negative("pinv_rcond", rcond)?;
        self.pinv_rcond = Some(rcond);
        Ok(())
    }

    pub(crate) fn set_data(&mut self, data: Array2<f64>) -> Result<()> {
        let d = self.num_dimensions();
        check_shape("data", (data.nrows(), d), data.dim())?;
        if data.nrows() == 0 {
            return Err(KefError::EmptyData(0, d));
        }
        let old = std::mem::replace(&mut self.data, data);
        if self.basis_is_data() {
            // the basis keeps the points it was built from
            self.basis = BasisStorage::Owned(old);
        }
        Ok(())
    }

    pub(crate) fn beta(&self) -> Result<&Array1<f64>> {
        self.beta.as_ref().ok_or(KefError::NotFitted)
    }

    pub(crate) fn get_beta(&self) -> Option<&Array1<f64>> {
        self.beta.as_ref()
    }

    pub(crate) fn set_beta(&mut self, beta: Array1<f64>, system_size: usize) -> Result<()> {
        check_shape("beta", (system_size, 1), (beta.len(), 1))?;
        self.beta = Some(beta);
        Ok(())
    }

    pub(crate) fn clear_beta(&mut self) {
        self.beta = None;
    }
}
