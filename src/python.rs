use ndarray::Array2;
use numpy::{PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::conversion::IntoPy;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::estimator::{Estimator, Nystrom, NystromD};
use crate::index::ai_to_idx;
use crate::kernel::GaussianKernel;
use crate::prepare::extract_params;
use crate::KefError;

impl From<KefError> for PyErr {
    fn from(err: KefError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

pub struct Evaluation {
    pub log_pdf: Vec<f64>,
    pub grad: Vec<Vec<f64>>,
    pub hessian_diag: Vec<Vec<f64>>,
    pub score: f64,
}

pub struct FitResult {
    pub beta: Vec<f64>,
    pub basis_inds: Vec<usize>,
    pub system_size: usize,
    pub evaluation: Option<Evaluation>,
}

impl IntoPy<PyObject> for FitResult {
    fn into_py(self, py: Python<'_>) -> PyObject {
        let res = PyDict::new(py);
        let _ = res.set_item("beta", self.beta);
        let _ = res.set_item("basis_inds", self.basis_inds);
        let _ = res.set_item("system_size", self.system_size);
        if let Some(evaluation) = self.evaluation {
            let _ = res.set_item("log_pdf", evaluation.log_pdf);
            let _ = res.set_item("grad", evaluation.grad);
            let _ = res.set_item("hessian_diag", evaluation.hessian_diag);
            let _ = res.set_item("score", evaluation.score);
        }
        res.into_py(py)
    }
}

fn fit_and_evaluate<E: Estimator + Sync>(
    estimator: &mut E,
    basis_inds: Vec<usize>,
    x_test: Option<Array2<f64>>,
) -> Result<FitResult, KefError> {
    estimator.fit()?;
    let beta = estimator.get_beta().ok_or(KefError::NotFitted)?.to_vec();

    let evaluation = match x_test {
        Some(x_test) => {
            estimator.set_data(x_test)?;
            let n = estimator.get_num_data();
            let mut grad = Vec::with_capacity(n);
            let mut hessian_diag = Vec::with_capacity(n);
            for idx in 0..n {
                grad.push(estimator.grad(idx)?.to_vec());
                hessian_diag.push(estimator.hessian_diag(idx)?.to_vec());
            }
            Some(Evaluation {
                log_pdf: estimator.log_pdf_multiple()?.to_vec(),
                grad,
                hessian_diag,
                score: estimator.score()?,
            })
        }
        None => None,
    };

    Ok(FitResult {
        system_size: beta.len(),
        beta,
        basis_inds,
        evaluation,
    })
}

#[pymodule]
fn kexpfam<'py>(_py: Python<'py>, m: &'py PyModule) -> PyResult<()> {
    let _ = env_logger::try_init();

    #[pyfn(m)]
    #[pyo3(signature = (x, basis_mask, sigma = 1.0, lmbda = 1.0, params = None, x_test = None))]
    fn fit_nystrom_d<'py>(
        _py: Python<'py>,
        x: PyReadonlyArray2<'py, f64>,
        basis_mask: PyReadonlyArray2<'py, bool>,
        sigma: f64,
        lmbda: f64,
        params: Option<&'py PyDict>,
        x_test: Option<PyReadonlyArray2<'py, f64>>,
    ) -> PyResult<FitResult> {
        let params = extract_params(params)?;
        let kernel = GaussianKernel::new(sigma)?;
        let mut estimator = NystromD::new(
            x.as_array().to_owned(),
            basis_mask.as_array().to_owned(),
            &kernel,
            lmbda,
        )?
        .set_lambda_l2(params.lambda_l2)?;
        if let Some(rcond) = params.rcond {
            estimator = estimator.set_pinv_rcond(rcond)?;
        }
        let basis_inds = estimator.basis_inds().to_vec();
        let x_test = x_test.map(|x_test| x_test.as_array().to_owned());
        Ok(fit_and_evaluate(&mut estimator, basis_inds, x_test)?)
    }

    #[pyfn(m)]
    #[pyo3(signature = (x, basis_inds, sigma = 1.0, lmbda = 1.0, params = None, x_test = None))]
    fn fit_nystrom<'py>(
        _py: Python<'py>,
        x: PyReadonlyArray2<'py, f64>,
        basis_inds: Vec<usize>,
        sigma: f64,
        lmbda: f64,
        params: Option<&'py PyDict>,
        x_test: Option<PyReadonlyArray2<'py, f64>>,
    ) -> PyResult<FitResult> {
        let params = extract_params(params)?;
        let kernel = GaussianKernel::new(sigma)?;
        let mut points = basis_inds.clone();
        points.sort_unstable();
        points.dedup();
        let d = x.shape()[1];
        let components = points
            .iter()
            .flat_map(|&a| (0..d).map(move |i| ai_to_idx(a, i, d)))
            .collect();

        let mut estimator =
            Nystrom::subsampled(x.as_array().to_owned(), basis_inds, &kernel, lmbda)?
                .set_lambda_l2(params.lambda_l2)?;
        if let Some(rcond) = params.rcond {
            estimator = estimator.set_pinv_rcond(rcond)?;
        }
        let x_test = x_test.map(|x_test| x_test.as_array().to_owned());
        Ok(fit_and_evaluate(&mut estimator, components, x_test)?)
    }

    Ok(())
}
