use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

pub fn check_params(params: Option<&PyDict>, possible_keys: &[&str]) -> PyResult<()> {
    if let Some(p) = params {
        for key in p.keys() {
            let key_str = key.str()?.to_str()?;
            if !possible_keys.contains(&key_str) {
                return Err(PyValueError::new_err(format!(
                    "unknown key '{key_str}' in params"
                )));
            }
        }
    }
    Ok(())
}

pub fn extract<'a, T: pyo3::FromPyObject<'a>>(
    params: Option<&'a PyDict>,
    key: &str,
) -> PyResult<Option<T>> {
    match params {
        Some(p) => match p.get_item(key)? {
            Some(value) => Ok(Some(value.extract::<T>()?)),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

/// Regularization and solver settings shared by all estimators.
pub struct Params {
    pub lambda_l2: f64,
    pub rcond: Option<f64>,
}

pub fn extract_params(params_dict: Option<&PyDict>) -> PyResult<Params> {
    check_params(params_dict, vec!["lmbda_l2", "rcond"].as_slice())?;
    Ok(Params {
        lambda_l2: extract::<f64>(params_dict, "lmbda_l2")?.unwrap_or(0.0),
        rcond: extract::<f64>(params_dict, "rcond")?,
    })
}
