use thiserror::Error;

use crate::linalg::LinalgError;

#[derive(Debug, Error)]
pub enum KefError {
    #[error("{what} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("data must have at least one point and one dimension, got {0}x{1}")]
    EmptyData(usize, usize),

    #[error("basis mask selects no components")]
    EmptyBasis,

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("basis point index {index} out of range for {num_points} data points")]
    BasisIndexOutOfRange { index: usize, num_points: usize },

    #[error("estimator has not been fitted")]
    NotFitted,

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

pub type Result<T> = std::result::Result<T, KefError>;

pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KefError::InvalidParameter {
            name,
            value,
            reason: "must be finite and non-negative",
        })
    }
}
