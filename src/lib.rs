//! Nystrom approximations of kernel exponential family densities, fitted by
//! score matching.
//!
//! [`Nystrom`] uses every dimension of a set of basis points,
//! [`NystromD`] only the (point, dimension) components selected by a mask.

pub mod basis;
pub mod error;
pub mod estimator;
pub mod index;
pub mod kernel;
pub mod linalg;

#[cfg(feature = "python")]
mod prepare;
#[cfg(feature = "python")]
mod python;

pub use error::{KefError, Result};
pub use estimator::{Estimator, Nystrom, NystromD};
pub use kernel::{GaussianKernel, Kernel};
