//! Error types for lgs

use thiserror::Error;

/// lgs error type
///
/// Routines fail in one of three ways:
/// - [`Error::DimensionMismatch`]: inconsistent shapes, reported before any arithmetic
/// - [`Error::Validation`]: well-shaped but unusable input. This covers non-finite
///   model entries or observations, `Q`/`R`/`Sigma0` asymmetric beyond a `1e-9`
///   relative tolerance, NaN in a partially observed vector under the whole-vector
///   missing policy, and out-of-range options such as a forecast `alpha`
/// - [`Error::NumericalDegeneracy`]: a covariance that should be positive definite
///   failed its Cholesky factorization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Inconsistent n / p / T across inputs. Raised before any arithmetic.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Input or configuration rejected (non-finite values, asymmetric covariance, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A matrix handed to a Cholesky factorization is not positive definite.
    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
}

impl Error {
    /// Tag a primitive-level error with the timestep it was raised at.
    pub fn at_step(self, t: usize) -> Self {
        match self {
            Error::DimensionMismatch(msg) => Error::DimensionMismatch(format!("t={t}: {msg}")),
            Error::Validation(msg) => Error::Validation(format!("t={t}: {msg}")),
            Error::NumericalDegeneracy(msg) => Error::NumericalDegeneracy(format!("t={t}: {msg}")),
        }
    }

    /// Whether this error reports a failed factorization.
    pub fn is_numerical_degeneracy(&self) -> bool {
        matches!(self, Error::NumericalDegeneracy(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
