//! Common data types for lgs

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Gaussian belief `N(mean, cov)` over a latent state.
///
/// Depending on where it comes from this is a filtered (`x_t | y_0..y_t`),
/// predicted (`x_t | y_0..y_{t-1}`) or smoothed (`x_t | y_0..y_{T-1}`) belief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianBelief {
    /// Mean vector (length n).
    pub mean: DVector<f64>,
    /// Covariance matrix (n x n, symmetric PSD).
    pub cov: DMatrix<f64>,
}

impl GaussianBelief {
    /// Create a belief from a mean and covariance.
    pub fn new(mean: DVector<f64>, cov: DMatrix<f64>) -> Self {
        Self { mean, cov }
    }

    /// Zero mean / zero covariance belief of dimension `n`, used as a preallocated buffer.
    pub fn zeros(n: usize) -> Self {
        Self { mean: DVector::zeros(n), cov: DMatrix::zeros(n, n) }
    }

    /// State dimension.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Overwrite `self` with the contents of `other` without reallocating.
    pub fn copy_from(&mut self, other: &GaussianBelief) {
        self.mean.copy_from(&other.mean);
        self.cov.copy_from(&other.cov);
    }
}
