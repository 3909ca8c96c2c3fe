//! Preallocated scratch buffers for the Gaussian primitives.
//!
//! A routine sizes one [`KalmanWorkspace`] for its `(n, p)` up front and
//! threads it through every step, so the recursions never allocate per step.

use lgs_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Scratch space for an `n`-dimensional state observed through `p` coordinates.
#[derive(Debug, Clone)]
pub struct KalmanWorkspace {
    n: usize,
    p: usize,
    /// Innovation covariance, overwritten by its Cholesky factor (p x p).
    pub(crate) s: DMatrix<f64>,
    /// `C Sigma`, then the whitened gain `L^{-1} C Sigma` (p x n).
    pub(crate) cs: DMatrix<f64>,
    /// Residual `y - C mu`, then `L^{-1}` applied to it (p).
    pub(crate) resid: DVector<f64>,
    /// n x n scratch (`A Sigma`, Cholesky factors).
    pub(crate) nn: DMatrix<f64>,
    /// Second n x n scratch for the smoother covariance update.
    pub(crate) nn2: DMatrix<f64>,
    /// n-vector scratch for sampling.
    pub(crate) tmp_n: DVector<f64>,
}

impl KalmanWorkspace {
    /// Allocate buffers for state dimension `n` and observation dimension `p`.
    pub fn new(n: usize, p: usize) -> Self {
        Self {
            n,
            p,
            s: DMatrix::zeros(p, p),
            cs: DMatrix::zeros(p, n),
            resid: DVector::zeros(p),
            nn: DMatrix::zeros(n, n),
            nn2: DMatrix::zeros(n, n),
            tmp_n: DVector::zeros(n),
        }
    }

    /// State dimension the buffers were sized for.
    pub fn n_state(&self) -> usize {
        self.n
    }

    /// Observation dimension the buffers were sized for.
    pub fn n_obs(&self) -> usize {
        self.p
    }

    pub(crate) fn ensure_state(&self, n: usize) -> Result<()> {
        if self.n != n {
            return Err(Error::DimensionMismatch(format!(
                "workspace sized for n_state={}, got {n}",
                self.n
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure(&self, n: usize, p: usize) -> Result<()> {
        self.ensure_state(n)?;
        if self.p != p {
            return Err(Error::DimensionMismatch(format!(
                "workspace sized for n_obs={}, got {p}",
                self.p
            )));
        }
        Ok(())
    }
}

/// Observation with its missing coordinates neutralized.
///
/// Missing rows of `C` are zeroed, the matching rows/columns of `R` become
/// identity, and the missing residual entries are zero. Conditioning on the
/// masked triple gives the same posterior as conditioning on the observed
/// sub-vector, and a log-likelihood lower by `(p - p_obs)/2 * ln(2*pi)`.
#[derive(Debug, Clone)]
pub(crate) struct MaskedObservation {
    pub(crate) c: DMatrix<f64>,
    pub(crate) r: DMatrix<f64>,
    pub(crate) y: DVector<f64>,
}

impl MaskedObservation {
    pub(crate) fn new(n: usize, p: usize) -> Self {
        Self { c: DMatrix::zeros(p, n), r: DMatrix::zeros(p, p), y: DVector::zeros(p) }
    }

    pub(crate) fn load(&mut self, c: &DMatrix<f64>, r: &DMatrix<f64>, y: &DVector<f64>) {
        self.c.copy_from(c);
        self.r.copy_from(r);
        self.y.copy_from(y);
        for i in 0..y.len() {
            if y[i].is_nan() {
                self.c.row_mut(i).fill(0.0);
                self.r.row_mut(i).fill(0.0);
                self.r.column_mut(i).fill(0.0);
                self.r[(i, i)] = 1.0;
                self.y[i] = 0.0;
            }
        }
    }
}
