//! E-step sufficient statistics for EM on linear-Gaussian state space models.
//!
//! The M-step is left to the caller; this module produces the smoothed
//! first/second moments and the lag-one cross moments it needs.

use lgs_compute::CpuBackend;
use lgs_core::{DenseLinalg, Result};
use nalgebra::{DMatrix, DVector};

use super::kalman::{KalmanConfig, backward_pass, forward_pass};
use super::model::StateSpaceModel;

/// Smoothed moments for one E-step.
#[derive(Debug, Clone)]
pub struct KalmanEStepResult {
    /// Total log-likelihood `log p(y_0..y_{T-1})` under the current parameters.
    pub log_likelihood: f64,
    /// Smoothed means `m_{t|T}`.
    pub smoothed_means: Vec<DVector<f64>>,
    /// Smoothed covariances `P_{t|T}`.
    pub smoothed_covs: Vec<DMatrix<f64>>,
    /// `E[x_t x_{t+1}^T | y]` for `t = 0..T-2` (length `T-1`).
    pub cross_moments: Vec<DMatrix<f64>>,
}

impl KalmanEStepResult {
    /// `E[x_t x_t^T | y] = P_{t|T} + m_{t|T} m_{t|T}^T`.
    pub fn second_moment(&self, t: usize) -> DMatrix<f64> {
        let m = &self.smoothed_means[t];
        &self.smoothed_covs[t] + m * m.transpose()
    }
}

/// Run the E-step with the CPU backend.
pub fn kalman_e_step(model: &StateSpaceModel, ys: &[DVector<f64>]) -> Result<KalmanEStepResult> {
    kalman_e_step_with(&CpuBackend::new(), model, ys, &KalmanConfig::default())
}

/// Run the E-step with an explicit backend and configuration.
pub fn kalman_e_step_with<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    cfg: &KalmanConfig,
) -> Result<KalmanEStepResult> {
    log::debug!(
        "kalman_e_step: n_state={} n_obs={} T={} backend={}",
        model.n_state(),
        model.n_obs(),
        model.len(),
        backend.name()
    );
    let fp = forward_pass(backend, model, ys, cfg, true)?;
    let log_likelihood = fp.log_likelihood;

    let n = model.n_state();
    let mut cross_moments = vec![DMatrix::zeros(n, n); model.len() - 1];
    let smoothed = backward_pass(backend, model, fp, Some(cross_moments.as_mut_slice()))?;
    let (smoothed_means, smoothed_covs) = smoothed.into_iter().map(|b| (b.mean, b.cov)).unzip();

    Ok(KalmanEStepResult { log_likelihood, smoothed_means, smoothed_covs, cross_moments })
}
