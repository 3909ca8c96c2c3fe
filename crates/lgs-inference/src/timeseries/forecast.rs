//! Forecasting utilities for linear-Gaussian state space models.
//!
//! Given a model and a filtered state at time T-1, we can forecast:
//! - next latent state distribution x_{T-1+k}
//! - next observation distribution y_{T-1+k}
//!
//! Steps past the horizon reuse the model's final slice
//! `(A[T-1], Q[T-1], C[T-1], R[T-1])`.

use lgs_compute::CpuBackend;
use lgs_core::{DenseLinalg, Error, GaussianBelief, Result, Transpose};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

use super::gaussian::predict;
use super::internal::symmetrize_in_place;
use super::kalman::KalmanFilterResult;
use super::model::StateSpaceModel;
use super::workspace::KalmanWorkspace;

/// Forecast output.
#[derive(Debug, Clone)]
pub struct KalmanForecastResult {
    /// Predicted state means for steps 1..=K (each is n_state).
    pub state_means: Vec<DVector<f64>>,
    /// Predicted state covariances for steps 1..=K (each is n_state x n_state).
    pub state_covs: Vec<DMatrix<f64>>,
    /// Predicted observation means for steps 1..=K (each is n_obs).
    pub obs_means: Vec<DVector<f64>>,
    /// Predicted observation covariances for steps 1..=K (each is n_obs x n_obs).
    pub obs_covs: Vec<DMatrix<f64>>,
}

/// Observation prediction intervals (marginal, per observed dimension).
#[derive(Debug, Clone)]
pub struct KalmanForecastIntervals {
    /// Alpha for the two-sided interval (e.g. 0.05 means 95% interval).
    pub alpha: f64,
    /// Standard normal z-value for `1 - alpha/2`.
    pub z: f64,
    /// Lower bounds for steps 1..=K (each is n_obs).
    pub obs_lower: Vec<DVector<f64>>,
    /// Upper bounds for steps 1..=K (each is n_obs).
    pub obs_upper: Vec<DVector<f64>>,
}

/// Compute marginal normal prediction intervals for the observation forecasts in `fc`.
pub fn kalman_forecast_intervals(
    fc: &KalmanForecastResult,
    alpha: f64,
) -> Result<KalmanForecastIntervals> {
    if !(alpha.is_finite() && alpha > 0.0 && alpha < 1.0) {
        return Err(Error::Validation("alpha must be in (0, 1)".to_string()));
    }
    if fc.obs_means.len() != fc.obs_covs.len() {
        return Err(Error::DimensionMismatch("forecast result has inconsistent lengths".to_string()));
    }
    let Some(first) = fc.obs_means.first() else {
        return Err(Error::Validation("forecast result must be non-empty".to_string()));
    };

    let n_obs = first.len();
    for (k, (m, s)) in fc.obs_means.iter().zip(fc.obs_covs.iter()).enumerate() {
        if m.len() != n_obs || s.shape() != (n_obs, n_obs) {
            return Err(Error::DimensionMismatch(format!(
                "forecast step {k} does not have n_obs={n_obs}"
            )));
        }
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| Error::Validation(format!("failed to construct normal distribution: {e}")))?;
    let z = normal.inverse_cdf(1.0 - 0.5 * alpha);

    let mut obs_lower = Vec::with_capacity(fc.obs_means.len());
    let mut obs_upper = Vec::with_capacity(fc.obs_means.len());

    for (m, s) in fc.obs_means.iter().zip(fc.obs_covs.iter()) {
        let mut lo = DVector::<f64>::zeros(n_obs);
        let mut hi = DVector::<f64>::zeros(n_obs);
        for i in 0..n_obs {
            let mu = m[i];
            let var = s[(i, i)];
            if !mu.is_finite() || !var.is_finite() || var < 0.0 {
                return Err(Error::Validation(format!(
                    "forecast intervals need a finite mean and non-negative variance (got {mu}, {var})"
                )));
            }
            let sd = var.sqrt();
            lo[i] = mu - z * sd;
            hi[i] = mu + z * sd;
        }
        obs_lower.push(lo);
        obs_upper.push(hi);
    }

    Ok(KalmanForecastIntervals { alpha, z, obs_lower, obs_upper })
}

/// Forecast K steps ahead starting from a filtered state `(m_last, p_last)` at time T-1.
pub fn kalman_forecast_from_last(
    model: &StateSpaceModel,
    m_last: &DVector<f64>,
    p_last: &DMatrix<f64>,
    steps: usize,
) -> Result<KalmanForecastResult> {
    forecast_with(&CpuBackend::new(), model, m_last, p_last, steps)
}

/// Forecast K steps ahead starting from the last filtered state in `fr`.
pub fn kalman_forecast(
    model: &StateSpaceModel,
    fr: &KalmanFilterResult,
    steps: usize,
) -> Result<KalmanForecastResult> {
    let (Some(m_last), Some(p_last)) = (fr.filtered_means.last(), fr.filtered_covs.last()) else {
        return Err(Error::Validation("filter result must be non-empty".to_string()));
    };
    if fr.filtered_covs.len() != fr.filtered_means.len() {
        return Err(Error::DimensionMismatch("filter result has inconsistent lengths".to_string()));
    }
    kalman_forecast_from_last(model, m_last, p_last, steps)
}

fn forecast_with<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    m_last: &DVector<f64>,
    p_last: &DMatrix<f64>,
    steps: usize,
) -> Result<KalmanForecastResult> {
    if steps == 0 {
        return Err(Error::Validation("steps must be > 0".to_string()));
    }
    model.validate()?;
    let n = model.n_state();
    let p = model.n_obs();
    if m_last.len() != n {
        return Err(Error::DimensionMismatch(format!("m_last must have length {n}")));
    }
    if p_last.shape() != (n, n) {
        return Err(Error::DimensionMismatch(format!("p_last must be {n}x{n}")));
    }

    let last = model.len() - 1;
    let (a, q, c, r) = (&model.a[last], &model.q[last], &model.c[last], &model.r[last]);

    let mut ws = KalmanWorkspace::new(n, p);
    let mut current = GaussianBelief::new(m_last.clone(), p_last.clone());
    let mut next = GaussianBelief::zeros(n);

    let mut state_means = Vec::with_capacity(steps);
    let mut state_covs = Vec::with_capacity(steps);
    let mut obs_means = Vec::with_capacity(steps);
    let mut obs_covs = Vec::with_capacity(steps);

    for _k in 0..steps {
        predict(backend, &current, a, q, &mut next, &mut ws)?;
        std::mem::swap(&mut current, &mut next);

        // Observation forecast: (C m, C P C^T + R)
        let mut y_mean = DVector::zeros(p);
        backend.gemv(Transpose::No, 1.0, c, &current.mean, 0.0, &mut y_mean);
        backend.gemm(Transpose::No, Transpose::No, 1.0, c, &current.cov, 0.0, &mut ws.cs);
        let mut y_cov = r.clone();
        backend.gemm(Transpose::No, Transpose::Yes, 1.0, &ws.cs, c, 1.0, &mut y_cov);
        symmetrize_in_place(&mut y_cov);

        state_means.push(current.mean.clone());
        state_covs.push(current.cov.clone());
        obs_means.push(y_mean);
        obs_covs.push(y_cov);
    }

    Ok(KalmanForecastResult { state_means, state_covs, obs_means, obs_covs })
}
