//! Linear-Gaussian Kalman filter and RTS smoother.
//!
//! Both routines share one forward pass built from [`condition_on`] and
//! [`predict`]; the smoother then walks back with [`rts_step`]. Every call
//! sizes a single [`KalmanWorkspace`] and reuses it for all `T` steps.

use lgs_compute::CpuBackend;
use lgs_core::{DenseLinalg, Error, GaussianBelief, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::gaussian::{condition_on, cross_moment, is_missing, predict, rts_step};
use super::internal::LN_2PI;
use super::model::StateSpaceModel;
use super::workspace::{KalmanWorkspace, MaskedObservation};

/// How NaN entries in an observation vector are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingPolicy {
    /// A NaN first coordinate marks the whole vector missing; any other NaN is rejected.
    #[default]
    WholeVector,
    /// Every NaN coordinate is missing on its own; the rest still update the state.
    PerComponent,
}

/// Options shared by the filter, smoother, sampler and E-step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KalmanConfig {
    /// Interpretation of NaN observation entries.
    pub missing: MissingPolicy,
}

/// Kalman filter output (per-time-step filtered states).
#[derive(Debug, Clone)]
pub struct KalmanFilterResult {
    /// Total log-likelihood `log p(y_0..y_{T-1})`.
    pub log_likelihood: f64,
    /// Posterior means `m_{t|t}` for each observation time.
    pub filtered_means: Vec<DVector<f64>>,
    /// Posterior covariances `P_{t|t}` for each observation time.
    pub filtered_covs: Vec<DMatrix<f64>>,
}

/// RTS smoother output (smoothed states).
#[derive(Debug, Clone)]
pub struct KalmanSmootherResult {
    /// Total log-likelihood `log p(y_0..y_{T-1})` from the forward pass.
    pub log_likelihood: f64,
    /// Smoothed means `m_{t|T}`.
    pub smoothed_means: Vec<DVector<f64>>,
    /// Smoothed covariances `P_{t|T}`.
    pub smoothed_covs: Vec<DMatrix<f64>>,
}

pub(super) struct ForwardPass {
    pub(super) log_likelihood: f64,
    pub(super) filtered: Vec<GaussianBelief>,
    /// Prior for each step (`predicted[0]` is the initial prior). Empty unless requested.
    pub(super) predicted: Vec<GaussianBelief>,
    pub(super) ws: KalmanWorkspace,
}

pub(super) fn validate_observations(
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    cfg: &KalmanConfig,
) -> Result<()> {
    if ys.len() != model.len() {
        return Err(Error::DimensionMismatch(format!(
            "ys has {} timesteps, model has {}",
            ys.len(),
            model.len()
        )));
    }
    let p = model.n_obs();
    for (t, y) in ys.iter().enumerate() {
        if y.len() != p {
            return Err(Error::DimensionMismatch(format!(
                "y[{t}] has wrong length: expected {p}, got {}",
                y.len()
            )));
        }
        // A whole-vector-missing observation is never read past its first coordinate.
        if cfg.missing == MissingPolicy::WholeVector && is_missing(y) {
            continue;
        }
        if y.iter().any(|v| v.is_infinite()) {
            return Err(Error::Validation(format!(
                "y[{t}] must be finite or NaN (NaN means missing)"
            )));
        }
        if cfg.missing == MissingPolicy::WholeVector && y.iter().any(|v| v.is_nan()) {
            return Err(Error::Validation(format!(
                "y[{t}] has NaN entries but an observed first coordinate; \
                 use MissingPolicy::PerComponent for partially observed vectors"
            )));
        }
    }
    Ok(())
}

fn condition_on_masked<B: DenseLinalg + ?Sized>(
    backend: &B,
    belief: &mut GaussianBelief,
    c: &DMatrix<f64>,
    r: &DMatrix<f64>,
    y: &DVector<f64>,
    masked: &mut MaskedObservation,
    ws: &mut KalmanWorkspace,
) -> Result<f64> {
    let p = y.len();
    let n_observed = y.iter().filter(|v| !v.is_nan()).count();
    if n_observed == 0 {
        return Ok(0.0);
    }
    if n_observed == p {
        return condition_on(backend, belief, c, r, y, ws);
    }
    masked.load(c, r, y);
    let ll = condition_on(backend, belief, &masked.c, &masked.r, &masked.y, ws)?;
    Ok(ll + 0.5 * ((p - n_observed) as f64) * LN_2PI)
}

/// Filter forward through all `T` steps, optionally retaining the per-step priors.
pub(super) fn forward_pass<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    cfg: &KalmanConfig,
    retain_predicted: bool,
) -> Result<ForwardPass> {
    model.validate()?;
    validate_observations(model, ys, cfg)?;

    let n = model.n_state();
    let p = model.n_obs();
    let t_max = model.len();

    let mut ws = KalmanWorkspace::new(n, p);
    let mut masked = match cfg.missing {
        MissingPolicy::WholeVector => None,
        MissingPolicy::PerComponent => Some(MaskedObservation::new(n, p)),
    };

    let mut current = GaussianBelief::new(model.mu0.clone(), model.sigma0.clone());
    let mut next = GaussianBelief::zeros(n);
    let mut filtered = Vec::with_capacity(t_max);
    let mut predicted = Vec::with_capacity(if retain_predicted { t_max } else { 0 });
    let mut loglik = 0.0f64;

    for (t, y) in ys.iter().enumerate() {
        if retain_predicted {
            predicted.push(current.clone());
        }

        let (c, r) = (&model.c[t], &model.r[t]);
        let ll = match masked.as_mut() {
            None => condition_on(backend, &mut current, c, r, y, &mut ws),
            Some(m) => condition_on_masked(backend, &mut current, c, r, y, m, &mut ws),
        }
        .map_err(|e| {
            log::warn!("kalman forward pass aborted at t={t}: {e}");
            e.at_step(t)
        })?;
        loglik += ll;
        filtered.push(current.clone());

        if t + 1 < t_max {
            predict(backend, &current, &model.a[t], &model.q[t], &mut next, &mut ws)
                .map_err(|e| e.at_step(t))?;
            std::mem::swap(&mut current, &mut next);
        }
    }

    Ok(ForwardPass { log_likelihood: loglik, filtered, predicted, ws })
}

/// Smooth the forward pass in place with RTS steps from `T-2` down to `0`.
///
/// When `cross` is given it must hold `T-1` matrices; entry `t` receives
/// `E[x_t x_{t+1}^T | y]`.
pub(super) fn backward_pass<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    fp: ForwardPass,
    mut cross: Option<&mut [DMatrix<f64>]>,
) -> Result<Vec<GaussianBelief>> {
    let ForwardPass { filtered: mut beliefs, mut predicted, mut ws, .. } = fp;
    let t_max = beliefs.len();
    debug_assert_eq!(predicted.len(), t_max);

    let n = model.n_state();
    let mut gain_t = DMatrix::zeros(n, n);

    for t in (0..t_max.saturating_sub(1)).rev() {
        let (head, tail) = beliefs.split_at_mut(t + 1);
        let smoothed_next = &tail[0];
        rts_step(
            backend,
            &model.a[t],
            &mut head[t],
            &mut predicted[t + 1],
            smoothed_next,
            &mut gain_t,
            &mut ws,
        )
        .map_err(|e| {
            log::warn!("rts smoother aborted at t={t}: {e}");
            e.at_step(t)
        })?;

        if let Some(out) = cross.as_deref_mut() {
            cross_moment(backend, &head[t].mean, smoothed_next, &gain_t, &mut out[t])
                .map_err(|e| e.at_step(t))?;
        }
    }

    Ok(beliefs)
}

fn unzip_beliefs(beliefs: Vec<GaussianBelief>) -> (Vec<DVector<f64>>, Vec<DMatrix<f64>>) {
    beliefs.into_iter().map(|b| (b.mean, b.cov)).unzip()
}

/// Run Kalman filtering on a full observation sequence with the CPU backend.
///
/// Returns per-step filtered state distributions, plus the total log-likelihood.
pub fn kalman_filter(model: &StateSpaceModel, ys: &[DVector<f64>]) -> Result<KalmanFilterResult> {
    kalman_filter_with(&CpuBackend::new(), model, ys, &KalmanConfig::default())
}

/// Run Kalman filtering with an explicit backend and configuration.
pub fn kalman_filter_with<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    cfg: &KalmanConfig,
) -> Result<KalmanFilterResult> {
    log::debug!(
        "kalman_filter: n_state={} n_obs={} T={} backend={} missing={:?}",
        model.n_state(),
        model.n_obs(),
        model.len(),
        backend.name(),
        cfg.missing
    );
    let fp = forward_pass(backend, model, ys, cfg, false)?;
    let log_likelihood = fp.log_likelihood;
    let (filtered_means, filtered_covs) = unzip_beliefs(fp.filtered);
    log::debug!("kalman_filter: log_likelihood={log_likelihood}");

    Ok(KalmanFilterResult { log_likelihood, filtered_means, filtered_covs })
}

/// Run the filter and RTS smoother with the CPU backend.
pub fn kalman_smoother(
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
) -> Result<KalmanSmootherResult> {
    kalman_smoother_with(&CpuBackend::new(), model, ys, &KalmanConfig::default())
}

/// Run the filter and RTS smoother with an explicit backend and configuration.
pub fn kalman_smoother_with<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    cfg: &KalmanConfig,
) -> Result<KalmanSmootherResult> {
    log::debug!(
        "kalman_smoother: n_state={} n_obs={} T={} backend={}",
        model.n_state(),
        model.n_obs(),
        model.len(),
        backend.name()
    );
    let fp = forward_pass(backend, model, ys, cfg, true)?;
    let log_likelihood = fp.log_likelihood;
    let smoothed = backward_pass(backend, model, fp, None)?;
    let (smoothed_means, smoothed_covs) = unzip_beliefs(smoothed);

    Ok(KalmanSmootherResult { log_likelihood, smoothed_means, smoothed_covs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_filter(
        y: &[f64],
        f: f64,
        q: f64,
        h: f64,
        r: f64,
        m0: f64,
        p0: f64,
    ) -> (Vec<f64>, Vec<f64>, f64) {
        let mut m_pred = m0;
        let mut p_pred = p0;

        let mut m_filt = Vec::with_capacity(y.len());
        let mut p_filt = Vec::with_capacity(y.len());
        let mut ll = 0.0;

        for &yt in y {
            // Missing: skip update, no likelihood contribution.
            if yt.is_nan() {
                m_filt.push(m_pred);
                p_filt.push(p_pred);
                m_pred = f * m_pred;
                p_pred = f * f * p_pred + q;
                continue;
            }

            let v = yt - h * m_pred;
            let s = h * h * p_pred + r;
            let k = (p_pred * h) / s;
            let m = m_pred + k * v;
            let p = (1.0 - k * h) * p_pred * (1.0 - k * h) + k * r * k;

            ll += -0.5 * (LN_2PI + s.ln() + (v * v) / s);

            m_filt.push(m);
            p_filt.push(p);

            m_pred = f * m;
            p_pred = f * f * p + q;
        }
        (m_filt, p_filt, ll)
    }

    fn scalar_model(
        f: f64,
        q: f64,
        h: f64,
        r: f64,
        m0: f64,
        p0: f64,
        t_max: usize,
    ) -> StateSpaceModel {
        StateSpaceModel::time_invariant(
            DMatrix::from_row_slice(1, 1, &[f]),
            DMatrix::from_row_slice(1, 1, &[q]),
            DMatrix::from_row_slice(1, 1, &[h]),
            DMatrix::from_row_slice(1, 1, &[r]),
            DVector::from_row_slice(&[m0]),
            DMatrix::from_row_slice(1, 1, &[p0]),
            t_max,
        )
        .unwrap()
    }

    fn to_ys(y: &[f64]) -> Vec<DVector<f64>> {
        y.iter().map(|&v| DVector::from_row_slice(&[v])).collect()
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        let d = (a - b).abs();
        assert!(d <= tol, "a={} b={} |diff|={}", a, b, d);
    }

    #[test]
    fn test_kalman_filter_matches_scalar_reference() {
        // Local level model.
        let (f, q, h, r, m0, p0) = (1.0, 0.1, 1.0, 0.2, 0.0, 1.0);
        let y = vec![0.9, 1.2, 0.8, 1.1];
        let (m_ref, p_ref, ll_ref) = scalar_filter(&y, f, q, h, r, m0, p0);

        let model = scalar_model(f, q, h, r, m0, p0, y.len());
        let fr = kalman_filter(&model, &to_ys(&y)).unwrap();

        assert_eq!(fr.filtered_means.len(), y.len());
        assert_eq!(fr.filtered_covs.len(), y.len());
        for t in 0..y.len() {
            assert_close(fr.filtered_means[t][0], m_ref[t], 1e-12);
            assert_close(fr.filtered_covs[t][0], p_ref[t], 1e-12);
        }
        assert_close(fr.log_likelihood, ll_ref, 1e-12);
    }

    #[test]
    fn test_kalman_filter_allows_missing_obs_as_nan() {
        let (f, q, h, r, m0, p0) = (0.9, 0.1, 1.0, 0.2, 0.0, 1.0);
        let y = vec![0.9, f64::NAN, 0.8, 1.1];
        let (m_ref, p_ref, ll_ref) = scalar_filter(&y, f, q, h, r, m0, p0);

        let model = scalar_model(f, q, h, r, m0, p0, y.len());
        let fr = kalman_filter(&model, &to_ys(&y)).unwrap();
        assert!(fr.log_likelihood.is_finite());

        for t in 0..y.len() {
            assert_close(fr.filtered_means[t][0], m_ref[t], 1e-12);
            assert_close(fr.filtered_covs[t][0], p_ref[t], 1e-12);
        }
        assert_close(fr.log_likelihood, ll_ref, 1e-12);
    }

    #[test]
    fn test_time_varying_slices_are_indexed_by_step() {
        // A[0] = 2 drives x_0 -> x_1, A[1] is never read by the filter.
        let one = DMatrix::from_row_slice(1, 1, &[1.0]);
        let model = StateSpaceModel::new(
            vec![DMatrix::from_row_slice(1, 1, &[2.0]), DMatrix::from_row_slice(1, 1, &[-7.0])],
            vec![one.clone(), one.clone()],
            vec![one.clone(), DMatrix::from_row_slice(1, 1, &[0.5])],
            vec![one.clone(), DMatrix::from_row_slice(1, 1, &[0.3])],
            DVector::from_row_slice(&[0.0]),
            one.clone(),
        )
        .unwrap();
        let ys = to_ys(&[1.0, 2.0]);
        let fr = kalman_filter(&model, &ys).unwrap();

        // t=0: prior N(0,1), y=1, R=1 -> N(0.5, 0.5). Prior for t=1: N(1.0, 3.0).
        assert_close(fr.filtered_means[0][0], 0.5, 1e-14);
        assert_close(fr.filtered_covs[0][0], 0.5, 1e-14);
        let (m1, p1) = (1.0, 3.0);
        let s = 0.25 * p1 + 0.3;
        let k = 0.5 * p1 / s;
        assert_close(fr.filtered_means[1][0], m1 + k * (2.0 - 0.5 * m1), 1e-12);
        assert_close(fr.filtered_covs[1][0], p1 - k * 0.5 * p1, 1e-12);
    }

    #[test]
    fn test_rts_smoother_shapes_and_finiteness_smoke() {
        let model = scalar_model(1.0, 0.1, 1.0, 0.2, 0.0, 1.0, 4);
        let ys = to_ys(&[0.9, 1.2, 0.8, 1.1]);
        let fr = kalman_filter(&model, &ys).unwrap();
        let sr = kalman_smoother(&model, &ys).unwrap();

        assert_eq!(sr.smoothed_means.len(), 4);
        assert_eq!(sr.smoothed_covs.len(), 4);
        for t in 0..4 {
            assert!(sr.smoothed_means[t][0].is_finite());
            assert!(sr.smoothed_covs[t][0] >= 0.0);
            // Smoothing never increases the variance.
            assert!(sr.smoothed_covs[t][0] <= fr.filtered_covs[t][0] + 1e-12);
        }
        assert_eq!(sr.smoothed_means[3], fr.filtered_means[3]);
        assert_eq!(sr.smoothed_covs[3], fr.filtered_covs[3]);
        assert_eq!(sr.log_likelihood, fr.log_likelihood);
    }

    #[test]
    fn test_single_step_horizon() {
        let model = scalar_model(1.0, 0.1, 1.0, 0.2, 0.0, 1.0, 1);
        let ys = to_ys(&[0.4]);
        let fr = kalman_filter(&model, &ys).unwrap();
        let sr = kalman_smoother(&model, &ys).unwrap();
        assert_eq!(sr.smoothed_means[0], fr.filtered_means[0]);
        assert_eq!(sr.smoothed_covs[0], fr.filtered_covs[0]);
    }

    #[test]
    fn test_partial_missing_multivariate_decoupled_matches_scalar_refs() {
        // Two independent local-level components observed through an identity C.
        let model = StateSpaceModel::time_invariant(
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 2, &[0.1, 0.0, 0.0, 0.2]),
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 2, &[0.3, 0.0, 0.0, 0.4]),
            DVector::zeros(2),
            DMatrix::identity(2, 2),
            4,
        )
        .unwrap();

        let y0 = [0.9, f64::NAN, 0.8, f64::NAN];
        let y1 = [f64::NAN, 1.1, 1.0, f64::NAN];
        let ys: Vec<DVector<f64>> =
            (0..4).map(|t| DVector::from_row_slice(&[y0[t], y1[t]])).collect();

        let cfg = KalmanConfig { missing: MissingPolicy::PerComponent };
        let fr = kalman_filter_with(&CpuBackend::new(), &model, &ys, &cfg).unwrap();

        let (m0_ref, p0_ref, ll0) = scalar_filter(&y0, 1.0, 0.1, 1.0, 0.3, 0.0, 1.0);
        let (m1_ref, p1_ref, ll1) = scalar_filter(&y1, 1.0, 0.2, 1.0, 0.4, 0.0, 1.0);

        for t in 0..4 {
            assert_close(fr.filtered_means[t][0], m0_ref[t], 1e-12);
            assert_close(fr.filtered_means[t][1], m1_ref[t], 1e-12);
            assert_close(fr.filtered_covs[t][(0, 0)], p0_ref[t], 1e-12);
            assert_close(fr.filtered_covs[t][(1, 1)], p1_ref[t], 1e-12);
            assert_close(fr.filtered_covs[t][(0, 1)], 0.0, 1e-14);
        }
        assert_close(fr.log_likelihood, ll0 + ll1, 1e-12);
    }

    #[test]
    fn test_partial_nan_rejected_under_whole_vector_policy() {
        let model = StateSpaceModel::time_invariant(
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            DVector::zeros(2),
            DMatrix::identity(2, 2),
            2,
        )
        .unwrap();

        // NaN first coordinate: whole vector missing, second entry ignored.
        let ok = vec![
            DVector::from_row_slice(&[f64::NAN, 5.0]),
            DVector::from_row_slice(&[1.0, 2.0]),
        ];
        assert!(kalman_filter(&model, &ok).is_ok());

        let bad = vec![
            DVector::from_row_slice(&[1.0, f64::NAN]),
            DVector::from_row_slice(&[1.0, 2.0]),
        ];
        assert!(matches!(kalman_filter(&model, &bad), Err(Error::Validation(_))));

        // Values behind a NaN first coordinate are ignored, infinities included.
        let masked_inf = vec![
            DVector::from_row_slice(&[f64::NAN, f64::INFINITY]),
            DVector::from_row_slice(&[1.0, 2.0]),
        ];
        let masked_zero = vec![
            DVector::from_row_slice(&[f64::NAN, 0.0]),
            DVector::from_row_slice(&[1.0, 2.0]),
        ];
        let a = kalman_filter(&model, &masked_inf).unwrap();
        let b = kalman_filter(&model, &masked_zero).unwrap();
        assert_eq!(a.log_likelihood, b.log_likelihood);
        assert_eq!(a.filtered_means, b.filtered_means);
        assert_eq!(a.filtered_covs, b.filtered_covs);

        // Under the per-component policy the infinity is an observed value.
        let cfg = KalmanConfig { missing: MissingPolicy::PerComponent };
        let err = kalman_filter_with(&CpuBackend::new(), &model, &masked_inf, &cfg).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let inf = vec![
            DVector::from_row_slice(&[1.0, 2.0]),
            DVector::from_row_slice(&[f64::INFINITY, 2.0]),
        ];
        assert!(matches!(kalman_filter(&model, &inf), Err(Error::Validation(_))));
    }

    #[test]
    fn test_observation_count_mismatch() {
        let model = scalar_model(1.0, 0.1, 1.0, 0.2, 0.0, 1.0, 3);
        let err = kalman_filter(&model, &to_ys(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));

        let wide = vec![DVector::from_row_slice(&[1.0, 2.0]); 3];
        let err = kalman_smoother(&model, &wide).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(ref m) if m.contains("y[0]")));
    }

    #[test]
    fn test_degenerate_step_is_tagged() {
        // R = 0 and a zero observation row leave S = 0 at every step.
        let model = StateSpaceModel::time_invariant(
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(1, 2, &[0.0, 0.0]),
            DMatrix::zeros(1, 1),
            DVector::zeros(2),
            DMatrix::identity(2, 2),
            3,
        )
        .unwrap();
        let ys = to_ys(&[f64::NAN, 1.0, 2.0]);
        let err = kalman_filter(&model, &ys).unwrap_err();
        assert!(err.is_numerical_degeneracy());
        assert!(err.to_string().contains("t=1"));
    }

    #[test]
    fn test_backward_pass_degeneracy_is_tagged() {
        // A = 0, Q = 0: P_{t+1|t} = 0 for t >= 1 while every observation still has R = 1.
        let model = scalar_model(0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 3);
        let ys = to_ys(&[0.5, 0.2, -0.1]);

        let fr = kalman_filter(&model, &ys).unwrap();
        assert!(fr.log_likelihood.is_finite());

        let err = kalman_smoother(&model, &ys).unwrap_err();
        assert!(err.is_numerical_degeneracy());
        assert!(err.to_string().contains("t=1"), "{err}");

        let err = crate::timeseries::em::kalman_e_step(&model, &ys).unwrap_err();
        assert!(err.is_numerical_degeneracy());
        assert!(err.to_string().contains("t=1"), "{err}");
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg = KalmanConfig::default();
        assert_eq!(cfg.missing, MissingPolicy::WholeVector);

        let parsed: KalmanConfig = serde_json::from_str(r#"{"missing":"PerComponent"}"#).unwrap();
        assert_eq!(parsed.missing, MissingPolicy::PerComponent);
        let back: KalmanConfig = serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
        assert_eq!(back.missing, MissingPolicy::PerComponent);
    }
}
