//! Forward-filtering backward-sampling (FFBS).
//!
//! Draws one joint trajectory `x_{0:T-1} ~ p(x | y)`. The backward pass
//! conditions the filtered belief at `t` on the already drawn `x_{t+1}`,
//! treated as an observation of `x_t` through `(A_t, Q_t)`, and reuses the
//! measurement update instead of forming smoother gains.

use lgs_compute::CpuBackend;
use lgs_core::{DenseLinalg, GaussianBelief, Result};
use nalgebra::DVector;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::gaussian::{condition_on, sample_gaussian};
use super::kalman::{KalmanConfig, forward_pass};
use super::model::StateSpaceModel;
use super::workspace::KalmanWorkspace;

/// One posterior trajectory draw.
#[derive(Debug, Clone)]
pub struct KalmanSampleResult {
    /// Total log-likelihood `log p(y_0..y_{T-1})` from the forward pass.
    pub log_likelihood: f64,
    /// Sampled latent states `x_0..x_{T-1}` (each is n_state).
    pub states: Vec<DVector<f64>>,
}

fn fill_standard_normal<R: Rng + ?Sized>(rng: &mut R, z: &mut DVector<f64>) {
    for v in z.iter_mut() {
        *v = StandardNormal.sample(rng);
    }
}

/// Draw one trajectory from `p(x_{0:T-1} | y)` with the CPU backend.
pub fn ffbs_sample<R: Rng + ?Sized>(
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    rng: &mut R,
) -> Result<KalmanSampleResult> {
    ffbs_sample_with(&CpuBackend::new(), model, ys, &KalmanConfig::default(), rng)
}

/// Draw one trajectory with an explicit backend and configuration.
///
/// Every `Q_t` must be positive definite: the backward pass factors
/// `A_t Sigma_{t|t} A_t^T + Q_t`.
pub fn ffbs_sample_with<B: DenseLinalg + ?Sized, R: Rng + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    cfg: &KalmanConfig,
    rng: &mut R,
) -> Result<KalmanSampleResult> {
    log::debug!(
        "ffbs_sample: n_state={} n_obs={} T={} backend={}",
        model.n_state(),
        model.n_obs(),
        model.len(),
        backend.name()
    );
    let fp = forward_pass(backend, model, ys, cfg, false)?;
    let n = model.n_state();
    let t_max = fp.filtered.len();

    // Pseudo-observations x_{t+1} are n-dimensional.
    let mut ws = KalmanWorkspace::new(n, n);
    let mut states: Vec<DVector<f64>> = (0..t_max).map(|_| DVector::zeros(n)).collect();
    let mut work = GaussianBelief::zeros(n);

    let last = t_max - 1;
    fill_standard_normal(rng, &mut states[last]);
    sample_gaussian(backend, &fp.filtered[last], &mut states[last], &mut ws)
        .map_err(|e| e.at_step(last))?;

    for t in (0..last).rev() {
        work.copy_from(&fp.filtered[t]);
        let (head, tail) = states.split_at_mut(t + 1);
        let tagged = |e: lgs_core::Error| {
            log::warn!("ffbs backward pass aborted at t={t}: {e}");
            e.at_step(t)
        };
        condition_on(backend, &mut work, &model.a[t], &model.q[t], &tail[0], &mut ws)
            .map_err(tagged)?;
        fill_standard_normal(rng, &mut head[t]);
        sample_gaussian(backend, &work, &mut head[t], &mut ws).map_err(tagged)?;
    }

    Ok(KalmanSampleResult { log_likelihood: fp.log_likelihood, states })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::kalman::kalman_filter;
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn local_level(t_max: usize) -> StateSpaceModel {
        StateSpaceModel::time_invariant(
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DMatrix::from_row_slice(1, 1, &[0.1]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DMatrix::from_row_slice(1, 1, &[0.2]),
            DVector::from_row_slice(&[0.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            t_max,
        )
        .unwrap()
    }

    #[test]
    fn test_ffbs_shapes_and_loglik() {
        let model = local_level(5);
        let ys: Vec<DVector<f64>> = [0.9, 1.2, f64::NAN, 0.8, 1.1]
            .iter()
            .map(|&v| DVector::from_row_slice(&[v]))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let draw = ffbs_sample(&model, &ys, &mut rng).unwrap();
        let fr = kalman_filter(&model, &ys).unwrap();

        assert_eq!(draw.states.len(), 5);
        assert!(draw.states.iter().all(|x| x.len() == 1 && x[0].is_finite()));
        assert_eq!(draw.log_likelihood, fr.log_likelihood);
    }

    #[test]
    fn test_ffbs_is_deterministic_for_a_seed() {
        let model = local_level(4);
        let ys: Vec<DVector<f64>> =
            [0.1, 0.4, 0.2, 0.3].iter().map(|&v| DVector::from_row_slice(&[v])).collect();
        let a = ffbs_sample(&model, &ys, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = ffbs_sample(&model, &ys, &mut StdRng::seed_from_u64(11)).unwrap();
        let c = ffbs_sample(&model, &ys, &mut StdRng::seed_from_u64(12)).unwrap();
        assert_eq!(a.states, b.states);
        assert_ne!(a.states, c.states);
    }

    #[test]
    fn test_ffbs_singular_process_noise_fails() {
        // A = 0, Q = 0 and no observations leave a zero-variance belief at t=1.
        let model = StateSpaceModel::time_invariant(
            DMatrix::from_row_slice(1, 1, &[0.0]),
            DMatrix::from_row_slice(1, 1, &[0.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DVector::from_row_slice(&[0.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            2,
        )
        .unwrap();
        let ys = vec![DVector::from_row_slice(&[f64::NAN]), DVector::from_row_slice(&[f64::NAN])];
        let err = ffbs_sample(&model, &ys, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(err.is_numerical_degeneracy());
    }
}
