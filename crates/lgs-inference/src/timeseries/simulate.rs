//! Simulation utilities for linear-Gaussian state space models.
//!
//! Generates a latent trajectory and corresponding observations:
//! - x_0 ~ N(mu0, Sigma0)
//! - y_t = C_t x_t + v_t, v_t ~ N(0, R_t)
//! - x_{t+1} = A_t x_t + w_t, w_t ~ N(0, Q_t)

use lgs_compute::CpuBackend;
use lgs_core::{DenseLinalg, GaussianBelief, Result, Transpose};
use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use super::gaussian::sample_gaussian;
use super::model::StateSpaceModel;
use super::workspace::KalmanWorkspace;

/// Simulation output.
#[derive(Debug, Clone)]
pub struct KalmanSimResult {
    /// Latent states (length T, each is n_state).
    pub xs: Vec<DVector<f64>>,
    /// Observations (length T, each is n_obs).
    pub ys: Vec<DVector<f64>>,
}

fn standard_normal(rng: &mut StdRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| StandardNormal.sample(rng))
}

/// Simulate the model's full horizon with a seeded RNG.
///
/// Every covariance the draws pass through (`Sigma0`, `Q_t`, `R_t`) must be
/// positive definite.
pub fn kalman_simulate(model: &StateSpaceModel, seed: u64) -> Result<KalmanSimResult> {
    simulate_with(&CpuBackend::new(), model, seed)
}

fn simulate_with<B: DenseLinalg + ?Sized>(
    backend: &B,
    model: &StateSpaceModel,
    seed: u64,
) -> Result<KalmanSimResult> {
    model.validate()?;
    let n = model.n_state();
    let p = model.n_obs();
    let t_max = model.len();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut state_ws = KalmanWorkspace::new(n, p);
    let mut obs_ws = KalmanWorkspace::new(p, p);
    let mut state = GaussianBelief::new(model.mu0.clone(), model.sigma0.clone());
    let mut obs = GaussianBelief::zeros(p);

    let mut xs = Vec::with_capacity(t_max);
    let mut ys = Vec::with_capacity(t_max);

    let mut x = standard_normal(&mut rng, n);
    sample_gaussian(backend, &state, &mut x, &mut state_ws)?;

    for t in 0..t_max {
        backend.gemv(Transpose::No, 1.0, &model.c[t], &x, 0.0, &mut obs.mean);
        obs.cov.copy_from(&model.r[t]);
        let mut y = standard_normal(&mut rng, p);
        sample_gaussian(backend, &obs, &mut y, &mut obs_ws).map_err(|e| e.at_step(t))?;
        ys.push(y);

        if t + 1 < t_max {
            backend.gemv(Transpose::No, 1.0, &model.a[t], &x, 0.0, &mut state.mean);
            state.cov.copy_from(&model.q[t]);
            let mut x_next = standard_normal(&mut rng, n);
            sample_gaussian(backend, &state, &mut x_next, &mut state_ws)
                .map_err(|e| e.at_step(t))?;
            xs.push(std::mem::replace(&mut x, x_next));
        }
    }
    xs.push(x);

    Ok(KalmanSimResult { xs, ys })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn local_level(t_max: usize, r: f64) -> StateSpaceModel {
        StateSpaceModel::time_invariant(
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DMatrix::from_row_slice(1, 1, &[0.1]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DMatrix::from_row_slice(1, 1, &[r]),
            DVector::from_row_slice(&[0.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            t_max,
        )
        .unwrap()
    }

    #[test]
    fn test_simulate_shapes_smoke() {
        let sim = kalman_simulate(&local_level(5, 0.2), 123).unwrap();
        assert_eq!(sim.xs.len(), 5);
        assert_eq!(sim.ys.len(), 5);
        assert_eq!(sim.xs[0].len(), 1);
        assert_eq!(sim.ys[0].len(), 1);
        assert!(sim.ys.iter().all(|y| y[0].is_finite()));
    }

    #[test]
    fn test_simulate_is_seeded() {
        let model = local_level(10, 0.2);
        let a = kalman_simulate(&model, 42).unwrap();
        let b = kalman_simulate(&model, 42).unwrap();
        assert_eq!(a.xs, b.xs);
        assert_eq!(a.ys, b.ys);
    }

    #[test]
    fn test_simulate_rejects_singular_observation_noise() {
        let err = kalman_simulate(&local_level(3, 0.0), 1).unwrap_err();
        assert!(err.is_numerical_degeneracy());
    }
}
