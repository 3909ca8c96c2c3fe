//! Parallel batch execution over independent routine invocations.
//!
//! Each invocation owns its workspace and RNG, so sequences and draws run on
//! the rayon pool with no shared mutable state. Results come back in input
//! order.

use lgs_core::Result;
use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::timeseries::ffbs::{KalmanSampleResult, ffbs_sample};
use crate::timeseries::kalman::{
    KalmanFilterResult, KalmanSmootherResult, kalman_filter, kalman_smoother,
};
use crate::timeseries::model::StateSpaceModel;

/// Filter every observation sequence against the same model in parallel.
pub fn kalman_filter_batch(
    model: &StateSpaceModel,
    sequences: &[Vec<DVector<f64>>],
) -> Vec<Result<KalmanFilterResult>> {
    log::debug!("kalman_filter_batch: {} sequences", sequences.len());
    sequences.par_iter().map(|ys| kalman_filter(model, ys)).collect()
}

/// Smooth every observation sequence against the same model in parallel.
pub fn kalman_smoother_batch(
    model: &StateSpaceModel,
    sequences: &[Vec<DVector<f64>>],
) -> Vec<Result<KalmanSmootherResult>> {
    log::debug!("kalman_smoother_batch: {} sequences", sequences.len());
    sequences.par_iter().map(|ys| kalman_smoother(model, ys)).collect()
}

/// Draw `n_draws` independent FFBS trajectories in parallel.
///
/// Draw `i` uses seed `seed + i`, so the output is identical for a given seed
/// whatever the size of the thread pool.
pub fn ffbs_sample_draws(
    model: &StateSpaceModel,
    ys: &[DVector<f64>],
    n_draws: usize,
    seed: u64,
) -> Result<Vec<KalmanSampleResult>> {
    log::debug!("ffbs_sample_draws: n_draws={n_draws} seed={seed}");
    (0..n_draws)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            ffbs_sample(model, ys, &mut rng)
        })
        .collect()
}
